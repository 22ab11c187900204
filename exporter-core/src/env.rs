//! convenience fns for reading settings from environment vars
use anyhow::Context;

use std::{env, str};

/// Returns the value of the environment variable `name` parsed as `T`, or
/// `default` (parsed the same way) when it isn't set.
/// # Examples
/// ```
/// let frmt: String = exporter_core::env::parse_var("KEA_EXPORTER_DOC_UNSET", "standard").unwrap();
/// assert_eq!(frmt, "standard");
/// ```
pub fn parse_var<T, S>(name: &str, default: S) -> Result<T, <T as str::FromStr>::Err>
where
    T: str::FromStr,
    S: ToString,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse::<T>()
}

/// Calls [`parse_var`] but gives a default error message with the environment
/// variable name in it
///
/// [`parse_var`]: crate::env::parse_var
pub fn parse_var_with_err<T, S>(name: &str, default: S) -> anyhow::Result<T>
where
    T: str::FromStr,
    <T as str::FromStr>::Err: std::error::Error + Send + Sync + 'static,
    S: ToString + Send,
{
    parse_var::<T, S>(name, default).with_context(|| format!("error parsing env var {name}"))
}
