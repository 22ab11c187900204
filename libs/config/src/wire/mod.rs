//! On-disk config format, decoded as-is and validated by
//! [`ExporterConfig`](crate::ExporterConfig)
use std::{collections::BTreeMap, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, de};

use crate::{ConfigError, rules::CounterRules, source::ServerKind};

/// top-level config type
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// per-source control channel timeout, `"500ms"`, `"2s"` or a number of seconds
    #[serde(
        default,
        deserialize_with = "deserialize_optional_timeout",
        skip_serializing
    )]
    pub timeout: Option<Duration>,
    /// largest control channel response accepted, in bytes
    pub max_response_size: Option<usize>,
    /// replaces the built-in counter/gauge classification table
    pub counter_rules: Option<CounterRules>,
    #[serde(default)]
    pub sources: Vec<Source>,
}

/// one control channel as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Source {
    /// socket path, `host:port` or `http(s)://` url
    pub address: String,
    pub kind: ServerKind,
    /// value of the `server` label, defaults to `<kind>@<address>`
    pub name: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// `--target` format: `<kind>@<address>`
impl FromStr for Source {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ConfigError::InvalidTarget {
            target: s.to_owned(),
            reason,
        };
        let (kind, address) = s
            .split_once('@')
            .ok_or_else(|| invalid("expected `<kind>@<address>`".to_owned()))?;
        let kind = kind.parse::<ServerKind>().map_err(invalid)?;
        Ok(Source {
            address: address.trim().to_owned(),
            kind,
            name: None,
            labels: BTreeMap::new(),
        })
    }
}

/// Parse a duration string with optional time units
/// Accepts: "3", "3s", "500ms", "1m"
/// If no unit is specified, assumes seconds
fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(anyhow::Error::msg("empty duration string"));
    }

    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    // split units
    let (num, unit) = s.split_at(end);
    let num = num.parse::<u64>().context("invalid number")?;

    Ok(match unit.trim() {
        "" | "s" => Duration::from_secs(num),
        "ms" => Duration::from_millis(num),
        "m" => Duration::from_secs(num.checked_mul(60).context("duration value overflow")?),
        other => anyhow::bail!(
            "unknown time unit '{}', only 'm', 's' or 'ms' are supported",
            other
        ),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimeout {
    Seconds(u64),
    String(String),
}

impl RawTimeout {
    fn into_duration<E: de::Error>(self) -> Result<Duration, E> {
        match self {
            RawTimeout::Seconds(val) => Ok(Duration::from_secs(val)),
            RawTimeout::String(s) => parse_duration(&s).map_err(E::custom),
        }
    }
}

fn deserialize_optional_timeout<'de, D>(de: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawTimeout>::deserialize(de)?
        .map(RawTimeout::into_duration)
        .transpose()
}
