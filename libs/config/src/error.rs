//! Validation errors for exporter configuration.
//!
//! All of these are raised while loading configuration, before the scrape
//! endpoint is started. None of them can happen at scrape time.

use thiserror::Error;

/// Reasons a set of [`ServerSource`]s is rejected.
///
/// [`ServerSource`]: crate::ServerSource
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Nothing to poll.
    #[error("no Kea control channels configured, use a config file or --target")]
    NoSources,

    /// An address is neither a socket path, a `host:port` nor an http(s) url.
    #[error("invalid control channel address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// A `--target` value isn't `<kind>@<address>`.
    #[error("invalid target `{target}`: {reason}")]
    InvalidTarget { target: String, reason: String },

    /// A static label has a name Prometheus won't accept, shadows a label the
    /// exporter sets itself, or has an empty value.
    #[error("invalid static label `{name}`: {reason}")]
    InvalidLabel { name: String, reason: String },

    /// Timeout must be non-zero.
    #[error("control channel timeout must be greater than zero")]
    InvalidTimeout,

    /// Response size limit must be non-zero.
    #[error("max_response_size must be greater than zero")]
    InvalidResponseLimit,

    /// Two sources would emit identical label sets, so their samples would
    /// collide in every snapshot.
    #[error(
        "sources `{first}` and `{second}` share identity {identity}; give one of them a distinct name or static label"
    )]
    Conflict {
        identity: String,
        first: String,
        second: String,
    },
}

impl ConfigError {
    /// Returns true if this error is an identity collision between sources.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ConfigError::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::Conflict {
            identity: "{server=\"edge-1\"}".into(),
            first: "/run/kea/kea4.sock".into(),
            second: "10.0.0.2:8000".into(),
        };
        assert!(err.is_conflict());
        let msg = format!("{err}");
        assert!(msg.contains("/run/kea/kea4.sock"));
        assert!(msg.contains("server=\"edge-1\""));

        assert!(!ConfigError::NoSources.is_conflict());
    }
}
