//! Error types for control channel exchanges.
//!
//! Every variant is scoped to one source and one scrape: the collector turns
//! them into "no samples from this source this time" plus a log record.

use thiserror::Error;

/// Why a single statistics fetch failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Connection refused, socket missing, reset mid-exchange.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// No complete response before the deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The response isn't the JSON document we expect.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Kea answered with a non-zero result code.
    #[error("command failed with result {code}: {text}")]
    CommandFailed { code: i64, text: String },
}

impl ChannelError {
    /// Returns true for transport-level failures, timeouts included.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ChannelError::Unreachable(_) | ChannelError::Timeout(_))
    }

    /// Returns true if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ChannelError::Timeout(_))
    }
}

/// Shorthand result alias for control channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;
