//! Typed request/response documents for the Kea control channel.
//!
//! Requests are `{"command": ..., "service": [...]}`, responses are
//! `{"result": <int>, "text": ..., "arguments": {...}}`. Statistic values are
//! kept as raw JSON here; decoding them is the mapper's job.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, ChannelResult};

/// command returning every statistic the daemon keeps
pub const STATISTIC_GET_ALL: &str = "statistic-get-all";

/// statistic name -> scalar or `[[value, timestamp], ...]`, exactly as Kea sent it
pub type RawStats = serde_json::Map<String, serde_json::Value>;

/// A control channel command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatQuery {
    pub command: String,
    /// target daemons, only meaningful to the control agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<Vec<String>>,
}

impl StatQuery {
    /// the same command without service routing, for daemons addressed directly
    pub fn direct(&self) -> Self {
        Self {
            command: self.command.clone(),
            service: None,
        }
    }

    /// encode as a single JSON document
    pub fn to_bytes(&self) -> ChannelResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| ChannelError::Protocol(format!("failed to encode command: {e}")))
    }
}

/// Kea's command result codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success,
    Error,
    Unsupported,
    Empty,
    Other(i64),
}

impl ResultCode {
    pub fn code(&self) -> i64 {
        match self {
            ResultCode::Success => 0,
            ResultCode::Error => 1,
            ResultCode::Unsupported => 2,
            ResultCode::Empty => 3,
            ResultCode::Other(code) => *code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResultCode::Success)
    }
}

impl From<i64> for ResultCode {
    fn from(code: i64) -> Self {
        match code {
            0 => ResultCode::Success,
            1 => ResultCode::Error,
            2 => ResultCode::Unsupported,
            3 => ResultCode::Empty,
            other => ResultCode::Other(other),
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultCode::Success => write!(f, "success"),
            ResultCode::Error => write!(f, "error"),
            ResultCode::Unsupported => write!(f, "unsupported"),
            ResultCode::Empty => write!(f, "empty"),
            ResultCode::Other(code) => write!(f, "result {code}"),
        }
    }
}

/// A validated response. `stats` is only populated on success.
#[derive(Debug, Clone, PartialEq)]
pub struct StatResponse {
    pub result: ResultCode,
    pub text: Option<String>,
    pub stats: Option<RawStats>,
}

impl StatResponse {
    /// Turn a controlled failure into [`ChannelError::CommandFailed`],
    /// otherwise hand back the statistics.
    pub fn into_stats(self) -> ChannelResult<RawStats> {
        match (self.result, self.stats) {
            (ResultCode::Success, Some(stats)) => Ok(stats),
            (ResultCode::Success, None) => Err(ChannelError::Protocol(
                "successful response without arguments".into(),
            )),
            (result, _) => Err(ChannelError::CommandFailed {
                code: result.code(),
                text: self.text.unwrap_or_else(|| result.to_string()),
            }),
        }
    }
}
