//! # control-channel
//!
//! Client side of Kea's JSON control channel, restricted to what the
//! exporter needs: sending `statistic-get-all` and validating the answer.
//!
//! This library provides:
//! - **Typed models** for commands and responses, with Kea's result codes.
//! - **Protocol helpers** to build the statistics command for a daemon kind
//!   and to validate raw response bytes.
//! - **A one-shot client** over unix sockets, raw TCP or the HTTP control
//!   agent, every exchange bounded by a timeout.
//! - **[`StatSource`]**, the seam the collector fetches through.

use async_trait::async_trait;

use config::ServerSource;

pub mod client;
pub mod error;
pub mod models;
pub mod protocol;

pub use client::{ControlClient, DEFAULT_MAX_RESPONSE_SIZE, DEFAULT_TIMEOUT};
pub use error::{ChannelError, ChannelResult};
pub use models::{RawStats, ResultCode, STATISTIC_GET_ALL, StatQuery, StatResponse};

/// Something that can produce the raw statistics of one configured daemon.
#[async_trait]
pub trait StatSource: Send + Sync + 'static {
    /// the daemon this source answers for
    fn source(&self) -> &ServerSource;

    /// Fetch every statistic. Failures are scoped to this source.
    async fn fetch_stats(&self) -> ChannelResult<RawStats>;
}

#[async_trait]
impl StatSource for ControlClient {
    fn source(&self) -> &ServerSource {
        ControlClient::source(self)
    }

    async fn fetch_stats(&self) -> ChannelResult<RawStats> {
        let query = protocol::build_query(self.source().kind());
        self.fetch(&query).await?.into_stats()
    }
}
