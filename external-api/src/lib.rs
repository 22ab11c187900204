//! # Scrape endpoint & healthcheck
//!
//! This crate provides the http api Prometheus scrapes, plus healthcheck and
//! the exporter's own telemetry.
//! It exposes the following endpoints:
//!
//! /metrics
//! /exporter-metrics
//! /health
//! /ping
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]
#![allow(clippy::cognitive_complexity, clippy::too_many_arguments)]

use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::{Router, extract::Extension, routing};

use snapshot::SnapshotCollector;
use tokio::{net::TcpListener, sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, trace};

pub use crate::models::{Health, State};

/// The task runner for the [`ExternalApi`]
#[derive(Debug)]
pub struct ExternalApiGuard {
    task_handle: JoinHandle<()>,
}

impl ExternalApiGuard {
    /// the task serving the api
    pub fn handle(&mut self) -> &mut JoinHandle<()> {
        &mut self.task_handle
    }
}

impl Drop for ExternalApiGuard {
    fn drop(&mut self) {
        trace!("ExternalApiGuard drop called");
        self.task_handle.abort();
    }
}

/// Serves a fresh snapshot of every Kea control channel on each scrape and
/// reports health changes sent over its channel
#[derive(Debug)]
pub struct ExternalApi {
    tx: mpsc::Sender<Health>,
    rx: mpsc::Receiver<Health>,
    addr: SocketAddr,
    state: State,
    collector: Arc<SnapshotCollector>,
}

impl ExternalApi {
    /// Create a new ExternalApi instance
    pub fn new(addr: SocketAddr, collector: Arc<SnapshotCollector>) -> Self {
        trace!("starting external api");
        let (tx, rx) = mpsc::channel(10);
        let state = models::blank_health();
        Self {
            tx,
            rx,
            addr,
            state,
            collector,
        }
    }

    /// clone the health sender channel
    pub fn sender(&self) -> mpsc::Sender<Health> {
        self.tx.clone()
    }

    /// Set the health
    pub fn set_health(&self, health: Health) {
        *self.state.lock() = health;
    }

    /// Listen to Health changes over the channel
    async fn listen_status(&mut self) -> Result<()> {
        while let Some(health) = self.rx.recv().await {
            let mut guard = self.state.lock();
            if *guard != health {
                debug!(%health, "health changed");
                *guard = health;
            }
        }
        info!("listen health exited-- nothing listening");
        Ok(())
    }

    /// serve the HTTP external api until `token` is cancelled
    async fn run(
        addr: SocketAddr,
        state: State,
        collector: Arc<SnapshotCollector>,
        token: CancellationToken,
    ) -> Result<()> {
        let tcp = TcpListener::bind(&addr).await?;
        // Provides:
        // /health
        // /ping
        // /metrics
        // /exporter-metrics
        let app = Router::new()
            .route("/health", routing::get(handlers::ok))
            .route("/ping", routing::get(handlers::ping))
            .route("/metrics", routing::get(handlers::metrics))
            .route("/exporter-metrics", routing::get(handlers::exporter_metrics))
            .layer(TraceLayer::new_for_http())
            .layer(Extension(state))
            .layer(Extension(collector));

        debug!("external API listening on {}", addr);

        axum::serve(tcp, app)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await?;
        info!("external API shut down");
        Ok(())
    }

    /// Kick off the HTTP service and start listening on all channels for
    /// changes
    pub fn start(mut self, token: CancellationToken) -> ExternalApiGuard {
        let state = self.state.clone();
        let addr = self.addr;
        let collector = self.collector.clone();
        // if tx is not cloned, health listen will never update since ExternalApi is owner

        let task_handle = tokio::spawn(async move {
            tokio::select! {
                res = ExternalApi::run(addr, state, collector, token) => {
                    if let Err(err) = res {
                        error!(?err, "external API returned with error");
                    }
                }
                res = self.listen_status() => {
                    if let Err(err) = res {
                        error!(?err, "health task returning, this should not happen");
                    }
                }
            }
        });
        ExternalApiGuard { task_handle }
    }
}

mod handlers {

    use std::sync::Arc;

    use axum::{
        body::Body,
        extract::Extension,
        http::header,
        http::{Response, StatusCode},
        response::IntoResponse,
    };
    use exporter_core::metrics;
    use prometheus::{Encoder, TextEncoder};
    use snapshot::{Snapshot, SnapshotCollector};
    use tracing::error;

    use crate::models::{Health, ServerResult, State};

    pub(crate) async fn ok(Extension(state): Extension<State>) -> ServerResult<impl IntoResponse> {
        Ok(match *state.lock() {
            Health::Good => StatusCode::OK,
            Health::Bad => StatusCode::INTERNAL_SERVER_ERROR,
        })
    }

    /// the Kea snapshot. 200 even when every source failed, the payload is
    /// just empty then
    pub(crate) async fn metrics(
        Extension(collector): Extension<Arc<SnapshotCollector>>,
    ) -> ServerResult<impl IntoResponse> {
        let snapshot = collector.collect().await;
        let resp = Response::builder().header(header::CONTENT_TYPE, Snapshot::format_type());

        match snapshot.encode_text() {
            Err(err) => {
                error!(?err, "error text encoding kea snapshot");
                Ok(resp
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::empty())?)
            }
            Ok(buf) => Ok(resp.status(StatusCode::OK).body(Body::from(buf))?),
        }
    }

    pub(crate) async fn exporter_metrics() -> ServerResult<impl IntoResponse> {
        metrics::touch_uptime();
        let encoder = TextEncoder::new();
        let mut buf = String::new();
        let mf = prometheus::gather();
        let resp = Response::builder().header(header::CONTENT_TYPE, encoder.format_type());

        match encoder.encode_utf8(&mf, &mut buf) {
            Err(err) => {
                error!(?err, "error text encoding exporter metrics");
                Ok(resp
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::empty())?)
            }
            Ok(_) => Ok(resp.status(StatusCode::OK).body(Body::from(buf))?),
        }
    }

    pub(crate) async fn ping() -> impl IntoResponse {
        StatusCode::OK
    }
}

/// Various models for API responses
pub mod models {
    use axum::response::IntoResponse;
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use std::{fmt, sync::Arc};

    /// The overall health of the system
    pub type State = Arc<Mutex<Health>>;
    /// Health is binary Good/Bad at the moment
    #[derive(Serialize, Deserialize, Debug, PartialEq, Copy, Clone, Eq)]
    #[serde(rename_all = "UPPERCASE")]
    pub enum Health {
        /// Report good health
        Good,
        /// Report bad health
        Bad,
    }

    impl fmt::Display for Health {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(
                f,
                "{}",
                match *self {
                    Health::Good => "GOOD",
                    Health::Bad => "BAD",
                }
            )
        }
    }

    pub(crate) fn blank_health() -> State {
        Arc::new(Mutex::new(Health::Bad))
    }

    // error type
    /// Make our own error that wraps `anyhow::Error`.
    #[derive(Debug)]
    pub struct ServerError(anyhow::Error);
    /// return error result
    pub type ServerResult<T> = Result<T, ServerError>;

    impl IntoResponse for ServerError {
        fn into_response(self) -> axum::response::Response {
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                format!("{}", self.0),
            )
                .into_response()
        }
    }

    impl<E> From<E> for ServerError
    where
        E: Into<anyhow::Error>,
    {
        fn from(err: E) -> Self {
            Self(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, time::Duration};

    use async_trait::async_trait;
    use config::{CounterRules, ServerKind, ServerSource};
    use control_channel::{ChannelError, ChannelResult, RawStats, StatSource};

    use super::*;

    struct FakeSource {
        source: ServerSource,
        stats: Option<RawStats>,
    }

    #[async_trait]
    impl StatSource for FakeSource {
        fn source(&self) -> &ServerSource {
            &self.source
        }

        async fn fetch_stats(&self) -> ChannelResult<RawStats> {
            self.stats
                .clone()
                .ok_or_else(|| ChannelError::Unreachable("connection refused".into()))
        }
    }

    fn fake(name: &str, stats: Option<serde_json::Value>) -> Arc<dyn StatSource> {
        Arc::new(FakeSource {
            source: ServerSource::new(
                format!("/run/kea/{name}.sock").parse().unwrap(),
                ServerKind::Dhcp4,
                Some(name.to_owned()),
                BTreeMap::new(),
            )
            .unwrap(),
            stats: stats.and_then(|v| v.as_object().cloned()),
        })
    }

    fn collector(sources: Vec<Arc<dyn StatSource>>) -> Arc<SnapshotCollector> {
        Arc::new(SnapshotCollector::new(
            sources,
            CounterRules::default(),
            Duration::from_secs(1),
        ))
    }

    #[tokio::test]
    async fn test_health() -> anyhow::Result<()> {
        let api = ExternalApi::new("127.0.0.1:8889".parse().unwrap(), collector(vec![]));
        let sender = api.sender();
        let _guard = api.start(CancellationToken::new());
        // wait for server to come up
        tokio::time::sleep(Duration::from_secs(1)).await;
        let r = reqwest::get("http://127.0.0.1:8889/health").await?;
        // initial health state will be BAD i.e. 500
        assert_eq!(r.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);

        sender.send(Health::Good).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let r = reqwest::get("http://127.0.0.1:8889/health").await?;
        assert_eq!(r.status(), reqwest::StatusCode::OK);

        let r = reqwest::get("http://127.0.0.1:8889/ping").await?;
        assert_eq!(r.status(), reqwest::StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn test_metrics_partial_failure() -> anyhow::Result<()> {
        let api = ExternalApi::new(
            "127.0.0.1:8888".parse().unwrap(),
            collector(vec![
                fake(
                    "up",
                    Some(serde_json::json!({
                        "subnet[1].total-addresses": 256,
                        "pkt4-received": [[12, "2024-01-01 00:00:00.000000"]]
                    })),
                ),
                fake("down", None),
            ]),
        );
        let _guard = api.start(CancellationToken::new());
        tokio::time::sleep(Duration::from_secs(1)).await;

        let resp = reqwest::get("http://127.0.0.1:8888/metrics").await?;
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        assert_eq!(content_type.as_deref(), Some("text/plain; version=0.0.4"));

        let body = resp.text().await?;
        assert!(body.contains("# TYPE kea_total_addresses gauge"));
        assert!(body.contains("kea_total_addresses{pool_id=\"\",server=\"up\",subnet_id=\"1\"} 256"));
        assert!(body.contains("# TYPE kea_pkt4_received counter"));
        assert!(!body.contains("server=\"down\""));
        Ok(())
    }

    #[tokio::test]
    async fn test_exporter_metrics_and_shutdown() -> anyhow::Result<()> {
        let token = CancellationToken::new();
        let api = ExternalApi::new(
            "127.0.0.1:8887".parse().unwrap(),
            collector(vec![fake("down", None)]),
        );
        let mut guard = api.start(token.clone());
        tokio::time::sleep(Duration::from_secs(1)).await;

        // scrape once so the self-metrics have something to report
        reqwest::get("http://127.0.0.1:8887/metrics")
            .await?
            .error_for_status()?;
        let body = reqwest::get("http://127.0.0.1:8887/exporter-metrics")
            .await?
            .error_for_status()?
            .text()
            .await?;
        assert!(body.contains("kea_exporter_scrapes"));
        assert!(body.contains("kea_exporter_fetch_errors{error=\"unreachable\"}"));

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), guard.handle()).await??;
        Ok(())
    }
}
