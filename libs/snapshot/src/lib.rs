//! # snapshot
//!
//! Builds the exposition for one scrape: every configured control channel is
//! queried concurrently, successful answers are mapped and merged, failures
//! only cost their own source's samples. Nothing is kept between scrapes
//! apart from which mapping warnings were already logged.
use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info_span, warn};
use tracing_futures::Instrument;

use config::{CounterRules, ServerSource};
use control_channel::{ChannelError, ChannelResult, RawStats, StatSource};
use exporter_core::metrics;
use stat_mapper::MappingWarning;

mod exposition;

pub use exposition::Snapshot;

/// extra time over the per-fetch timeout before the scrape stops waiting
pub const DEFAULT_GRACE: Duration = Duration::from_millis(500);

/// Queries every source on demand and merges the results.
pub struct SnapshotCollector {
    sources: Vec<Arc<dyn StatSource>>,
    rules: Arc<CounterRules>,
    deadline: Duration,
    // (server, key) pairs already logged at warn
    warned: Mutex<HashSet<(String, String)>>,
}

impl std::fmt::Debug for SnapshotCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCollector")
            .field(
                "sources",
                &self
                    .sources
                    .iter()
                    .map(|s| s.source().identity().to_owned())
                    .collect::<Vec<_>>(),
            )
            .field("rules", &self.rules)
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl SnapshotCollector {
    /// `timeout` is the per-source fetch timeout; the scrape as a whole
    /// gives up on a source after `timeout + DEFAULT_GRACE`.
    pub fn new(sources: Vec<Arc<dyn StatSource>>, rules: CounterRules, timeout: Duration) -> Self {
        Self {
            sources,
            rules: Arc::new(rules),
            deadline: timeout + DEFAULT_GRACE,
            warned: Mutex::new(HashSet::new()),
        }
    }

    pub fn sources(&self) -> impl Iterator<Item = &ServerSource> {
        self.sources.iter().map(|s| s.source())
    }

    /// Query every source and build a fresh snapshot.
    pub async fn collect(&self) -> Snapshot {
        let timer = metrics::SCRAPE_DURATION.start_timer();
        let results = join_all(self.sources.iter().map(|src| self.fetch(src.clone()))).await;

        let mut snapshot = Snapshot::default();
        let mut failed = 0;
        for (src, res) in results {
            let server = src.source();
            match res {
                Ok(raw) => {
                    let mapped = stat_mapper::map(server, &raw, &self.rules);
                    for warning in &mapped.warnings {
                        self.report(server, warning);
                    }
                    for warning in &snapshot.merge(mapped.samples) {
                        self.report(server, warning);
                    }
                }
                Err(err) => {
                    failed += 1;
                    record_error(&err);
                    warn!(server = %server.identity(), address = %server.address(), %err, "failed to fetch statistics");
                }
            }
        }

        metrics::SNAPSHOT_SAMPLES.set(snapshot.len() as i64);
        metrics::SCRAPE_COUNT.inc();
        timer.observe_duration();
        debug!(
            sources = self.sources.len(),
            failed,
            samples = snapshot.len(),
            "snapshot collected"
        );
        snapshot
    }

    async fn fetch(
        &self,
        src: Arc<dyn StatSource>,
    ) -> (Arc<dyn StatSource>, ChannelResult<RawStats>) {
        let span = info_span!("fetch", server = %src.source().identity());
        let deadline = self.deadline;
        async move {
            let start = Instant::now();
            let res = match tokio::time::timeout(deadline, src.fetch_stats()).await {
                Ok(res) => res,
                Err(_) => Err(ChannelError::Timeout(format!(
                    "source did not finish within {deadline:?}"
                ))),
            };
            metrics::FETCH_DURATION.observe(start.elapsed().as_secs_f64());
            (src, res)
        }
        .instrument(span)
        .await
    }

    /// Log a mapping warning, at warn the first time per (server, key) and
    /// at debug after that.
    fn report(&self, server: &ServerSource, warning: &MappingWarning) {
        metrics::MAPPING_WARNINGS.inc();
        let first = self
            .warned
            .lock()
            .insert((server.identity().to_owned(), warning.key().to_owned()));
        if first {
            warn!(server = %server.identity(), %warning, "statistic not exported");
        } else {
            debug!(server = %server.identity(), %warning, "statistic not exported");
        }
    }
}

fn record_error(err: &ChannelError) {
    match err {
        ChannelError::Unreachable(_) => metrics::FETCH_ERRORS.unreachable.inc(),
        ChannelError::Timeout(_) => metrics::FETCH_ERRORS.timeout.inc(),
        ChannelError::Protocol(_) => metrics::FETCH_ERRORS.protocol.inc(),
        ChannelError::CommandFailed { .. } => metrics::FETCH_ERRORS.command_failed.inc(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use serde_json::json;

    use config::ServerKind;
    use stat_mapper::LabelSet;

    use super::*;

    /// canned answer standing in for a Kea daemon
    struct FakeSource {
        source: ServerSource,
        reply: Reply,
    }

    enum Reply {
        Stats(serde_json::Value),
        Fail(ChannelError),
        Hang,
    }

    #[async_trait]
    impl StatSource for FakeSource {
        fn source(&self) -> &ServerSource {
            &self.source
        }

        async fn fetch_stats(&self) -> ChannelResult<RawStats> {
            match &self.reply {
                Reply::Stats(serde_json::Value::Object(map)) => Ok(map.clone()),
                Reply::Stats(_) => Err(ChannelError::Protocol("not an object".into())),
                Reply::Fail(err) => Err(err.clone()),
                Reply::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    fn fake(name: &str, reply: Reply) -> Arc<dyn StatSource> {
        Arc::new(FakeSource {
            source: ServerSource::new(
                format!("/run/kea/{name}.sock").parse().unwrap(),
                ServerKind::Dhcp4,
                Some(name.to_owned()),
                BTreeMap::new(),
            )
            .unwrap(),
            reply,
        })
    }

    fn labels(server: &str, subnet: &str) -> LabelSet {
        BTreeMap::from([
            ("pool_id".to_owned(), String::new()),
            ("server".to_owned(), server.to_owned()),
            ("subnet_id".to_owned(), subnet.to_owned()),
        ])
    }

    fn collector(sources: Vec<Arc<dyn StatSource>>) -> SnapshotCollector {
        SnapshotCollector::new(sources, CounterRules::default(), Duration::from_secs(3))
    }

    #[tokio::test]
    async fn test_partial_failure() {
        let collector = collector(vec![
            fake(
                "a",
                Reply::Stats(json!({
                    "subnet[1].total-addresses": 100,
                    "pkt4-received": [[5, "2024-01-01 00:00:00.000000"]]
                })),
            ),
            fake(
                "b",
                Reply::Fail(ChannelError::Unreachable("connection refused".into())),
            ),
            fake(
                "c",
                Reply::Fail(ChannelError::CommandFailed {
                    code: 2,
                    text: "unsupported".into(),
                }),
            ),
        ]);
        let snap = collector.collect().await;
        assert_eq!(snap.len(), 2);
        assert_eq!(
            snap.value("kea_total_addresses", &labels("a", "1")),
            Some(100.0)
        );
        assert_eq!(snap.value("kea_pkt4_received", &labels("a", "")), Some(5.0));
        assert!(
            !snap
                .encode_text()
                .unwrap()
                .contains("server=\"b\"")
        );
    }

    #[tokio::test]
    async fn test_all_failed_is_empty() {
        let collector = collector(vec![fake(
            "a",
            Reply::Fail(ChannelError::Protocol("garbage".into())),
        )]);
        let snap = collector.collect().await;
        assert!(snap.is_empty());
        assert_eq!(snap.encode_text().unwrap(), "");
    }

    #[tokio::test]
    async fn test_idempotent_rescrape() {
        let collector = collector(vec![
            fake(
                "a",
                Reply::Stats(json!({
                    "subnet[1].assigned-addresses": 3,
                    "subnet[2].assigned-addresses": 4,
                    "pkt4-sent": 9
                })),
            ),
            fake("b", Reply::Stats(json!({"subnet[1].assigned-addresses": 1}))),
        ]);
        let first = collector.collect().await.encode_text().unwrap();
        let second = collector.collect().await.encode_text().unwrap();
        assert_eq!(first, second);
        assert!(first.contains("kea_assigned_addresses{pool_id=\"\",server=\"b\",subnet_id=\"1\"} 1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_source_bounded() {
        let collector = collector(vec![
            fake("a", Reply::Stats(json!({"total-addresses": 1}))),
            fake("stuck", Reply::Hang),
        ]);
        let start = tokio::time::Instant::now();
        let snap = collector.collect().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) + DEFAULT_GRACE, "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.names().collect::<Vec<_>>(), ["kea_total_addresses"]);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_warn_once() {
        let collector = collector(vec![fake(
            "a",
            Reply::Stats(json!({"assigned-addresses": "many", "total-addresses": 2})),
        )]);
        collector.collect().await;
        collector.collect().await;
        logs_assert(|lines: &[&str]| {
            let warns = lines
                .iter()
                .filter(|l| l.contains("WARN") && l.contains("statistic not exported"))
                .count();
            let debugs = lines
                .iter()
                .filter(|l| l.contains("DEBUG") && l.contains("statistic not exported"))
                .count();
            match (warns, debugs) {
                (1, 1) => Ok(()),
                other => Err(format!("expected one warn and one debug, got {other:?}")),
            }
        });
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_fetch_failure_logged() {
        let collector = collector(vec![fake(
            "a",
            Reply::Fail(ChannelError::Timeout("no response".into())),
        )]);
        collector.collect().await;
        assert!(logs_contain("failed to fetch statistics"));
    }
}
