//! # config
//!
//! Exporter configuration: which Kea control channels to poll, how long to
//! wait for each and how statistics are classified. Sources come from a YAML
//! or JSON file, from `--target` flags, or both; everything is validated here
//! so the rest of the exporter only ever sees consistent, immutable values.
use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use tracing::{debug, warn};

pub mod error;
pub mod rules;
pub mod source;
pub mod wire;

pub use error::ConfigError;
pub use rules::CounterRules;
pub use source::{ServerKind, ServerSource, Transport};

/// validated exporter config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterConfig {
    sources: Vec<Arc<ServerSource>>,
    rules: CounterRules,
    timeout: Option<Duration>,
    max_response_size: Option<usize>,
    path: Option<PathBuf>,
}

impl ExporterConfig {
    /// Load sources from an optional config file plus any `<kind>@<address>`
    /// targets. File sources come first, in file order.
    pub fn load<P: AsRef<Path>>(path: Option<P>, targets: &[String]) -> Result<Self> {
        let (mut wire, path) = match path {
            Some(path) => {
                let path = path.as_ref();
                let input = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to find config at {}", path.display()))?;
                let wire = Self::decode(&input)
                    .with_context(|| format!("failed to decode config at {}", path.display()))?;
                (wire, Some(path.to_path_buf()))
            }
            None => (wire::Config::default(), None),
        };
        for target in targets {
            wire.sources.push(target.parse::<wire::Source>()?);
        }
        let mut cfg = Self::try_from(wire)?;
        cfg.path = path;
        debug!(?cfg);
        Ok(cfg)
    }

    /// attempts to decode the config first as JSON, then YAML, finally erroring if neither work
    pub fn parse_str<S: AsRef<str>>(s: S) -> Result<Self> {
        let cfg = Self::try_from(Self::decode(s.as_ref())?)?;
        debug!(?cfg);
        Ok(cfg)
    }

    fn decode(input: &str) -> Result<wire::Config> {
        match serde_json::from_str::<wire::Config>(input) {
            Ok(cfg) => Ok(cfg),
            Err(_err) => Ok(serde_yaml::from_str::<wire::Config>(input)?),
        }
    }

    /// sources in configuration order
    pub fn sources(&self) -> &[Arc<ServerSource>] {
        &self.sources
    }
    pub fn rules(&self) -> &CounterRules {
        &self.rules
    }
    /// timeout from the config file, if it set one. Takes precedence over the cli
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
    /// response size limit from the config file, if it set one
    pub fn max_response_size(&self) -> Option<usize> {
        self.max_response_size
    }
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Warn about unix sockets that don't exist or that we can't open yet.
    /// Not fatal: Kea may simply not be up, the source will come back on a
    /// later scrape once it is.
    pub fn check_sockets(&self) -> usize {
        let mut missing = 0;
        for src in &self.sources {
            let Some(path) = src.address().unix_path() else {
                continue;
            };
            match std::fs::metadata(path) {
                Err(err) => {
                    missing += 1;
                    warn!(server = %src.identity(), path = %path.display(), ?err, "control socket does not exist, is Kea running?");
                }
                Ok(meta) if meta.permissions().readonly() => {
                    missing += 1;
                    warn!(server = %src.identity(), path = %path.display(), "control socket is not writeable");
                }
                Ok(_) => {}
            }
        }
        missing
    }
}

impl TryFrom<wire::Config> for ExporterConfig {
    type Error = ConfigError;

    fn try_from(cfg: wire::Config) -> Result<Self, ConfigError> {
        if cfg.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        if cfg.timeout == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidTimeout);
        }
        if cfg.max_response_size == Some(0) {
            return Err(ConfigError::InvalidResponseLimit);
        }
        let sources = cfg
            .sources
            .into_iter()
            .map(|src| {
                let wire::Source {
                    address,
                    kind,
                    name,
                    labels,
                } = src;
                Ok(Arc::new(ServerSource::new(
                    address.parse()?,
                    kind,
                    name,
                    labels,
                )?))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        check_conflicts(&sources)?;

        Ok(Self {
            sources,
            rules: cfg.counter_rules.unwrap_or_default(),
            timeout: cfg.timeout,
            max_response_size: cfg.max_response_size,
            path: None,
        })
    }
}

/// Two sources with the same identity label set would produce the same
/// `(metric, labels)` pairs for every shared statistic. Reject that up front
/// instead of letting one source's samples silently win at scrape time.
fn check_conflicts(sources: &[Arc<ServerSource>]) -> Result<(), ConfigError> {
    let mut seen: HashMap<BTreeMap<String, String>, &ServerSource> = HashMap::new();
    for src in sources {
        let labels = src.identity_labels();
        if let Some(first) = seen.get(&labels) {
            return Err(ConfigError::Conflict {
                identity: render_labels(&labels),
                first: first.address().to_string(),
                second: src.address().to_string(),
            });
        }
        seen.insert(labels, src);
    }
    Ok(())
}

fn render_labels(labels: &BTreeMap<String, String>) -> String {
    let pairs = labels
        .iter()
        .map(|(k, v)| format!("{k}={v:?}"))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{pairs}}}")
}

#[cfg(test)]
mod tests {
    use super::*;

    pub static SAMPLE_YAML: &str = include_str!("../sample/config.yaml");
    pub static CONFLICT_YAML: &str = include_str!("../sample/conflict.yaml");

    #[test]
    fn test_sample() {
        let cfg = ExporterConfig::parse_str(SAMPLE_YAML).unwrap();
        assert_eq!(cfg.sources().len(), 3);
        assert_eq!(cfg.timeout(), Some(Duration::from_secs(2)));
        assert_eq!(cfg.max_response_size(), Some(64 * 1024 * 1024));
        assert_eq!(cfg.rules(), &CounterRules::default());

        let first = &cfg.sources()[0];
        assert_eq!(first.identity(), "edge-1");
        assert_eq!(
            first.address(),
            &Transport::Unix("/run/kea/kea4-ctrl-socket".into())
        );
        let ddns = &cfg.sources()[2];
        assert_eq!(ddns.identity(), "ddns@http://127.0.0.1:8000");
        assert!(ddns.address().routes_by_service());
    }

    #[test]
    fn test_conflict() {
        let err = ExporterConfig::parse_str(CONFLICT_YAML).unwrap_err();
        let err = err.downcast_ref::<ConfigError>().unwrap();
        assert!(err.is_conflict());
        assert_eq!(
            err,
            &ConfigError::Conflict {
                identity: "{server=\"edge-1\"}".into(),
                first: "/run/kea/kea4-ctrl-socket".into(),
                second: "10.0.0.2:8000".into(),
            }
        );
    }

    #[test]
    fn test_static_label_disambiguates() {
        let cfg = ExporterConfig::parse_str(
            r#"
sources:
  - address: /run/kea/a.sock
    kind: dhcp4
    name: edge
    labels: { site: ams }
  - address: /run/kea/b.sock
    kind: dhcp4
    name: edge
    labels: { site: fra }
"#,
        );
        assert!(cfg.is_ok());
    }

    #[test]
    fn test_target_conflict() {
        let targets = vec![
            "dhcp4@/run/kea/kea4.sock".to_owned(),
            "dhcp4@/run/kea/kea4.sock".to_owned(),
        ];
        let err = ExporterConfig::load(None::<&Path>, &targets).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().unwrap().is_conflict());
    }

    #[test]
    fn test_same_address_different_kind() {
        // one control agent fronting both daemons
        let targets = vec![
            "dhcp4@http://127.0.0.1:8000".to_owned(),
            "dhcp6@http://127.0.0.1:8000".to_owned(),
        ];
        let cfg = ExporterConfig::load(None::<&Path>, &targets).unwrap();
        assert_eq!(cfg.sources().len(), 2);
        assert!(cfg.path().is_none());
    }

    #[test]
    fn test_no_sources() {
        let err = ExporterConfig::load(None::<&Path>, &[]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::NoSources)
        );
    }

    #[test]
    fn test_zero_timeout() {
        let err = ExporterConfig::parse_str(
            "timeout: 0\nsources:\n  - { address: /run/kea.sock, kind: dhcp4 }\n",
        )
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::InvalidTimeout)
        );
    }

    #[test]
    fn test_zero_response_limit() {
        let err = ExporterConfig::parse_str(
            "max_response_size: 0\nsources:\n  - { address: /run/kea.sock, kind: dhcp4 }\n",
        )
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::InvalidResponseLimit)
        );
    }

    #[test]
    fn test_counter_rules_override() {
        let cfg = ExporterConfig::parse_str(
            r#"{"counter_rules": {"prefixes": ["pkt"]}, "sources": [{"address": "/run/kea.sock", "kind": "dhcp4"}]}"#,
        )
        .unwrap();
        assert!(cfg.rules().is_counter("pkt4-sent"));
        assert!(!cfg.rules().is_counter("cumulative-assigned-addresses"));
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_check_sockets_warns() {
        let cfg = ExporterConfig::load(
            None::<&Path>,
            &["dhcp4@/nonexistent/kea4.sock".to_owned(), "dhcp6@127.0.0.1:8000".to_owned()],
        )
        .unwrap();
        assert_eq!(cfg.check_sockets(), 1);
        assert!(logs_contain("control socket does not exist"));
    }
}
