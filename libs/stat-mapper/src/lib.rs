//! # stat-mapper
//!
//! Turns the raw `statistic-get-all` arguments of one daemon into metric
//! samples. Pure and synchronous: the same input always yields the same
//! samples in the same order.
//!
//! `subnet[7].pool[2].total-addresses = 100` becomes
//! `kea_total_addresses{server="..",subnet_id="7",pool_id="2"} 100`, a gauge.
use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::trace;

use config::{
    CounterRules, ServerSource,
    source::{POOL_LABEL, SUBNET_LABEL},
};

pub mod key;
pub mod kind;
pub mod value;

pub use key::{KeyError, Segment, StatKey};
pub use kind::MetricKind;
pub use value::{Sample, StatValue, ValueError};

/// every exported family is prefixed with this
pub const METRIC_PREFIX: &str = "kea_";

/// label name -> value, ordered so output is stable
pub type LabelSet = BTreeMap<String, String>;

/// One exported time series value.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub kind: MetricKind,
    pub labels: LabelSet,
    pub value: f64,
    /// base statistic name, without hierarchy segments
    pub base: String,
    /// raw key this sample came from
    pub stat: String,
}

/// Why a raw statistic was not exported. One key only, never fatal.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MappingWarning {
    #[error("malformed key `{key}`: {source}")]
    MalformedKey { key: String, source: KeyError },
    #[error("malformed value for `{key}`: {source}")]
    MalformedValue { key: String, source: ValueError },
    #[error("negative value {value} for counter `{key}`")]
    NegativeCounter { key: String, value: f64 },
    #[error("`{key}` maps onto `{metric}` which is already exported with the same labels")]
    Duplicate { key: String, metric: String },
    #[error("`{key}` maps onto `{metric}` which is already exported as a {existing}")]
    KindMismatch {
        key: String,
        metric: String,
        existing: MetricKind,
    },
}

impl MappingWarning {
    /// raw statistic key the warning is about
    pub fn key(&self) -> &str {
        match self {
            MappingWarning::MalformedKey { key, .. }
            | MappingWarning::MalformedValue { key, .. }
            | MappingWarning::NegativeCounter { key, .. }
            | MappingWarning::Duplicate { key, .. }
            | MappingWarning::KindMismatch { key, .. } => key,
        }
    }
}

/// Output of [`map`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapped {
    pub samples: Vec<MetricSample>,
    pub warnings: Vec<MappingWarning>,
}

/// `kea_` + base name, lowercased, anything outside `[a-z0-9]` replaced by `_`
pub fn metric_name(base: &str) -> String {
    format!("{METRIC_PREFIX}{}", key::sanitize(base))
}

/// Map every statistic of `source`. Keys that can't be mapped are skipped
/// with a warning, the rest are still exported.
pub fn map(source: &ServerSource, raw: &Map<String, Value>, rules: &CounterRules) -> Mapped {
    let mut out = Mapped::default();
    for (raw_key, raw_value) in raw {
        match map_one(source, raw_key, raw_value, rules) {
            Ok(sample) => out.samples.push(sample),
            Err(warning) => out.warnings.push(warning),
        }
    }
    trace!(
        server = %source.identity(),
        samples = out.samples.len(),
        warnings = out.warnings.len(),
        "mapped statistics"
    );
    out
}

fn map_one(
    source: &ServerSource,
    raw_key: &str,
    raw_value: &Value,
    rules: &CounterRules,
) -> Result<MetricSample, MappingWarning> {
    let key = StatKey::parse(raw_key).map_err(|err| MappingWarning::MalformedKey {
        key: raw_key.to_owned(),
        source: err,
    })?;
    let value = StatValue::decode(raw_value)
        .and_then(|v| v.latest().ok_or(ValueError::EmptyList))
        .map_err(|err| MappingWarning::MalformedValue {
            key: raw_key.to_owned(),
            source: err,
        })?;

    let kind = MetricKind::classify(&key.base, rules);
    if kind == MetricKind::Counter && value < 0.0 {
        return Err(MappingWarning::NegativeCounter {
            key: raw_key.to_owned(),
            value,
        });
    }

    Ok(MetricSample {
        name: metric_name(&key.base),
        kind,
        labels: labels_for(source, &key),
        value,
        base: key.base.clone(),
        stat: raw_key.to_owned(),
    })
}

/// `server` and the hierarchy labels always present (empty when the key
/// has no such segment), then static labels. Config validation keeps static
/// label names clear of `*_id`, so the two never overlap.
fn labels_for(source: &ServerSource, key: &StatKey) -> LabelSet {
    let mut labels = LabelSet::new();
    labels.insert(SUBNET_LABEL.to_owned(), String::new());
    labels.insert(POOL_LABEL.to_owned(), String::new());
    for seg in &key.segments {
        labels.insert(seg.label(), seg.id().to_owned());
    }
    for (name, value) in source.identity_labels() {
        labels.entry(name).or_insert(value);
    }
    labels
}
