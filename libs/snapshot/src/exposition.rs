//! The samples of one scrape, grouped by family, and their text encoding.
//!
//! Families are built straight into `prometheus::proto` types and encoded
//! with the stock [`TextEncoder`]; nothing here touches a registry.

use std::collections::{BTreeMap, BTreeSet};

use prometheus::{
    TEXT_FORMAT, TextEncoder,
    proto::{self, MetricType},
};

use stat_mapper::{LabelSet, MappingWarning, MetricKind, MetricSample};

#[derive(Debug, Clone, PartialEq)]
struct Family {
    kind: MetricKind,
    help: String,
    series: BTreeMap<LabelSet, f64>,
}

/// Everything one scrape produced. Ordered by metric name, then label set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    families: BTreeMap<String, Family>,
}

impl Snapshot {
    /// Add samples. The first sample for a `(name, labels)` pair wins, as
    /// does the first kind seen for a name; anything else comes back as a
    /// warning.
    pub fn merge<I>(&mut self, samples: I) -> Vec<MappingWarning>
    where
        I: IntoIterator<Item = MetricSample>,
    {
        let mut warnings = Vec::new();
        for sample in samples {
            let family = self
                .families
                .entry(sample.name.clone())
                .or_insert_with(|| Family {
                    kind: sample.kind,
                    help: format!("Kea statistic {}", sample.base),
                    series: BTreeMap::new(),
                });
            if family.kind != sample.kind {
                warnings.push(MappingWarning::KindMismatch {
                    key: sample.stat,
                    metric: sample.name,
                    existing: family.kind,
                });
                continue;
            }
            if family.series.contains_key(&sample.labels) {
                warnings.push(MappingWarning::Duplicate {
                    key: sample.stat,
                    metric: sample.name,
                });
                continue;
            }
            family.series.insert(sample.labels, sample.value);
        }
        warnings
    }

    /// number of samples
    pub fn len(&self) -> usize {
        self.families.values().map(|f| f.series.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// metric names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.families.keys().map(String::as_str)
    }

    pub fn kind(&self, name: &str) -> Option<MetricKind> {
        self.families.get(name).map(|f| f.kind)
    }

    /// value of one series, by its exact label set
    pub fn value(&self, name: &str, labels: &LabelSet) -> Option<f64> {
        self.families.get(name)?.series.get(labels).copied()
    }

    /// Build the proto families. Every series in a family is given the
    /// union of the family's label names, missing ones with an empty value.
    pub fn to_metric_families(&self) -> Vec<proto::MetricFamily> {
        self.families
            .iter()
            .map(|(name, family)| {
                let keys = family
                    .series
                    .keys()
                    .flat_map(|labels| labels.keys())
                    .collect::<BTreeSet<_>>();

                let mut mf = proto::MetricFamily::default();
                mf.set_name(name.clone());
                mf.set_help(family.help.clone());
                mf.set_field_type(match family.kind {
                    MetricKind::Gauge => MetricType::GAUGE,
                    MetricKind::Counter => MetricType::COUNTER,
                });
                for (labels, value) in &family.series {
                    let mut m = proto::Metric::default();
                    for key in &keys {
                        let mut pair = proto::LabelPair::default();
                        pair.set_name((*key).clone());
                        pair.set_value(labels.get(*key).cloned().unwrap_or_default());
                        m.mut_label().push(pair);
                    }
                    match family.kind {
                        MetricKind::Gauge => {
                            let mut g = proto::Gauge::default();
                            g.set_value(*value);
                            m.set_gauge(g);
                        }
                        MetricKind::Counter => {
                            let mut c = proto::Counter::default();
                            c.set_value(*value);
                            m.set_counter(c);
                        }
                    }
                    mf.mut_metric().push(m);
                }
                mf
            })
            .collect()
    }

    /// Prometheus text exposition of the whole snapshot
    pub fn encode_text(&self) -> prometheus::Result<String> {
        let mut buf = String::new();
        TextEncoder::new().encode_utf8(&self.to_metric_families(), &mut buf)?;
        Ok(buf)
    }

    /// content type of [`encode_text`](Self::encode_text)
    pub fn format_type() -> &'static str {
        TEXT_FORMAT
    }
}
