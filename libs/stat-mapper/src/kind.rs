use std::fmt;

use config::CounterRules;

/// Prometheus type a statistic is exported as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn classify(base: &str, rules: &CounterRules) -> Self {
        if rules.is_counter(base) {
            MetricKind::Counter
        } else {
            MetricKind::Gauge
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Gauge => write!(f, "gauge"),
            MetricKind::Counter => write!(f, "counter"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let rules = CounterRules::default();
        assert_eq!(
            MetricKind::classify("pkt4-received", &rules),
            MetricKind::Counter
        );
        assert_eq!(
            MetricKind::classify("total-addresses", &rules),
            MetricKind::Gauge
        );
        let empty = CounterRules {
            prefixes: vec![],
            suffixes: vec![],
        };
        assert_eq!(MetricKind::classify("pkt4-received", &empty), MetricKind::Gauge);
    }
}
