//! Counter/gauge classification table.
//!
//! Kea does not say whether a statistic is monotonic, so the kind is inferred
//! from its base name. The table is plain data so it can be corrected from the
//! config file without touching the mapper.

use serde::{Deserialize, Serialize};

/// base-name prefixes that mark a statistic as a counter
pub const DEFAULT_COUNTER_PREFIXES: [&str; 2] = ["pkt", "cumulative-"];
/// base-name suffixes that mark a statistic as a counter
pub const DEFAULT_COUNTER_SUFFIXES: [&str; 5] =
    ["-sent", "-received", "-drop", "-error", "-reuses"];

/// A base name matching any prefix or suffix is a counter, anything else is a gauge
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CounterRules {
    #[serde(default)]
    pub prefixes: Vec<String>,
    #[serde(default)]
    pub suffixes: Vec<String>,
}

impl CounterRules {
    /// does `base` name a monotonic statistic?
    pub fn is_counter(&self, base: &str) -> bool {
        self.prefixes.iter().any(|p| base.starts_with(p.as_str()))
            || self.suffixes.iter().any(|s| base.ends_with(s.as_str()))
    }
}

impl Default for CounterRules {
    fn default() -> Self {
        Self {
            prefixes: DEFAULT_COUNTER_PREFIXES.iter().map(|s| s.to_string()).collect(),
            suffixes: DEFAULT_COUNTER_SUFFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }
}
