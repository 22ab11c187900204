//! Statistic values as Kea reports them.
//!
//! Kea keeps a short history per statistic: `[[value, timestamp], ...]`.
//! Older builds and some hooks report a bare number instead. Timestamps are
//! either `"YYYY-MM-DD HH:MM:SS.ffffff"` strings or epoch seconds.

use chrono::NaiveDateTime;
use serde_json::Value;
use thiserror::Error;

const KEA_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValueError {
    #[error("unsupported value type: {0}")]
    Unsupported(&'static str),
    #[error("sample list is empty")]
    EmptyList,
    #[error("sample {0} is not a [value, timestamp] pair")]
    BadSample(usize),
    #[error("sample {index} has an unreadable timestamp `{raw}`")]
    BadTimestamp { index: usize, raw: String },
}

/// one history entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub value: f64,
    /// microseconds since the unix epoch
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatValue {
    Scalar(f64),
    SampleList(Vec<Sample>),
}

impl StatValue {
    pub fn decode(raw: &Value) -> Result<Self, ValueError> {
        match raw {
            Value::Number(n) => n
                .as_f64()
                .map(StatValue::Scalar)
                .ok_or(ValueError::Unsupported("number")),
            Value::Array(entries) => {
                if entries.is_empty() {
                    return Err(ValueError::EmptyList);
                }
                entries
                    .iter()
                    .enumerate()
                    .map(|(index, entry)| decode_sample(index, entry))
                    .collect::<Result<Vec<_>, _>>()
                    .map(StatValue::SampleList)
            }
            Value::String(_) => Err(ValueError::Unsupported("string")),
            Value::Bool(_) => Err(ValueError::Unsupported("bool")),
            Value::Object(_) => Err(ValueError::Unsupported("object")),
            Value::Null => Err(ValueError::Unsupported("null")),
        }
    }

    /// Current value: the scalar itself, or the entry with the newest
    /// timestamp. Equal timestamps resolve to the entry listed last.
    pub fn latest(&self) -> Option<f64> {
        match self {
            StatValue::Scalar(v) => Some(*v),
            // max_by_key returns the last of equal maxima
            StatValue::SampleList(samples) => samples
                .iter()
                .max_by_key(|s| s.timestamp)
                .map(|s| s.value),
        }
    }
}

fn decode_sample(index: usize, entry: &Value) -> Result<Sample, ValueError> {
    let pair = match entry.as_array() {
        Some(pair) if pair.len() >= 2 => pair,
        _ => return Err(ValueError::BadSample(index)),
    };
    let value = pair[0].as_f64().ok_or(ValueError::BadSample(index))?;
    let timestamp = parse_timestamp(&pair[1]).ok_or_else(|| ValueError::BadTimestamp {
        index,
        raw: pair[1].to_string(),
    })?;
    Ok(Sample { value, timestamp })
}

fn parse_timestamp(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => {
            if let Some(secs) = n.as_i64() {
                secs.checked_mul(1_000_000)
            } else {
                let secs = n.as_f64()?;
                secs.is_finite().then(|| (secs * 1_000_000.0) as i64)
            }
        }
        Value::String(s) => NaiveDateTime::parse_from_str(s.trim(), KEA_TIME_FORMAT)
            .ok()
            .map(|dt| dt.and_utc().timestamp_micros()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_scalar() {
        assert_eq!(
            StatValue::decode(&json!(100)).unwrap(),
            StatValue::Scalar(100.0)
        );
        assert_eq!(StatValue::decode(&json!(2.5)).unwrap().latest(), Some(2.5));
    }

    #[test]
    fn test_latest_by_timestamp() {
        let v = StatValue::decode(&json!([
            [5, "2024-01-01 10:00:01.000000"],
            [9, "2024-01-01 10:00:03.500000"],
            [7, "2024-01-01 10:00:02.000000"],
        ]))
        .unwrap();
        assert_eq!(v.latest(), Some(9.0));

        let v = StatValue::decode(&json!([[42, 1690000000]])).unwrap();
        assert_eq!(v.latest(), Some(42.0));
    }

    #[test]
    fn test_tie_takes_last() {
        let v = StatValue::decode(&json!([
            [1, "2024-01-01 10:00:00.000000"],
            [2, "2024-01-01 10:00:00.000000"],
        ]))
        .unwrap();
        assert_eq!(v.latest(), Some(2.0));
    }

    #[test]
    fn test_malformed() {
        assert_eq!(
            StatValue::decode(&json!("oops")),
            Err(ValueError::Unsupported("string"))
        );
        assert_eq!(
            StatValue::decode(&json!({"a": 1})),
            Err(ValueError::Unsupported("object"))
        );
        assert_eq!(
            StatValue::decode(&json!(true)),
            Err(ValueError::Unsupported("bool"))
        );
        assert_eq!(StatValue::decode(&json!([])), Err(ValueError::EmptyList));
        assert_eq!(
            StatValue::decode(&json!([[1]])),
            Err(ValueError::BadSample(0))
        );
        assert_eq!(
            StatValue::decode(&json!([[1, 1], ["x", 2]])),
            Err(ValueError::BadSample(1))
        );
        assert!(matches!(
            StatValue::decode(&json!([[1, "yesterday"]])),
            Err(ValueError::BadTimestamp { index: 0, .. })
        ));
    }
}
