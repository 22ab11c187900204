//! Building `statistic-get-all` commands and validating what comes back.
//!
//! The control agent answers with a JSON array holding one response per
//! service, a daemon socket answers with a bare object. Both are accepted; of
//! an array only the first element is used since we address exactly one
//! service per source.

use serde::Deserialize;
use serde_json::Value;

use config::ServerKind;

use crate::error::{ChannelError, ChannelResult};
use crate::models::{ResultCode, STATISTIC_GET_ALL, StatQuery, StatResponse};

/// The statistics command for a daemon of `kind`. Carries the service list;
/// use [`StatQuery::direct`] when talking to the daemon's own socket.
pub fn build_query(kind: ServerKind) -> StatQuery {
    StatQuery {
        command: STATISTIC_GET_ALL.to_owned(),
        service: Some(vec![kind.service().to_owned()]),
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    result: i64,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Decode and validate one response document.
pub fn parse_response(bytes: &[u8]) -> ChannelResult<StatResponse> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| ChannelError::Protocol(format!("response is not valid JSON: {e}")))?;

    let value = match value {
        Value::Array(mut items) => {
            if items.is_empty() {
                return Err(ChannelError::Protocol("empty response list".into()));
            }
            items.swap_remove(0)
        }
        other => other,
    };

    let envelope: Envelope = serde_json::from_value(value)
        .map_err(|e| ChannelError::Protocol(format!("malformed response: {e}")))?;
    let result = ResultCode::from(envelope.result);

    let stats = match (result, envelope.arguments) {
        (ResultCode::Success, Some(Value::Object(map))) => Some(map),
        (ResultCode::Success, Some(_)) => {
            return Err(ChannelError::Protocol("arguments is not an object".into()));
        }
        (ResultCode::Success, None) => {
            return Err(ChannelError::Protocol(
                "successful response without arguments".into(),
            ));
        }
        _ => None,
    };

    Ok(StatResponse {
        result,
        text: envelope.text,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_query() {
        let q = build_query(ServerKind::Ddns);
        assert_eq!(q.command, "statistic-get-all");
        assert_eq!(q.service, Some(vec!["d2".to_owned()]));
        assert_eq!(build_query(ServerKind::Dhcp6).service.unwrap(), ["dhcp6"]);
    }

    #[test]
    fn test_parse_object() {
        let resp = parse_response(
            br#"{"result": 0, "arguments": {"pkt4-received": [[10, "2024-01-01 00:00:00.000000"]]}}"#,
        )
        .unwrap();
        assert_eq!(resp.result, ResultCode::Success);
        let stats = resp.into_stats().unwrap();
        assert!(stats.contains_key("pkt4-received"));
    }

    #[test]
    fn test_parse_agent_array() {
        let resp = parse_response(
            br#"[{"result": 0, "text": "ok", "arguments": {"a": 1}}, {"result": 1}]"#,
        )
        .unwrap();
        assert_eq!(resp.text.as_deref(), Some("ok"));
        assert_eq!(resp.into_stats().unwrap()["a"], 1);

        assert!(matches!(
            parse_response(b"[]"),
            Err(ChannelError::Protocol(_))
        ));
    }

    #[test]
    fn test_parse_failure_codes() {
        let resp =
            parse_response(br#"{"result": 2, "text": "unsupported command"}"#).unwrap();
        assert_eq!(resp.result, ResultCode::Unsupported);
        assert_eq!(
            resp.into_stats(),
            Err(ChannelError::CommandFailed {
                code: 2,
                text: "unsupported command".into()
            })
        );
    }

    #[test]
    fn test_parse_malformed() {
        for input in [
            &b"not json"[..],
            br#"{"text": "no result"}"#,
            br#"{"result": "zero"}"#,
            br#"{"result": 0}"#,
            br#"{"result": 0, "arguments": [1, 2]}"#,
            br#"42"#,
        ] {
            assert!(
                matches!(parse_response(input), Err(ChannelError::Protocol(_))),
                "{}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let resp =
            parse_response(br#"{"result": 0, "arguments": {}, "extra": [1, 2, 3]}"#).unwrap();
        assert!(resp.into_stats().unwrap().is_empty());
    }
}
