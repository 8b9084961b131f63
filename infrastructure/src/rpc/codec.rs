//! Line codec for JSON-RPC envelopes.
//!
//! One envelope per newline-terminated line. [`encode`] renders the complete
//! line before anything touches the transport, and [`decode`] turns every
//! line into either an [`Envelope`] or a typed [`ParseError`]; it never
//! panics and never ends the stream.
//!
//! Classification follows JSON-RPC:
//!
//! | Keys present                      | Envelope     |
//! |-----------------------------------|--------------|
//! | `id` + `method`                   | Request      |
//! | `method` only                     | Notification |
//! | `id` + exactly one of `result`/`error` | Response |

use super::envelope::{
    Envelope, ErrorCode, ErrorObject, JSONRPC_VERSION, Notification, Request, RequestId, Response,
};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while encoding outgoing envelopes
#[derive(Error, Debug, Clone)]
pub enum CodecError {
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::Encoding(e.to_string())
    }
}

/// Why an incoming line was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorReason {
    /// Not JSON at all
    InvalidJson(String),
    /// JSON, but not a valid envelope
    InvalidEnvelope(String),
}

impl std::fmt::Display for ParseErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseErrorReason::InvalidJson(e) => write!(f, "invalid JSON: {}", e),
            ParseErrorReason::InvalidEnvelope(e) => write!(f, "invalid envelope: {}", e),
        }
    }
}

/// A line that could not be decoded
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{reason}")]
pub struct ParseError {
    /// The offending line
    pub line: String,
    pub reason: ParseErrorReason,
    /// Request id, when it could still be read from an invalid envelope
    pub id: Option<RequestId>,
}

impl ParseError {
    fn invalid_json(line: &str, e: serde_json::Error) -> Self {
        Self {
            line: line.to_string(),
            reason: ParseErrorReason::InvalidJson(e.to_string()),
            id: None,
        }
    }

    fn invalid_envelope(line: &str, id: Option<RequestId>, why: impl Into<String>) -> Self {
        Self {
            line: line.to_string(),
            reason: ParseErrorReason::InvalidEnvelope(why.into()),
            id,
        }
    }

    /// Error object to answer the offending line with
    pub fn to_error_object(&self) -> ErrorObject {
        match &self.reason {
            ParseErrorReason::InvalidJson(e) => {
                ErrorObject::new(ErrorCode::ParseError, format!("Parse error: {}", e))
            }
            ParseErrorReason::InvalidEnvelope(e) => {
                ErrorObject::new(ErrorCode::InvalidRequest, format!("Invalid request: {}", e))
            }
        }
    }
}

/// Encode an envelope into one line (without the trailing newline)
pub fn encode(envelope: &Envelope) -> Result<String, CodecError> {
    let value = envelope.to_value()?;
    Ok(serde_json::to_string(&value)?)
}

/// Decode one line into an envelope
pub fn decode(line: &str) -> Result<Envelope, ParseError> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| ParseError::invalid_json(line, e))?;

    let Value::Object(mut object) = value else {
        return Err(ParseError::invalid_envelope(line, None, "not a JSON object"));
    };

    let raw_id = object.remove("id");
    let id = match &raw_id {
        None | Some(Value::Null) => None,
        Some(v) => match RequestId::from_value(v) {
            Some(id) => Some(id),
            None => {
                return Err(ParseError::invalid_envelope(line, None, "invalid id"));
            }
        },
    };

    match object.get("jsonrpc") {
        None => {}
        Some(Value::String(v)) if v == JSONRPC_VERSION => {}
        Some(_) => {
            return Err(ParseError::invalid_envelope(
                line,
                id,
                "unsupported jsonrpc version",
            ));
        }
    }

    if let Some(method) = object.remove("method") {
        let Value::String(method) = method else {
            return Err(ParseError::invalid_envelope(line, id, "method must be a string"));
        };
        let params = object.remove("params");
        return Ok(match (raw_id, id) {
            (None, _) => Envelope::Notification(Notification { method, params }),
            (Some(_), Some(id)) => Envelope::Request(Request { id, method, params }),
            (Some(_), None) => {
                return Err(ParseError::invalid_envelope(line, None, "request id is null"));
            }
        });
    }

    if raw_id.is_none() {
        return Err(ParseError::invalid_envelope(
            line,
            None,
            "neither method nor id present",
        ));
    }

    decode_response(line, id, object)
}

fn decode_response(
    line: &str,
    id: Option<RequestId>,
    mut object: Map<String, Value>,
) -> Result<Envelope, ParseError> {
    let outcome = match (object.remove("result"), object.remove("error")) {
        (Some(result), None) => Ok(result),
        (None, Some(error)) => match serde_json::from_value::<ErrorObject>(error) {
            Ok(error) => Err(error),
            Err(e) => {
                return Err(ParseError::invalid_envelope(
                    line,
                    id,
                    format!("malformed error object: {}", e),
                ));
            }
        },
        (Some(_), Some(_)) => {
            return Err(ParseError::invalid_envelope(
                line,
                id,
                "both result and error present",
            ));
        }
        (None, None) => {
            return Err(ParseError::invalid_envelope(
                line,
                id,
                "neither result nor error present",
            ));
        }
    };

    Ok(Envelope::Response(Response { id, outcome }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn round_trip(envelope: Envelope) -> Envelope {
        decode(&encode(&envelope).unwrap()).unwrap()
    }

    #[test]
    fn request_round_trip_preserves_fields() {
        let request = Request::new(42u64, "analyze", json!({"task": "x", "content": null}));
        assert_eq!(
            round_trip(request.clone().into()),
            Envelope::Request(request)
        );
    }

    #[test]
    fn response_round_trip_preserves_fields() {
        let ok = Response::success(RequestId::from("abc"), json!([1, 2, 3]));
        assert_eq!(round_trip(ok.clone().into()), Envelope::Response(ok));

        let err = Response::error(
            Some(RequestId::Number(9)),
            ErrorObject::new(ErrorCode::InvalidParams, "bad").with_data(json!({"field": "task"})),
        );
        assert_eq!(round_trip(err.clone().into()), Envelope::Response(err));
    }

    #[test]
    fn encode_is_single_line() {
        let line = encode(&Request::new(1u64, "analyze", json!({"text": "a\nb"})).into()).unwrap();
        assert!(!line.contains('\n'));
    }

    #[test]
    fn classify_by_keys() {
        assert!(matches!(
            decode(r#"{"jsonrpc":"2.0","id":1,"method":"invoke","params":{}}"#),
            Ok(Envelope::Request(_))
        ));
        assert!(matches!(
            decode(r#"{"jsonrpc":"2.0","method":"progress"}"#),
            Ok(Envelope::Notification(_))
        ));
        assert!(matches!(
            decode(r#"{"jsonrpc":"2.0","id":1,"result":null}"#),
            Ok(Envelope::Response(Response { outcome: Ok(Value::Null), .. }))
        ));
    }

    #[test]
    fn error_response_with_null_id() {
        let envelope =
            decode(r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#)
                .unwrap();
        match envelope {
            Envelope::Response(Response { id, outcome }) => {
                assert!(id.is_none());
                assert_eq!(outcome.unwrap_err().code, -32700);
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[test]
    fn malformed_json_is_typed() {
        let err = decode("{not json").unwrap_err();
        assert_eq!(err.line, "{not json");
        assert!(matches!(err.reason, ParseErrorReason::InvalidJson(_)));
        assert_eq!(err.to_error_object().code, ErrorCode::ParseError.code());
    }

    #[test]
    fn both_result_and_error_is_invalid_envelope() {
        let err = decode(r#"{"jsonrpc":"2.0","id":5,"result":1,"error":{"code":1,"message":"m"}}"#)
            .unwrap_err();
        assert!(matches!(err.reason, ParseErrorReason::InvalidEnvelope(_)));
        assert_eq!(err.id, Some(RequestId::Number(5)));
        assert_eq!(err.to_error_object().code, ErrorCode::InvalidRequest.code());
    }

    #[test]
    fn invalid_envelopes() {
        for line in [
            "[]",
            "42",
            r#"{"jsonrpc":"2.0"}"#,
            r#"{"jsonrpc":"2.0","id":1}"#,
            r#"{"jsonrpc":"2.0","id":{},"method":"x"}"#,
            r#"{"jsonrpc":"2.0","id":1,"method":7}"#,
            r#"{"jsonrpc":"1.0","id":1,"method":"x"}"#,
            r#"{"jsonrpc":"2.0","id":1,"error":"boom"}"#,
        ] {
            let err = decode(line).unwrap_err();
            assert!(
                matches!(err.reason, ParseErrorReason::InvalidEnvelope(_)),
                "line {line} gave {err:?}"
            );
        }
    }
}
