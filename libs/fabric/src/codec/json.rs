use ibkr_relay_core::{RequestEnvelope, ResponseEnvelope, Status};
use serde_json::{Map, Value};

use crate::codec::Codec;
use crate::error::DecodeError;

const CORRELATION_KEYS: [&str; 2] = ["correlation_id", "execution_id"];
const DETAIL_KEYS: [&str; 3] = ["error_detail", "error", "message"];

/// JSON object envelopes
///
/// Object keys are emitted sorted, so identical envelopes always encode
/// to identical bytes. Responses also accept the field spellings of the
/// older executor (`execution_id`, `success`, `error`).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode_request(&self, envelope: &RequestEnvelope) -> Result<String, DecodeError> {
        serde_json::to_string(envelope).map_err(|e| DecodeError::new(e.to_string()))
    }

    fn decode_request(&self, body: &str) -> Result<RequestEnvelope, DecodeError> {
        serde_json::from_str(body).map_err(|e| DecodeError::new(e.to_string()))
    }

    fn encode_response(&self, envelope: &ResponseEnvelope) -> Result<String, DecodeError> {
        let mut object = Map::new();
        object.insert(
            "correlation_id".to_string(),
            Value::String(envelope.correlation_id.clone()),
        );
        let status = match envelope.status {
            Status::Ok => "ok",
            Status::Error => "error",
        };
        object.insert("status".to_string(), Value::String(status.to_string()));
        if let Some(result) = &envelope.result {
            object.insert("result".to_string(), result.clone());
        }
        if let Some(detail) = &envelope.error_detail {
            object.insert("error_detail".to_string(), Value::String(detail.clone()));
        }
        serde_json::to_string(&Value::Object(object)).map_err(|e| DecodeError::new(e.to_string()))
    }

    fn decode_response(&self, body: &str) -> Result<ResponseEnvelope, DecodeError> {
        decode_response_object(parse_object(body)?, None)
    }

    fn decode_attributed_response(
        &self,
        body: &str,
        correlation_id: &str,
    ) -> Result<ResponseEnvelope, DecodeError> {
        let object =
            parse_object(body).map_err(|e| e.with_correlation_id(correlation_id.to_string()))?;
        decode_response_object(object, Some(correlation_id))
    }
}

fn parse_object(body: &str) -> Result<Map<String, Value>, DecodeError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| DecodeError::new(format!("Body is not JSON: {e}")))?;
    match value {
        Value::Object(object) => Ok(object),
        _ => Err(DecodeError::new("Envelope is not a JSON object")),
    }
}

fn decode_response_object(
    mut object: Map<String, Value>,
    attribute_id: Option<&str>,
) -> Result<ResponseEnvelope, DecodeError> {
    let correlation_id = match (take_first(&mut object, &CORRELATION_KEYS), attribute_id) {
        (Some(Value::String(id)), _) if !id.trim().is_empty() => id,
        (Some(Value::String(_)) | None, Some(id)) => id.to_string(),
        (Some(Value::String(_)), None) => return Err(DecodeError::new("Empty correlation_id")),
        (Some(_), Some(id)) => {
            return Err(DecodeError::new("correlation_id is not a string")
                .with_correlation_id(id.to_string()))
        }
        (Some(_), None) => return Err(DecodeError::new("correlation_id is not a string")),
        (None, None) => return Err(DecodeError::new("Missing correlation_id")),
    };

    let status = match object.remove("status") {
        Some(Value::String(status)) => parse_status(&status).ok_or_else(|| {
            DecodeError::new(format!("Unknown status {status:?}"))
                .with_correlation_id(correlation_id.clone())
        })?,
        Some(_) => {
            return Err(DecodeError::new("status is not a string").with_correlation_id(correlation_id))
        }
        None => return Err(DecodeError::new("Missing status").with_correlation_id(correlation_id)),
    };

    let envelope = match status {
        Status::Ok => ResponseEnvelope {
            correlation_id,
            status,
            result: Some(object.remove("result").unwrap_or(Value::Null)),
            error_detail: None,
        },
        Status::Error => ResponseEnvelope {
            correlation_id,
            status,
            result: None,
            error_detail: Some(render_detail(take_first(&mut object, &DETAIL_KEYS))),
        },
    };
    Ok(envelope)
}

fn take_first(object: &mut Map<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter().find_map(|key| object.remove(*key))
}

fn parse_status(status: &str) -> Option<Status> {
    match status.to_ascii_lowercase().as_str() {
        "ok" | "success" => Some(Status::Ok),
        "error" | "failed" | "failure" => Some(Status::Error),
        _ => None,
    }
}

fn render_detail(detail: Option<Value>) -> String {
    match detail {
        Some(Value::String(text)) => text,
        Some(Value::Null) | None => "Remote executor reported an error without detail".to_string(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_encoding_is_deterministic() {
        let mut payload = Map::new();
        payload.insert("query".to_string(), json!("AAPL"));
        payload.insert("a".to_string(), json!(1));
        let envelope = RequestEnvelope::new("find_symbols", payload);

        let first = JsonCodec.encode_request(&envelope).unwrap();
        let second = JsonCodec.encode_request(&envelope).unwrap();
        assert_eq!(first, second);
        assert_eq!(JsonCodec.decode_request(&first).unwrap(), envelope);
    }

    #[test]
    fn decodes_ok_response() {
        let body = r#"{"correlation_id":"abc","status":"ok","result":[1,2]}"#;
        let envelope = JsonCodec.decode_response(body).unwrap();
        assert_eq!(envelope.correlation_id, "abc");
        assert_eq!(envelope.status, Status::Ok);
        assert_eq!(envelope.result, Some(json!([1, 2])));
    }

    #[test]
    fn ok_without_result_reads_as_null() {
        let envelope = JsonCodec
            .decode_response(r#"{"correlation_id":"abc","status":"ok"}"#)
            .unwrap();
        assert_eq!(envelope.result, Some(Value::Null));
    }

    #[test]
    fn accepts_older_executor_spellings() {
        let body = r#"{"execution_id":"abc","status":"success","result":{}}"#;
        let envelope = JsonCodec.decode_response(body).unwrap();
        assert_eq!(envelope.correlation_id, "abc");
        assert_eq!(envelope.status, Status::Ok);

        let body = r#"{"execution_id":"abc","status":"failed","error":"no market data"}"#;
        let envelope = JsonCodec.decode_response(body).unwrap();
        assert_eq!(envelope.status, Status::Error);
        assert_eq!(envelope.error_detail.as_deref(), Some("no market data"));
    }

    #[test]
    fn structured_error_detail_is_rendered() {
        let body = r#"{"correlation_id":"abc","status":"error","error_detail":{"code":502}}"#;
        let envelope = JsonCodec.decode_response(body).unwrap();
        assert_eq!(envelope.error_detail.as_deref(), Some(r#"{"code":502}"#));
    }

    #[test]
    fn missing_correlation_id_is_unclaimable() {
        let err = JsonCodec
            .decode_response(r#"{"status":"ok","result":1}"#)
            .unwrap_err();
        assert_eq!(err.correlation_id, None);
        assert!(err.reason.contains("correlation_id"));
    }

    #[test]
    fn missing_status_keeps_the_id() {
        let err = JsonCodec
            .decode_response(r#"{"correlation_id":"abc","result":1}"#)
            .unwrap_err();
        assert_eq!(err.correlation_id.as_deref(), Some("abc"));

        let err = JsonCodec
            .decode_response(r#"{"correlation_id":"abc","status":"maybe"}"#)
            .unwrap_err();
        assert_eq!(err.correlation_id.as_deref(), Some("abc"));
    }

    #[test]
    fn attribute_id_fills_in_for_the_body() {
        let body = r#"{"status":"success","result":{"connected":true}}"#;
        let envelope = JsonCodec.decode_attributed_response(body, "abc").unwrap();
        assert_eq!(envelope.correlation_id, "abc");
        assert_eq!(envelope.result, Some(json!({"connected": true})));

        let body = r#"{"correlation_id":"inner","status":"ok"}"#;
        let envelope = JsonCodec.decode_attributed_response(body, "outer").unwrap();
        assert_eq!(envelope.correlation_id, "inner");
    }

    #[test]
    fn attributed_failures_keep_the_id() {
        let err = JsonCodec.decode_attributed_response("not json", "abc").unwrap_err();
        assert_eq!(err.correlation_id.as_deref(), Some("abc"));

        let err = JsonCodec
            .decode_attributed_response(r#"{"metadata":{}}"#, "abc")
            .unwrap_err();
        assert_eq!(err.correlation_id.as_deref(), Some("abc"));
    }

    #[test]
    fn rejects_non_objects() {
        assert!(JsonCodec.decode_response("not json").is_err());
        assert!(JsonCodec.decode_response("[1,2,3]").is_err());
        assert!(JsonCodec.decode_response(r#"{"correlation_id":7,"status":"ok"}"#).is_err());
    }

    #[test]
    fn response_encoding_decodes_back() {
        let envelope = ResponseEnvelope::error("abc", "terminal disconnected");
        let body = JsonCodec.encode_response(&envelope).unwrap();
        assert_eq!(JsonCodec.decode_response(&body).unwrap(), envelope);
    }
}
