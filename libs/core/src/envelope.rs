use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::correlation::CorrelationId;

/// Request sent to the remote executor
///
/// Built immediately before send and dropped afterwards; nothing about
/// the call is retained except the correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub correlation_id: CorrelationId,
    pub operation: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
    pub issued_at: DateTime<Utc>,
}

impl RequestEnvelope {
    pub fn new(operation: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            operation: operation.into(),
            payload,
            issued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// Reply written by the remote executor for exactly one request
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub correlation_id: String,
    pub status: Status,
    pub result: Option<Value>,
    pub error_detail: Option<String>,
}

impl ResponseEnvelope {
    pub fn ok(correlation_id: impl Into<String>, result: Value) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            status: Status::Ok,
            result: Some(result),
            error_detail: None,
        }
    }

    pub fn error(correlation_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            status: Status::Error,
            result: None,
            error_detail: Some(detail.into()),
        }
    }

    /// Reply to a specific request
    pub fn reply_ok(request: &RequestEnvelope, result: Value) -> Self {
        Self::ok(request.correlation_id.to_string(), result)
    }

    pub fn reply_error(request: &RequestEnvelope, detail: impl Into<String>) -> Self {
        Self::error(request.correlation_id.to_string(), detail)
    }
}
