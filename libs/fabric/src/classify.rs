//! Result classification for matched responses.

use ibkr_relay_core::{CallError, CallResult, ResponseEnvelope, Status};
use serde_json::Value;

/// Turn a matched response into the caller's result
///
/// `status: error` always becomes `RemoteError` with the executor's detail
/// untouched, whatever else the envelope carries.
pub fn classify(envelope: ResponseEnvelope) -> CallResult<Value> {
    match envelope.status {
        Status::Ok => Ok(envelope.result.unwrap_or(Value::Null)),
        Status::Error => Err(CallError::RemoteError(envelope.error_detail.unwrap_or_else(
            || "Remote executor reported an error without detail".to_string(),
        ))),
    }
}
