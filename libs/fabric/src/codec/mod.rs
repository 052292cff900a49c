use ibkr_relay_core::{RequestEnvelope, ResponseEnvelope};

use crate::error::DecodeError;

pub mod json;

pub use self::json::JsonCodec;

/// Codec for envelopes carried as queue message bodies
///
/// Only the envelope shape is validated; operation payloads pass through
/// untouched. The request-decoding and response-encoding halves are what
/// an executor speaking this protocol uses.
pub trait Codec: Send + Sync {
    /// Encode a request. Deterministic for a given envelope.
    fn encode_request(&self, envelope: &RequestEnvelope) -> Result<String, DecodeError>;

    fn decode_request(&self, body: &str) -> Result<RequestEnvelope, DecodeError>;

    fn encode_response(&self, envelope: &ResponseEnvelope) -> Result<String, DecodeError>;

    /// Decode a response, failing if `correlation_id` or `status` is missing
    fn decode_response(&self, body: &str) -> Result<ResponseEnvelope, DecodeError>;

    /// Decode a response whose correlation id arrived as a message attribute
    ///
    /// An id inside the body still wins. Errors always carry an id.
    fn decode_attributed_response(
        &self,
        body: &str,
        correlation_id: &str,
    ) -> Result<ResponseEnvelope, DecodeError>;
}
