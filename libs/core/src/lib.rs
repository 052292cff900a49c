//! IBKR Relay Core - Envelope types and call error taxonomy
//!
//! Shared vocabulary between the queue fabric and the operation catalog:
//! the request and response envelopes exchanged with the remote
//! trading-terminal executor, the correlation id that joins them, and the
//! fixed set of ways a call can fail.

pub mod correlation;
pub mod envelope;
pub mod error;

pub use correlation::CorrelationId;
pub use envelope::{RequestEnvelope, ResponseEnvelope, Status};
pub use error::{CallError, CallResult, ErrorKind};
