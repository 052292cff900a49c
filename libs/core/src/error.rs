use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Every way a relayed call can fail
///
/// Catalog-level variants (`UnknownOperation`, `InvalidArguments`,
/// `UnexpectedResponseShape`) are produced locally and never touch the
/// queue. The rest describe what happened on the wire.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Invalid arguments for {operation}: {reason}")]
    InvalidArguments { operation: String, reason: String },

    #[error("Failed to dispatch {operation}: {reason}")]
    DispatchFailed { operation: String, reason: String },

    /// The remote side may still execute the request later; the outcome is unknown.
    #[error(
        "Timed out after {:.1}s waiting for {operation} response (correlation id {correlation_id})",
        elapsed.as_secs_f64()
    )]
    Timeout {
        operation: String,
        correlation_id: String,
        elapsed: Duration,
    },

    #[error("{0}")]
    RemoteError(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unexpected response shape for {operation}: {reason}")]
    UnexpectedResponseShape { operation: String, reason: String },
}

impl CallError {
    pub fn invalid_arguments(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn dispatch_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DispatchFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn unexpected_shape(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnexpectedResponseShape {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Coarse classification for callers that branch on the failure type
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownOperation(_) => ErrorKind::UnknownOperation,
            Self::InvalidArguments { .. } => ErrorKind::InvalidArguments,
            Self::DispatchFailed { .. } => ErrorKind::DispatchFailed,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::RemoteError(_) => ErrorKind::RemoteError,
            Self::MalformedMessage(_) => ErrorKind::MalformedMessage,
            Self::UnexpectedResponseShape { .. } => ErrorKind::UnexpectedResponseShape,
        }
    }

    /// True for failures raised before anything was sent
    pub fn is_local(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UnknownOperation | ErrorKind::InvalidArguments
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnknownOperation,
    InvalidArguments,
    DispatchFailed,
    Timeout,
    RemoteError,
    MalformedMessage,
    UnexpectedResponseShape,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownOperation => "unknown_operation",
            Self::InvalidArguments => "invalid_arguments",
            Self::DispatchFailed => "dispatch_failed",
            Self::Timeout => "timeout",
            Self::RemoteError => "remote_error",
            Self::MalformedMessage => "malformed_message",
            Self::UnexpectedResponseShape => "unexpected_response_shape",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type CallResult<T> = std::result::Result<T, CallError>;
