use thiserror::Error;

/// Queue-level failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The channel could not be reached (after any retry the adapter applies)
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    #[error("Transport rejected message: {0}")]
    Rejected(String),
}

impl TransportError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Envelope that could not be decoded
///
/// `correlation_id` is set when the body was readable enough to tell
/// whose message it is.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{reason}")]
pub struct DecodeError {
    pub correlation_id: Option<String>,
    pub reason: String,
}

impl DecodeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            correlation_id: None,
            reason: reason.into(),
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, TransportError>;
