use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::error::Result;

pub mod memory;
pub mod retry;
#[cfg(feature = "sqs")]
pub mod sqs;

pub use self::memory::{MemoryQueue, MemoryQueueBuilder, QueueStats};
pub use self::retry::{RetryingQueue, SendRetry};
#[cfg(feature = "sqs")]
pub use self::sqs::SqsQueue;

/// Most messages a single receive hands back
pub const MAX_RECEIVE_BATCH: usize = 10;

/// Opaque address of one message channel (a queue URL for SQS)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelAddress(String);

impl ChannelAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for ChannelAddress {
    fn from(address: String) -> Self {
        Self(address)
    }
}

/// Message about to be published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub body: String,
    pub attributes: BTreeMap<String, String>,
}

impl OutboundMessage {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Handle returned by a successful send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message_id: String,
}

/// Handle for one particular receipt of a message
///
/// Every receive mints a new receipt; only the latest one can
/// acknowledge or release the message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Receipt(String);

impl Receipt {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Message handed out by a receive, invisible to other receivers until
/// acknowledged, released, or its visibility timeout lapses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub body: String,
    pub attributes: BTreeMap<String, String>,
    pub receipt: Receipt,
}

/// Queue transport with two-phase consumption
///
/// A single handle serves any number of channels and concurrent callers.
#[async_trait::async_trait]
pub trait Queue: Send + Sync {
    /// Publish a message
    async fn send(&self, channel: &ChannelAddress, message: OutboundMessage) -> Result<Delivery>;

    /// Fetch up to [`MAX_RECEIVE_BATCH`] visible messages, waiting at most
    /// `max_wait` for the first one. Batch order carries no meaning.
    async fn receive(
        &self,
        channel: &ChannelAddress,
        max_wait: Duration,
    ) -> Result<Vec<ReceivedMessage>>;

    /// Remove a received message. Unknown or stale receipts are a no-op.
    async fn acknowledge(&self, channel: &ChannelAddress, receipt: &Receipt) -> Result<()>;

    /// Make a received message visible to other receivers immediately
    async fn release(&self, channel: &ChannelAddress, receipt: &Receipt) -> Result<()>;
}
