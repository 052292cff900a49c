use std::time::Duration;

use tracing::warn;

use crate::error::Result;
use crate::transport::{ChannelAddress, Delivery, OutboundMessage, Queue, Receipt, ReceivedMessage};

/// Connection-level retry applied to sends
///
/// Only transient failures are retried. This budget belongs to the
/// transport; callers above it never retry a send themselves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SendRetry {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl SendRetry {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn none() -> Self {
        Self::new(1)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for SendRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

/// Queue decorator adding bounded send retry
///
/// For backends that do not retry on their own. `SqsQueue` already gets
/// this budget from the SDK retry mode and should not be wrapped.
pub struct RetryingQueue<Q> {
    inner: Q,
    retry: SendRetry,
}

impl<Q: Queue> RetryingQueue<Q> {
    pub fn new(inner: Q, retry: SendRetry) -> Self {
        Self { inner, retry }
    }

    pub fn inner(&self) -> &Q {
        &self.inner
    }
}

#[async_trait::async_trait]
impl<Q: Queue> Queue for RetryingQueue<Q> {
    async fn send(&self, channel: &ChannelAddress, message: OutboundMessage) -> Result<Delivery> {
        let mut attempt = 1;
        loop {
            match self.inner.send(channel, message.clone()).await {
                Ok(delivery) => return Ok(delivery),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        channel = %channel,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Send failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn receive(
        &self,
        channel: &ChannelAddress,
        max_wait: Duration,
    ) -> Result<Vec<ReceivedMessage>> {
        self.inner.receive(channel, max_wait).await
    }

    async fn acknowledge(&self, channel: &ChannelAddress, receipt: &Receipt) -> Result<()> {
        self.inner.acknowledge(channel, receipt).await
    }

    async fn release(&self, channel: &ChannelAddress, receipt: &Receipt) -> Result<()> {
        self.inner.release(channel, receipt).await
    }
}
