use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{Result, TransportError};
use crate::transport::{
    ChannelAddress, Delivery, OutboundMessage, Queue, Receipt, ReceivedMessage, MAX_RECEIVE_BATCH,
};

const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_MESSAGE_SIZE: usize = 256 * 1024;

/// Counters of queue traffic, across all channels
#[derive(Debug, Default)]
pub struct QueueStats {
    sent: AtomicU64,
    received: AtomicU64,
    acknowledged: AtomicU64,
    released: AtomicU64,
}

impl QueueStats {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Messages handed out by receives, redeliveries included
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Messages actually removed by an acknowledge
    pub fn acknowledged(&self) -> u64 {
        self.acknowledged.load(Ordering::Relaxed)
    }

    /// Messages actually made visible again by a release
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }
}

struct StoredMessage {
    id: u64,
    body: String,
    attributes: BTreeMap<String, String>,
    enqueued_at: Instant,
    invisible_until: Option<Instant>,
    receipt: Option<String>,
    receive_count: u32,
}

impl StoredMessage {
    fn is_visible(&self, now: Instant) -> bool {
        self.invisible_until.map_or(true, |until| until <= now)
    }
}

/// In-process queue with SQS-style visibility semantics
///
/// Channels are created on first use. A received message stays invisible
/// for the visibility timeout unless it is acknowledged or released.
pub struct MemoryQueue {
    channels: Mutex<HashMap<ChannelAddress, Vec<StoredMessage>>>,
    arrivals: Notify,
    next_id: AtomicU64,
    visibility_timeout: Duration,
    retention: Option<Duration>,
    max_message_size: usize,
    stats: QueueStats,
}

impl MemoryQueue {
    /// Queue with a 30 second visibility timeout and unlimited retention
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> MemoryQueueBuilder {
        MemoryQueueBuilder::new()
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    /// Messages held by a channel, visible or in flight
    pub fn depth(&self, channel: &ChannelAddress) -> usize {
        let mut channels = self.channels.lock();
        match channels.get_mut(channel) {
            Some(messages) => {
                self.purge_expired(messages, Instant::now());
                messages.len()
            }
            None => 0,
        }
    }

    /// Messages of a channel currently handed out and not yet settled
    pub fn in_flight(&self, channel: &ChannelAddress) -> usize {
        let now = Instant::now();
        self.channels
            .lock()
            .get(channel)
            .map_or(0, |messages| {
                messages.iter().filter(|m| !m.is_visible(now)).count()
            })
    }

    fn purge_expired(&self, messages: &mut Vec<StoredMessage>, now: Instant) {
        if let Some(retention) = self.retention {
            messages.retain(|m| now.duration_since(m.enqueued_at) < retention);
        }
    }

    /// Claim visible messages and report when the next in-flight one
    /// becomes visible again
    fn take_visible(&self, channel: &ChannelAddress) -> (Vec<ReceivedMessage>, Option<Instant>) {
        let now = Instant::now();
        let mut channels = self.channels.lock();
        let Some(messages) = channels.get_mut(channel) else {
            return (Vec::new(), None);
        };
        self.purge_expired(messages, now);

        let mut batch = Vec::new();
        for message in messages.iter_mut() {
            if batch.len() == MAX_RECEIVE_BATCH {
                break;
            }
            if !message.is_visible(now) {
                continue;
            }
            message.receive_count += 1;
            let handle = format!("{}:{}", message.id, message.receive_count);
            message.receipt = Some(handle.clone());
            message.invisible_until = Some(now + self.visibility_timeout);
            batch.push(ReceivedMessage {
                message_id: message.id.to_string(),
                body: message.body.clone(),
                attributes: message.attributes.clone(),
                receipt: Receipt::new(handle),
            });
        }

        let next_visible = messages
            .iter()
            .filter_map(|m| m.invisible_until)
            .filter(|until| *until > now)
            .min();
        (batch, next_visible)
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Queue for MemoryQueue {
    async fn send(&self, channel: &ChannelAddress, message: OutboundMessage) -> Result<Delivery> {
        if message.body.len() > self.max_message_size {
            return Err(TransportError::Rejected(format!(
                "Message too large: {} bytes",
                message.body.len()
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.channels
            .lock()
            .entry(channel.clone())
            .or_default()
            .push(StoredMessage {
                id,
                body: message.body,
                attributes: message.attributes,
                enqueued_at: Instant::now(),
                invisible_until: None,
                receipt: None,
                receive_count: 0,
            });
        self.stats.sent.fetch_add(1, Ordering::Relaxed);
        self.arrivals.notify_waiters();

        Ok(Delivery {
            message_id: id.to_string(),
        })
    }

    async fn receive(
        &self,
        channel: &ChannelAddress,
        max_wait: Duration,
    ) -> Result<Vec<ReceivedMessage>> {
        let deadline = Instant::now() + max_wait;
        loop {
            // Register interest before looking so a concurrent send is not missed
            let arrival = self.arrivals.notified();
            tokio::pin!(arrival);
            arrival.as_mut().enable();

            let (batch, next_visible) = self.take_visible(channel);
            if !batch.is_empty() {
                self.stats
                    .received
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                return Ok(batch);
            }
            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }

            let wake_at = next_visible.map_or(deadline, |at| at.min(deadline));
            let _ = tokio::time::timeout_at(wake_at, arrival).await;
        }
    }

    async fn acknowledge(&self, channel: &ChannelAddress, receipt: &Receipt) -> Result<()> {
        let mut channels = self.channels.lock();
        if let Some(messages) = channels.get_mut(channel) {
            let before = messages.len();
            messages.retain(|m| m.receipt.as_deref() != Some(receipt.as_str()));
            if messages.len() < before {
                self.stats.acknowledged.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    async fn release(&self, channel: &ChannelAddress, receipt: &Receipt) -> Result<()> {
        let now = Instant::now();
        let released = {
            let mut channels = self.channels.lock();
            channels
                .get_mut(channel)
                .and_then(|messages| {
                    messages
                        .iter_mut()
                        .find(|m| m.receipt.as_deref() == Some(receipt.as_str()))
                })
                .filter(|message| !message.is_visible(now))
                .map(|message| {
                    message.invisible_until = None;
                    message.receipt = None;
                })
                .is_some()
        };

        if released {
            self.stats.released.fetch_add(1, Ordering::Relaxed);
            self.arrivals.notify_waiters();
        }
        Ok(())
    }
}

/// Builder for configuring an in-process queue
#[derive(Default)]
pub struct MemoryQueueBuilder {
    visibility_timeout: Option<Duration>,
    retention: Option<Duration>,
    max_message_size: Option<usize>,
}

impl MemoryQueueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long a received message stays hidden from other receivers
    pub fn visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = Some(timeout);
        self
    }

    /// Purge messages older than this, settled or not
    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    pub fn max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = Some(bytes);
        self
    }

    pub fn build(self) -> MemoryQueue {
        MemoryQueue {
            channels: Mutex::new(HashMap::new()),
            arrivals: Notify::new(),
            next_id: AtomicU64::new(1),
            visibility_timeout: self.visibility_timeout.unwrap_or(DEFAULT_VISIBILITY_TIMEOUT),
            retention: self.retention,
            max_message_size: self.max_message_size.unwrap_or(DEFAULT_MAX_MESSAGE_SIZE),
            stats: QueueStats::default(),
        }
    }
}
