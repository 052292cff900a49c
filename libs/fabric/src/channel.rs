use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::transport::{ChannelAddress, Delivery, OutboundMessage, Queue, ReceivedMessage};

/// One direction of traffic: a shared queue handle bound to an address
#[derive(Clone)]
pub struct Channel {
    queue: Arc<dyn Queue>,
    address: ChannelAddress,
}

impl Channel {
    pub fn new(queue: Arc<dyn Queue>, address: ChannelAddress) -> Self {
        Self { queue, address }
    }

    pub fn address(&self) -> &ChannelAddress {
        &self.address
    }

    pub async fn send(&self, message: OutboundMessage) -> Result<Delivery> {
        self.queue.send(&self.address, message).await
    }

    pub async fn receive(&self, max_wait: Duration) -> Result<Vec<ReceivedMessage>> {
        self.queue.receive(&self.address, max_wait).await
    }

    pub async fn acknowledge(&self, message: &ReceivedMessage) -> Result<()> {
        self.queue.acknowledge(&self.address, &message.receipt).await
    }

    pub async fn release(&self, message: &ReceivedMessage) -> Result<()> {
        self.queue.release(&self.address, &message.receipt).await
    }
}
