//! Correlated request/response over a pair of queues.
//!
//! A call publishes one request envelope and then polls the shared
//! response channel until a response carrying its correlation id shows
//! up or the deadline passes. Matching is purely by id; arrival order
//! means nothing. Responses belonging to other callers are released back
//! to the channel untouched, never acknowledged.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use ibkr_relay_core::{CallError, CallResult, CorrelationId, RequestEnvelope, ResponseEnvelope};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::channel::Channel;
use crate::classify::classify;
use crate::codec::{Codec, JsonCodec};
use crate::config::RelayConfig;
use crate::error::DecodeError;
use crate::poll::PollPolicy;
use crate::transport::{ChannelAddress, OutboundMessage, Queue, ReceivedMessage};

/// Message attribute duplicating the envelope's correlation id
pub const CORRELATION_ATTRIBUTE: &str = "CorrelationId";

/// Attribute older executors put the id in, leaving it out of the body
pub const EXECUTION_ATTRIBUTE: &str = "ExecutionId";

const DEFAULT_ABANDONED_CAPACITY: usize = 1024;

/// Timed-out ids shared by every dispatcher in the process
static PROCESS_ABANDONED: LazyLock<Arc<Mutex<Abandoned>>> =
    LazyLock::new(|| Arc::new(Mutex::new(Abandoned::new(DEFAULT_ABANDONED_CAPACITY))));

/// State of the one outstanding request of a call
struct PendingCall {
    correlation_id: CorrelationId,
    operation: String,
    started: Instant,
    deadline: Instant,
}

impl PendingCall {
    fn new(envelope: &RequestEnvelope, timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            correlation_id: envelope.correlation_id,
            operation: envelope.operation.clone(),
            started,
            deadline: started + timeout,
        }
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn timed_out(&self) -> CallError {
        CallError::Timeout {
            operation: self.operation.clone(),
            correlation_id: self.correlation_id.to_string(),
            elapsed: self.started.elapsed(),
        }
    }
}

/// Ids of calls that gave up waiting
///
/// Their responses can never be claimed, so a poller that sees one drains
/// it instead of handing it back to the channel forever. Dispatchers share
/// one set per process unless given their own.
struct Abandoned {
    order: VecDeque<CorrelationId>,
    ids: HashSet<CorrelationId>,
    capacity: usize,
}

impl Abandoned {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    fn insert(&mut self, id: CorrelationId) {
        if self.capacity == 0 || !self.ids.insert(id) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    fn contains(&self, wire_id: &str) -> bool {
        CorrelationId::parse(wire_id.trim()).is_ok_and(|id| self.ids.contains(&id))
    }
}

/// Issues correlated requests and waits for their responses
///
/// Shareable across tasks; every call owns its own pending state and no
/// locking is needed around the response channel.
pub struct Dispatcher<C = JsonCodec> {
    requests: Channel,
    responses: Channel,
    codec: C,
    poll: PollPolicy,
    abandoned: Arc<Mutex<Abandoned>>,
}

impl Dispatcher<JsonCodec> {
    pub fn new(queue: Arc<dyn Queue>, requests: ChannelAddress, responses: ChannelAddress) -> Self {
        Self::with_codec(queue, requests, responses, JsonCodec)
    }

    pub fn from_config(queue: Arc<dyn Queue>, config: &RelayConfig) -> Self {
        Self::new(
            queue,
            config.request_queue.clone(),
            config.response_queue.clone(),
        )
        .with_poll(config.poll)
    }
}

impl<C: Codec> Dispatcher<C> {
    pub fn with_codec(
        queue: Arc<dyn Queue>,
        requests: ChannelAddress,
        responses: ChannelAddress,
        codec: C,
    ) -> Self {
        Self {
            requests: Channel::new(queue.clone(), requests),
            responses: Channel::new(queue, responses),
            codec,
            poll: PollPolicy::default(),
            abandoned: Arc::clone(&PROCESS_ABANDONED),
        }
    }

    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Remember timed-out ids in a set of this dispatcher's own, instead
    /// of the one shared across the process
    pub fn with_abandoned_capacity(mut self, capacity: usize) -> Self {
        self.abandoned = Arc::new(Mutex::new(Abandoned::new(capacity)));
        self
    }

    pub fn poll_policy(&self) -> &PollPolicy {
        &self.poll
    }

    /// Send a request and return the classified result of its response
    pub async fn call(
        &self,
        operation: &str,
        payload: Map<String, Value>,
        timeout: Duration,
    ) -> CallResult<Value> {
        self.exchange(operation, payload, timeout)
            .await
            .and_then(classify)
    }

    /// Send a request and return its raw response envelope
    ///
    /// The remote side executes at least once: after a `Timeout` it may
    /// still run the request, and nothing here cancels it.
    pub async fn exchange(
        &self,
        operation: &str,
        payload: Map<String, Value>,
        timeout: Duration,
    ) -> CallResult<ResponseEnvelope> {
        let envelope = RequestEnvelope::new(operation, payload);
        let span = info_span!(
            "relay_call",
            correlation_id = %envelope.correlation_id,
            operation = operation
        );
        self.run(envelope, timeout).instrument(span).await
    }

    async fn run(&self, envelope: RequestEnvelope, timeout: Duration) -> CallResult<ResponseEnvelope> {
        let pending = PendingCall::new(&envelope, timeout);

        let body = self
            .codec
            .encode_request(&envelope)
            .map_err(|e| CallError::dispatch_failed(&pending.operation, e.reason))?;
        let message = OutboundMessage::new(body)
            .with_attribute(CORRELATION_ATTRIBUTE, pending.correlation_id.to_string());
        drop(envelope);

        match self.requests.send(message).await {
            Ok(delivery) => debug!(message_id = %delivery.message_id, "Request sent"),
            Err(e) => {
                warn!(error = %e, "Request could not be sent");
                return Err(CallError::dispatch_failed(&pending.operation, e.to_string()));
            }
        }

        let result = self.await_response(&pending).await;
        match &result {
            Ok(_) => info!(
                elapsed_ms = pending.started.elapsed().as_millis() as u64,
                "Response received"
            ),
            Err(e) => warn!(error = %e, "Call failed"),
        }
        result
    }

    async fn await_response(&self, pending: &PendingCall) -> CallResult<ResponseEnvelope> {
        let mut backoff = self.poll.backoff();

        loop {
            let remaining = pending.remaining();
            if remaining.is_zero() {
                break;
            }

            match self.responses.receive(self.poll.receive_wait.min(remaining)).await {
                Ok(messages) => {
                    if let Some(verdict) = self.sort_batch(pending, messages).await {
                        return verdict;
                    }
                }
                Err(e) => warn!(error = %e, "Receive failed, polling again"),
            }

            let remaining = pending.remaining();
            if remaining.is_zero() {
                break;
            }
            let delay = backoff.next().unwrap_or(self.poll.max_backoff);
            tokio::time::sleep(delay.min(remaining)).await;
        }

        self.abandoned.lock().insert(pending.correlation_id);
        Err(pending.timed_out())
    }

    /// Settle every message of a batch and return this call's verdict if
    /// its response was among them
    ///
    /// The whole batch is processed even after a match, so no message is
    /// left hidden from the other pollers.
    async fn sort_batch(
        &self,
        pending: &PendingCall,
        messages: Vec<ReceivedMessage>,
    ) -> Option<CallResult<ResponseEnvelope>> {
        let mut verdict = None;

        for message in messages {
            let (wire_id, decoded) = self.decode(&message);

            let Some(wire_id) = wire_id else {
                // Nobody can ever claim a message without an id
                warn!(message_id = %message.message_id, "Dropping unclaimable response");
                self.acknowledge(&message).await;
                continue;
            };

            if !pending.correlation_id.matches(&wire_id) {
                self.pass_on(&wire_id, &message).await;
                continue;
            }

            self.acknowledge(&message).await;
            if verdict.is_some() {
                debug!(message_id = %message.message_id, "Drained duplicate response");
                continue;
            }
            verdict = Some(decoded.map_err(|e| {
                warn!(error = %e, "Own response is malformed");
                CallError::MalformedMessage(e.reason)
            }));
        }

        verdict
    }

    /// Decode a response, taking its id from the message attributes when
    /// the body has none
    fn decode(
        &self,
        message: &ReceivedMessage,
    ) -> (Option<String>, Result<ResponseEnvelope, DecodeError>) {
        match self.codec.decode_response(&message.body) {
            Ok(envelope) => (Some(envelope.correlation_id.clone()), Ok(envelope)),
            Err(e) if e.correlation_id.is_some() => (e.correlation_id.clone(), Err(e)),
            Err(e) => match attribute_id(message) {
                Some(id) => {
                    let decoded = self.codec.decode_attributed_response(&message.body, &id);
                    (Some(id), decoded)
                }
                None => (None, Err(e)),
            },
        }
    }

    /// Hand another caller's response back, or drain it if its caller is gone
    async fn pass_on(&self, wire_id: &str, message: &ReceivedMessage) {
        let stale = self.abandoned.lock().contains(wire_id);
        if stale {
            info!(stale_correlation_id = wire_id, "Draining late response of timed-out call");
            self.acknowledge(message).await;
            return;
        }

        debug!(other_correlation_id = wire_id, "Releasing response of another caller");
        if let Err(e) = self.responses.release(message).await {
            warn!(
                other_correlation_id = wire_id,
                error = %e,
                "Release failed; message reappears after its visibility timeout"
            );
        }
    }

    async fn acknowledge(&self, message: &ReceivedMessage) {
        if let Err(e) = self.responses.acknowledge(message).await {
            warn!(message_id = %message.message_id, error = %e, "Acknowledge failed");
        }
    }
}

fn attribute_id(message: &ReceivedMessage) -> Option<String> {
    [CORRELATION_ATTRIBUTE, EXECUTION_ATTRIBUTE]
        .into_iter()
        .filter_map(|key| message.attributes.get(key))
        .map(|id| id.trim())
        .find(|id| !id.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abandoned_ids_are_bounded() {
        let mut abandoned = Abandoned::new(2);
        let ids: Vec<_> = (0..3).map(|_| CorrelationId::new()).collect();
        for id in &ids {
            abandoned.insert(*id);
        }
        assert!(!abandoned.contains(&ids[0].to_string()));
        assert!(abandoned.contains(&ids[1].to_string()));
        assert!(abandoned.contains(&ids[2].to_string()));
        assert!(!abandoned.contains("garbage"));
    }

    #[test]
    fn zero_capacity_remembers_nothing() {
        let mut abandoned = Abandoned::new(0);
        let id = CorrelationId::new();
        abandoned.insert(id);
        assert!(!abandoned.contains(&id.to_string()));
    }
}
