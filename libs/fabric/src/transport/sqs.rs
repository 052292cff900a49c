use std::collections::BTreeMap;
use std::time::Duration;

use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sqs::config::Credentials as SdkCredentials;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::MessageAttributeValue;
use aws_sdk_sqs::Client;
use tracing::debug;

use crate::config::RelayConfig;
use crate::error::{Result, TransportError};
use crate::transport::{
    ChannelAddress, Delivery, OutboundMessage, Queue, Receipt, ReceivedMessage, MAX_RECEIVE_BATCH,
};

/// Longest long-poll SQS accepts, in seconds
const MAX_WAIT_SECONDS: u64 = 20;

/// Amazon SQS backend
///
/// The SDK client is built once and shared by every call. Connection-level
/// retry is the SDK's standard mode, capped at the configured attempts.
#[derive(Clone)]
pub struct SqsQueue {
    client: Client,
}

impl SqsQueue {
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Build a client for the configured region and credentials, falling
    /// back to the ambient provider chain when none are configured
    pub async fn connect(config: &RelayConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .retry_config(RetryConfig::standard().with_max_attempts(config.send_retry.max_attempts));

        if let Some(credentials) = &config.credentials {
            loader = loader.credentials_provider(SdkCredentials::new(
                credentials.access_key_id.clone(),
                credentials.secret_access_key.expose_secret().clone(),
                credentials.session_token.as_ref().map(|t| t.expose_secret().clone()),
                None,
                "ibkr-relay-config",
            ));
        }

        let shared = loader.load().await;
        debug!(region = %config.region, "SQS client configured");
        Self::from_client(Client::new(&shared))
    }
}

#[async_trait::async_trait]
impl Queue for SqsQueue {
    async fn send(&self, channel: &ChannelAddress, message: OutboundMessage) -> Result<Delivery> {
        let mut request = self
            .client
            .send_message()
            .queue_url(channel.as_str())
            .message_body(message.body);

        for (key, value) in message.attributes {
            let attribute = MessageAttributeValue::builder()
                .data_type("String")
                .string_value(value)
                .build()
                .map_err(|e| TransportError::Rejected(e.to_string()))?;
            request = request.message_attributes(key, attribute);
        }

        let output = request
            .send()
            .await
            .map_err(|e| TransportError::unavailable(DisplayErrorContext(&e).to_string()))?;

        Ok(Delivery {
            message_id: output.message_id().unwrap_or_default().to_string(),
        })
    }

    async fn receive(
        &self,
        channel: &ChannelAddress,
        max_wait: Duration,
    ) -> Result<Vec<ReceivedMessage>> {
        let wait_seconds = max_wait.as_secs().min(MAX_WAIT_SECONDS) as i32;
        let output = self
            .client
            .receive_message()
            .queue_url(channel.as_str())
            .max_number_of_messages(MAX_RECEIVE_BATCH as i32)
            .wait_time_seconds(wait_seconds)
            .message_attribute_names("All")
            .send()
            .await
            .map_err(|e| TransportError::unavailable(DisplayErrorContext(&e).to_string()))?;

        let messages = output
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|message| {
                let receipt = message.receipt_handle()?.to_string();
                let attributes = message
                    .message_attributes()
                    .map(|attributes| {
                        attributes
                            .iter()
                            .filter_map(|(key, value)| {
                                Some((key.clone(), value.string_value()?.to_string()))
                            })
                            .collect::<BTreeMap<_, _>>()
                    })
                    .unwrap_or_default();
                Some(ReceivedMessage {
                    message_id: message.message_id().unwrap_or_default().to_string(),
                    body: message.body().unwrap_or_default().to_string(),
                    attributes,
                    receipt: Receipt::new(receipt),
                })
            })
            .collect();
        Ok(messages)
    }

    async fn acknowledge(&self, channel: &ChannelAddress, receipt: &Receipt) -> Result<()> {
        match self
            .client
            .delete_message()
            .queue_url(channel.as_str())
            .receipt_handle(receipt.as_str())
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|service| service.is_receipt_handle_is_invalid()) =>
            {
                debug!(channel = %channel, "Acknowledged message already gone");
                Ok(())
            }
            Err(e) => Err(TransportError::unavailable(
                DisplayErrorContext(&e).to_string(),
            )),
        }
    }

    async fn release(&self, channel: &ChannelAddress, receipt: &Receipt) -> Result<()> {
        match self
            .client
            .change_message_visibility()
            .queue_url(channel.as_str())
            .receipt_handle(receipt.as_str())
            .visibility_timeout(0)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error().is_some_and(|service| {
                    service.is_message_not_inflight() || service.is_receipt_handle_is_invalid()
                }) =>
            {
                debug!(channel = %channel, "Released message no longer in flight");
                Ok(())
            }
            Err(e) => Err(TransportError::unavailable(
                DisplayErrorContext(&e).to_string(),
            )),
        }
    }
}
