//! NATS messaging connector.
//!
//! Message triggers pull from a durable JetStream consumer so messages
//! survive engine restarts and are redelivered when a run fails. Publishing
//! for send-message actions goes over plain subjects.

use std::time::Duration;

use async_nats::jetstream::{self, consumer::pull::Config as ConsumerConfig};
use famulus_core::connector::NatsConnectorParams;
use futures::StreamExt;
use serde_json::Value;

use crate::error::ConnectorError;

/// Shared NATS handle. The client multiplexes one connection and is safe
/// for concurrent use.
pub struct NatsConnector {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsConnector {
    pub async fn connect(params: &NatsConnectorParams) -> Result<Self, ConnectorError> {
        let client = async_nats::connect(&params.url)
            .await
            .map_err(|e| ConnectorError::Messaging(format!("connect failed: {e}")))?;
        let jetstream = jetstream::new(client.clone());
        Ok(Self { client, jetstream })
    }

    /// Round-trip to the server.
    pub async fn test(&self) -> Result<(), ConnectorError> {
        self.client
            .flush()
            .await
            .map_err(|e| ConnectorError::Messaging(format!("flush failed: {e}")))
    }

    pub async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), ConnectorError> {
        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| ConnectorError::Messaging(format!("publish failed: {e}")))?;
        self.client
            .flush()
            .await
            .map_err(|e| ConnectorError::Messaging(format!("flush failed: {e}")))
    }

    /// Open a durable pull source for a trigger subscription. The stream
    /// covering the source subject is created when missing; the consumer
    /// name keys redelivery state, so each job uses its own.
    pub async fn subscribe(
        &self,
        source: &str,
        consumer_name: &str,
    ) -> Result<MessageSource, ConnectorError> {
        let stream_name = stream_name(source);
        let stream = match self.jetstream.get_stream(&stream_name).await {
            Ok(stream) => {
                tracing::debug!(stream = %stream_name, "using existing stream");
                stream
            }
            Err(_) => {
                let config = jetstream::stream::Config {
                    name: stream_name.clone(),
                    subjects: vec![source.to_string()],
                    ..Default::default()
                };
                let stream = self
                    .jetstream
                    .create_stream(config)
                    .await
                    .map_err(|e| {
                        ConnectorError::Messaging(format!("create stream failed: {e}"))
                    })?;
                tracing::info!(stream = %stream_name, source = %source, "created stream");
                stream
            }
        };

        let consumer_config = ConsumerConfig {
            durable_name: Some(consumer_name.to_string()),
            filter_subject: source.to_string(),
            ..Default::default()
        };
        let consumer = match stream.get_consumer(consumer_name).await {
            Ok(consumer) => consumer,
            Err(_) => {
                let consumer = stream
                    .create_consumer(consumer_config)
                    .await
                    .map_err(|e| {
                        ConnectorError::Messaging(format!("create consumer failed: {e}"))
                    })?;
                tracing::info!(consumer = %consumer_name, "created consumer");
                consumer
            }
        };

        Ok(MessageSource { consumer })
    }
}

/// Pull handle of one trigger subscription.
pub struct MessageSource {
    consumer: jetstream::consumer::Consumer<ConsumerConfig>,
}

impl MessageSource {
    /// Fetch up to `max` available messages, waiting at most `wait` for the
    /// first one.
    pub async fn fetch(
        &self,
        max: usize,
        wait: Duration,
    ) -> Result<Vec<InboundMessage>, ConnectorError> {
        let mut batch = self
            .consumer
            .fetch()
            .max_messages(max)
            .expires(wait)
            .messages()
            .await
            .map_err(|e| ConnectorError::Messaging(format!("fetch failed: {e}")))?;

        let mut messages = Vec::new();
        while let Some(message) = batch.next().await {
            let message =
                message.map_err(|e| ConnectorError::Messaging(format!("receive failed: {e}")))?;
            let payload = serde_json::from_slice(&message.payload).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&message.payload).to_string())
            });
            messages.push(InboundMessage { payload, message });
        }
        Ok(messages)
    }
}

/// One consumed message awaiting acknowledgement.
pub struct InboundMessage {
    pub payload: Value,
    message: jetstream::Message,
}

impl InboundMessage {
    /// Acknowledge successful processing.
    pub async fn ack(&self) -> Result<(), ConnectorError> {
        self.message
            .ack()
            .await
            .map_err(|e| ConnectorError::Messaging(format!("ack failed: {e}")))
    }

    /// Negatively acknowledge; the message will be redelivered.
    pub async fn nack(&self) -> Result<(), ConnectorError> {
        self.message
            .ack_with(jetstream::AckKind::Nak(None))
            .await
            .map_err(|e| ConnectorError::Messaging(format!("nack failed: {e}")))
    }
}

/// JetStream stream names must not contain subject separators or wildcards.
fn stream_name(source: &str) -> String {
    let sanitized: String = source
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    format!("famulus-{sanitized}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_name_sanitizes_subjects() {
        assert_eq!(stream_name("orders.inbound"), "famulus-orders-inbound");
        assert_eq!(stream_name("orders.>"), "famulus-orders--");
        assert_eq!(stream_name("plain_subject"), "famulus-plain_subject");
    }
}
