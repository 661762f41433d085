use crate::domain::apply_status_update;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::domain::{
    Clock, DomainError, DomainResult, EventDispatcher, EventEnvelope, EventEnvelopeBuilder,
    IdGenerator, Message,
    MessageApiSentPayload, MessageRepository, MessageStatus, MessageType, NewMessage,
    EVENT_TYPE_MESSAGE_API_SENT,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Input for sending a message through the bus
#[derive(Debug, Clone)]
pub struct SendMessageInput {
    pub from: String,
    pub to: String,
    pub content: String,
    pub request_received_at: DateTime<Utc>,
    /// Identifier of the publishing actor, written to the envelope `source`
    pub source: String,
}

/// Input for writing an inbound message directly to the store
#[derive(Debug, Clone)]
pub struct StoreMessageInput {
    pub id: Uuid,
    pub from: String,
    pub to: String,
    pub content: String,
    pub request_received_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpdateMessageStatusInput {
    pub message_id: Uuid,
    pub status: MessageStatus,
    pub occurred_at: DateTime<Utc>,
}

/// How long to wait for the consumer to persist a published message.
///
/// Only `MessageNotFound` is retried. A zero `timeout` performs a single read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadBackConfig {
    pub timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ReadBackConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            initial_backoff: Duration::from_millis(25),
            max_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageServiceConfig {
    pub read_back: ReadBackConfig,
    /// Upper bound on a whole pipeline operation
    pub request_timeout: Duration,
}

impl Default for MessageServiceConfig {
    fn default() -> Self {
        Self {
            read_back: ReadBackConfig::default(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Operations of the message pipeline
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessagePipeline: Send + Sync {
    /// Publish a send intent and return the record the consumer persisted for it
    async fn send_message(&self, input: SendMessageInput) -> DomainResult<Message>;

    /// Create an inbound message record without going through the bus
    async fn store_message(&self, input: StoreMessageInput) -> DomainResult<Message>;

    async fn update_message_status(&self, input: UpdateMessageStatusInput)
        -> DomainResult<Message>;
}

/// Domain service that orchestrates envelope construction, publication and read-back
///
/// Flow for `send_message`:
/// 1. Generate the message id
/// 2. Wrap the send intent in a `message.api.sent` envelope
/// 3. Dispatch the envelope on the bus
/// 4. Read the record back once the consumer has stored it
pub struct MessageService {
    repository: Arc<dyn MessageRepository>,
    dispatcher: Arc<dyn EventDispatcher>,
    clock: Arc<dyn Clock>,
    id_generator: Arc<dyn IdGenerator>,
    envelope_builder: EventEnvelopeBuilder,
    config: MessageServiceConfig,
}

impl MessageService {
    pub fn new(
        repository: Arc<dyn MessageRepository>,
        dispatcher: Arc<dyn EventDispatcher>,
        clock: Arc<dyn Clock>,
        id_generator: Arc<dyn IdGenerator>,
        config: MessageServiceConfig,
    ) -> Self {
        let envelope_builder = EventEnvelopeBuilder::new(clock.clone(), id_generator.clone());

        Self {
            repository,
            dispatcher,
            clock,
            id_generator,
            envelope_builder,
            config,
        }
    }

    async fn with_request_timeout<T>(
        &self,
        message_id: Uuid,
        operation: impl Future<Output = DomainResult<T>>,
    ) -> DomainResult<T> {
        tokio::time::timeout(self.config.request_timeout, operation)
            .await
            .map_err(|_| DomainError::RequestTimeout(message_id.to_string()))?
    }

    async fn publish_and_read_back(
        &self,
        message_id: Uuid,
        input: SendMessageInput,
    ) -> DomainResult<Message> {
        let payload = MessageApiSentPayload {
            id: message_id,
            from: input.from,
            to: input.to,
            request_received_at: input.request_received_at,
            content: input.content,
        };

        let envelope = self
            .publish(message_id, &input.source, EVENT_TYPE_MESSAGE_API_SENT, &payload)
            .await?;

        debug!(
            message_id = %message_id,
            event_id = %envelope.id(),
            "send intent dispatched, reading back"
        );

        self.read_back(message_id).await
    }

    /// Encode `payload` into an envelope and dispatch it. Nothing is dispatched when encoding fails.
    async fn publish<P: Serialize>(
        &self,
        message_id: Uuid,
        source: &str,
        event_type: &str,
        payload: &P,
    ) -> DomainResult<EventEnvelope> {
        let envelope = self
            .envelope_builder
            .build(source, event_type, payload)
            .map_err(|e| DomainError::SerializationFailure {
                message_id: message_id.to_string(),
                reason: e.to_string(),
            })?;

        self.dispatcher
            .dispatch(&envelope)
            .await
            .map_err(|e| DomainError::PublishFailure {
                message_id: message_id.to_string(),
                event_id: envelope.id().to_string(),
                event_type: envelope.event_type().to_string(),
                source: Box::new(e),
            })?;

        Ok(envelope)
    }

    /// Load `message_id`, retrying `MessageNotFound` with capped exponential backoff
    async fn read_back(&self, message_id: Uuid) -> DomainResult<Message> {
        let policy = self.config.read_back;
        if policy.timeout.is_zero() {
            return self.repository.load(message_id).await;
        }

        let deadline = Instant::now() + policy.timeout;
        let mut backoff = policy.initial_backoff;
        let mut attempt: u32 = 1;

        loop {
            match self.repository.load(message_id).await {
                Err(DomainError::MessageNotFound(_)) => {
                    if Instant::now() + backoff > deadline {
                        return Err(DomainError::ReadBackTimeout(message_id.to_string()));
                    }
                    debug!(
                        message_id = %message_id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "message not stored yet, retrying read-back"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(policy.max_backoff);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl MessagePipeline for MessageService {
    async fn send_message(&self, input: SendMessageInput) -> DomainResult<Message> {
        let message_id = self.id_generator.generate();
        self.with_request_timeout(message_id, self.publish_and_read_back(message_id, input))
            .await
    }

    async fn store_message(&self, input: StoreMessageInput) -> DomainResult<Message> {
        let message = Message::pending(
            NewMessage {
                id: input.id,
                from: input.from,
                to: input.to,
                content: input.content,
                message_type: MessageType::MobileTerminated,
                request_received_at: input.request_received_at,
            },
            self.clock.now(),
        );

        // A repeated store is a no-op save; the stored record may have moved on since
        self.with_request_timeout(message.id, async {
            self.repository.save(&message).await?;
            self.repository.load(message.id).await
        })
        .await
    }

    async fn update_message_status(
        &self,
        input: UpdateMessageStatusInput,
    ) -> DomainResult<Message> {
        self.with_request_timeout(
            input.message_id,
            apply_status_update(
                self.repository.as_ref(),
                self.clock.as_ref(),
                input.message_id,
                input.status,
                input.occurred_at,
            ),
        )
        .await
    }
}
