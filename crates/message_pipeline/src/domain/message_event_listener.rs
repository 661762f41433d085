use crate::domain::{apply_status_update, status_for_event_type};
use async_trait::async_trait;
use common::domain::{
    Clock, DomainError, DomainResult, EventEnvelope, EventListener, Message,
    MessageApiSentPayload, MessageRepository, MessageStatusPayload, MessageType, NewMessage,
    EVENT_TYPE_MESSAGE_API_SENT,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Delivery-side consumer of message events
///
/// Persists send intents as pending messages and applies lifecycle events
/// reported by the phone to the stored record.
pub struct MessageEventListener {
    repository: Arc<dyn MessageRepository>,
    clock: Arc<dyn Clock>,
}

impl MessageEventListener {
    pub fn new(repository: Arc<dyn MessageRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    async fn persist_send_intent(&self, envelope: &EventEnvelope) -> DomainResult<()> {
        let payload: MessageApiSentPayload = decode(envelope)?;

        let message = Message::pending(
            NewMessage {
                id: payload.id,
                from: payload.from,
                to: payload.to,
                content: payload.content,
                message_type: MessageType::MobileOriginated,
                request_received_at: payload.request_received_at,
            },
            self.clock.now(),
        );

        self.repository.save(&message).await?;
        info!(message_id = %message.id, event_id = %envelope.id(), "stored pending message");
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(envelope: &EventEnvelope) -> DomainResult<T> {
    envelope
        .decode_data()
        .map_err(|e| DomainError::SerializationFailure {
            message_id: envelope.id().to_string(),
            reason: e.to_string(),
        })
}

#[async_trait]
impl EventListener for MessageEventListener {
    #[instrument(skip(self, envelope), fields(event_id = %envelope.id(), event_type = %envelope.event_type()))]
    async fn handle(&self, envelope: &EventEnvelope) -> DomainResult<()> {
        if envelope.event_type() == EVENT_TYPE_MESSAGE_API_SENT {
            return self.persist_send_intent(envelope).await;
        }

        let Some(status) = status_for_event_type(envelope.event_type()) else {
            debug!("ignoring unrouted event type");
            return Ok(());
        };

        let payload: MessageStatusPayload = decode(envelope)?;
        match apply_status_update(
            self.repository.as_ref(),
            self.clock.as_ref(),
            payload.id,
            status,
            payload.timestamp,
        )
        .await
        {
            // Redelivered lifecycle event
            Err(DomainError::InvalidStatusTransition { from, to, .. }) if from == to => {
                debug!(message_id = %payload.id, status = %status, "status already applied");
                Ok(())
            }
            result => result.map(|_| ()),
        }
    }
}
