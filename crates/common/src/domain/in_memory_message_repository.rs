use crate::domain::message::{Message, MessageRepository};
use crate::domain::result::{DomainError, DomainResult};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// In-memory message store
///
/// Writers are serialized by the lock, so concurrent saves of the same identity
/// resolve to exactly one stored record.
#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<HashMap<Uuid, Message>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.messages.read().await.contains_key(&id)
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn save(&self, message: &Message) -> DomainResult<()> {
        let mut messages = self.messages.write().await;

        match messages.get(&message.id) {
            Some(existing) if existing.has_same_content(message) => {
                debug!(message_id = %message.id, "message already stored, skipping save");
                Ok(())
            }
            Some(_) => Err(DomainError::MessageConflict(message.id.to_string())),
            None => {
                messages.insert(message.id, message.clone());
                Ok(())
            }
        }
    }

    async fn load(&self, id: Uuid) -> DomainResult<Message> {
        self.messages
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::MessageNotFound(id.to_string()))
    }

    async fn update(&self, message: &Message) -> DomainResult<()> {
        let mut messages = self.messages.write().await;

        let stored = messages
            .get_mut(&message.id)
            .ok_or_else(|| DomainError::MessageNotFound(message.id.to_string()))?;

        if !stored.status.can_transition_to(message.status) {
            return Err(DomainError::InvalidStatusTransition {
                message_id: message.id.to_string(),
                from: stored.status,
                to: message.status,
            });
        }

        stored.status = message.status;
        stored.updated_at = message.updated_at;
        stored.send_duration = message.send_duration;
        stored.last_attempted_at = message.last_attempted_at;
        stored.sent_at = message.sent_at;
        stored.received_at = message.received_at;
        Ok(())
    }
}
