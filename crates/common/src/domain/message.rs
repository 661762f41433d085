use crate::domain::result::{DomainError, DomainResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Direction of travel relative to the handset acting as the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Outbound from the gateway
    MobileOriginated,
    /// Inbound to the gateway
    MobileTerminated,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::MobileOriginated => "mobile-originated",
            MessageType::MobileTerminated => "mobile-terminated",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mobile-originated" => Ok(MessageType::MobileOriginated),
            "mobile-terminated" => Ok(MessageType::MobileTerminated),
            other => Err(DomainError::InvalidMessageType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageStatus {
    Pending,
    Sent,
    Failed,
    Delivered,
    Expired,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Sent => "sent",
            MessageStatus::Failed => "failed",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Expired => "expired",
        }
    }

    /// Statuses a message may move to from `self`. Transitions only go forward.
    pub fn successors(&self) -> &'static [MessageStatus] {
        match self {
            MessageStatus::Pending => &[
                MessageStatus::Sent,
                MessageStatus::Failed,
                MessageStatus::Expired,
            ],
            MessageStatus::Sent => &[MessageStatus::Delivered, MessageStatus::Expired],
            MessageStatus::Failed => &[MessageStatus::Expired],
            MessageStatus::Delivered | MessageStatus::Expired => &[],
        }
    }

    /// Statuses from which a message may move to `self`.
    pub fn predecessors(&self) -> Vec<MessageStatus> {
        ALL_STATUSES
            .iter()
            .copied()
            .filter(|status| status.can_transition_to(*self))
            .collect()
    }

    pub fn can_transition_to(&self, next: MessageStatus) -> bool {
        self.successors().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }
}

const ALL_STATUSES: [MessageStatus; 5] = [
    MessageStatus::Pending,
    MessageStatus::Sent,
    MessageStatus::Failed,
    MessageStatus::Delivered,
    MessageStatus::Expired,
];

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_STATUSES
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::InvalidMessageStatus(s.to_string()))
    }
}

/// Domain entity for an SMS message
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub from: String,
    pub to: String,
    pub content: String,
    pub message_type: MessageType,
    pub status: MessageStatus,
    pub request_received_at: DateTime<Utc>,
    pub order_timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub send_duration: Option<Duration>,
    pub last_attempted_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
}

/// Fields needed to create a new pending message
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: Uuid,
    pub from: String,
    pub to: String,
    pub content: String,
    pub message_type: MessageType,
    pub request_received_at: DateTime<Utc>,
}

impl Message {
    /// Build a pending message ordered by its request time, with no lifecycle fields set.
    pub fn pending(new: NewMessage, now: DateTime<Utc>) -> Self {
        Self {
            id: new.id,
            from: new.from,
            to: new.to,
            content: new.content,
            message_type: new.message_type,
            status: MessageStatus::Pending,
            request_received_at: new.request_received_at,
            order_timestamp: new.request_received_at,
            created_at: now,
            updated_at: now,
            send_duration: None,
            last_attempted_at: None,
            sent_at: None,
            received_at: None,
        }
    }

    /// Compares the immutable fields set at creation. Bookkeeping timestamps and
    /// lifecycle state are ignored.
    pub fn has_same_content(&self, other: &Message) -> bool {
        self.id == other.id
            && self.from == other.from
            && self.to == other.to
            && self.content == other.content
            && self.message_type == other.message_type
            && self.request_received_at == other.request_received_at
            && self.order_timestamp == other.order_timestamp
    }

    /// Move the message forward to `status`, recording the lifecycle timestamps for it.
    pub fn transition(
        &mut self,
        status: MessageStatus,
        occurred_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !self.status.can_transition_to(status) {
            return Err(DomainError::InvalidStatusTransition {
                message_id: self.id.to_string(),
                from: self.status,
                to: status,
            });
        }

        match status {
            MessageStatus::Sent => {
                self.sent_at = Some(occurred_at);
                self.last_attempted_at = Some(occurred_at);
                self.send_duration = Some(
                    (occurred_at - self.request_received_at)
                        .to_std()
                        .unwrap_or(Duration::ZERO),
                );
            }
            MessageStatus::Failed => {
                self.last_attempted_at = Some(occurred_at);
            }
            MessageStatus::Delivered => {
                self.received_at = Some(occurred_at);
            }
            MessageStatus::Pending | MessageStatus::Expired => {}
        }

        self.status = status;
        self.updated_at = now;
        Ok(())
    }
}

/// Repository trait for message storage operations
/// Infrastructure layer (in-memory, PostgreSQL) implements this trait
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Create a message record
    ///
    /// Saving an identity that already exists is a no-op when the content matches
    /// and fails with `MessageConflict` otherwise. Existing records are never overwritten.
    async fn save(&self, message: &Message) -> DomainResult<()>;

    /// Load a message by identity, `MessageNotFound` if absent
    async fn load(&self, id: Uuid) -> DomainResult<Message>;

    /// Persist the lifecycle fields of an existing message
    ///
    /// Fails with `InvalidStatusTransition` when the stored status cannot move to
    /// `message.status`, which guards against concurrent regressions.
    async fn update(&self, message: &Message) -> DomainResult<()>;
}
