use crate::domain::MessageStatus;
use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("cannot encode payload for message {message_id}: {reason}")]
    SerializationFailure { message_id: String, reason: String },

    #[error("cannot dispatch event {event_type} with id {event_id} for message {message_id}: {source}")]
    PublishFailure {
        message_id: String,
        event_id: String,
        event_type: String,
        #[source]
        source: Box<DomainError>,
    },

    #[error("Event bus unavailable: {0}")]
    EventBusUnavailable(#[source] anyhow::Error),

    #[error("Message store unavailable for message {message_id}: {source}")]
    StoreUnavailable {
        message_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Message already exists with different content: {0}")]
    MessageConflict(String),

    #[error("Message {0} was not readable before the read-back deadline")]
    ReadBackTimeout(String),

    #[error("Request for message {0} exceeded its deadline")]
    RequestTimeout(String),

    #[error("Invalid status transition for message {message_id}: {from} -> {to}")]
    InvalidStatusTransition {
        message_id: String,
        from: MessageStatus,
        to: MessageStatus,
    },

    #[error("Invalid message status: {0}")]
    InvalidMessageStatus(String),

    #[error("Invalid message type: {0}")]
    InvalidMessageType(String),
}

impl DomainError {
    /// Whether the caller may retry the same request (with the same identity).
    ///
    /// A publish failure is as retriable as its cause.
    pub fn is_retriable(&self) -> bool {
        if let DomainError::PublishFailure { source, .. } = self {
            return source.is_retriable();
        }
        matches!(
            self,
            DomainError::EventBusUnavailable(_)
                | DomainError::StoreUnavailable { .. }
                | DomainError::ReadBackTimeout(_)
                | DomainError::RequestTimeout(_)
        )
    }

    pub fn store_unavailable(message_id: impl ToString, source: impl Into<anyhow::Error>) -> Self {
        DomainError::StoreUnavailable {
            message_id: message_id.to_string(),
            source: source.into(),
        }
    }
}
