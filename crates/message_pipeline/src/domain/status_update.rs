use chrono::{DateTime, Utc};
use common::domain::{
    Clock, DomainResult, Message, MessageRepository, MessageStatus,
    EVENT_TYPE_MESSAGE_PHONE_DELIVERED, EVENT_TYPE_MESSAGE_PHONE_SENT,
    EVENT_TYPE_MESSAGE_SEND_EXPIRED, EVENT_TYPE_MESSAGE_SEND_FAILED,
};
use tracing::{debug, instrument};
use uuid::Uuid;

/// Status a lifecycle event moves a message to, if the event type is one
pub fn status_for_event_type(event_type: &str) -> Option<MessageStatus> {
    match event_type {
        EVENT_TYPE_MESSAGE_PHONE_SENT => Some(MessageStatus::Sent),
        EVENT_TYPE_MESSAGE_PHONE_DELIVERED => Some(MessageStatus::Delivered),
        EVENT_TYPE_MESSAGE_SEND_FAILED => Some(MessageStatus::Failed),
        EVENT_TYPE_MESSAGE_SEND_EXPIRED => Some(MessageStatus::Expired),
        _ => None,
    }
}

/// Load, transition and persist a message's status
#[instrument(skip(repository, clock), fields(message_id = %message_id, status = %status))]
pub async fn apply_status_update(
    repository: &dyn MessageRepository,
    clock: &dyn Clock,
    message_id: Uuid,
    status: MessageStatus,
    occurred_at: DateTime<Utc>,
) -> DomainResult<Message> {
    let mut message = repository.load(message_id).await?;
    let previous = message.status;

    message.transition(status, occurred_at, clock.now())?;
    repository.update(&message).await?;

    debug!(from = %previous, to = %status, "message status updated");
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use common::domain::{
        DomainError, FixedClock, MessageType, MockMessageRepository, NewMessage,
    };

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, secs).unwrap()
    }

    fn pending(id: Uuid) -> Message {
        Message::pending(
            NewMessage {
                id,
                from: "+15550001".to_string(),
                to: "+15550002".to_string(),
                content: "hello".to_string(),
                message_type: MessageType::MobileOriginated,
                request_received_at: at(0),
            },
            at(0),
        )
    }

    #[test]
    fn test_status_for_event_type() {
        assert_eq!(
            status_for_event_type("message.phone.sent"),
            Some(MessageStatus::Sent)
        );
        assert_eq!(
            status_for_event_type("message.phone.delivered"),
            Some(MessageStatus::Delivered)
        );
        assert_eq!(
            status_for_event_type("message.send.failed"),
            Some(MessageStatus::Failed)
        );
        assert_eq!(
            status_for_event_type("message.send.expired"),
            Some(MessageStatus::Expired)
        );
        assert_eq!(status_for_event_type("message.api.sent"), None);
    }

    #[tokio::test]
    async fn test_apply_status_update_persists_transition() {
        let id = Uuid::from_u128(1);
        let mut repository = MockMessageRepository::new();
        repository
            .expect_load()
            .times(1)
            .returning(move |_| Ok(pending(id)));
        repository
            .expect_update()
            .withf(|message: &Message| {
                message.status == MessageStatus::Failed
                    && message.last_attempted_at == Some(at(3))
                    && message.updated_at == at(9)
            })
            .times(1)
            .returning(|_| Ok(()));

        let message = apply_status_update(
            &repository,
            &FixedClock(at(9)),
            id,
            MessageStatus::Failed,
            at(3),
        )
        .await
        .unwrap();

        assert_eq!(message.status, MessageStatus::Failed);
    }

    #[tokio::test]
    async fn test_apply_status_update_rejects_regression_without_writing() {
        let id = Uuid::from_u128(2);
        let mut repository = MockMessageRepository::new();
        repository.expect_load().returning(move |_| {
            let mut message = pending(id);
            message.status = MessageStatus::Delivered;
            Ok(message)
        });
        repository.expect_update().times(0);

        let result = apply_status_update(
            &repository,
            &FixedClock(at(9)),
            id,
            MessageStatus::Sent,
            at(3),
        )
        .await;

        assert!(matches!(
            result,
            Err(DomainError::InvalidStatusTransition {
                from: MessageStatus::Delivered,
                to: MessageStatus::Sent,
                ..
            })
        ));
    }
}
