#![cfg(feature = "integration-tests")]

use chrono::{TimeZone, Utc};
use common::domain::{
    DomainError, Message, MessageRepository, MessageStatus, MessageType, NewMessage,
};
use common::postgres::{PostgresClient, PostgresMessageRepository};
use std::sync::Arc;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use uuid::Uuid;

async fn setup_test_db() -> (ContainerAsync<Postgres>, PostgresMessageRepository) {
    let postgres = Postgres::default().start().await.unwrap();
    let host = postgres.get_host().await.unwrap();
    let port = postgres.get_host_port_ipv4(5432).await.unwrap();

    let client = PostgresClient::new(&host.to_string(), port, "postgres", "postgres", "postgres", 5)
        .expect("Failed to create client");
    client.run_migrations().await.expect("Migrations failed");

    (postgres, PostgresMessageRepository::new(client))
}

fn pending_message(id: u128, content: &str) -> Message {
    // Sub-microsecond component exercises the TIMESTAMPTZ precision handling
    let received = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
        + chrono::Duration::nanoseconds(123_456_789);
    Message::pending(
        NewMessage {
            id: Uuid::from_u128(id),
            from: "+15550001".to_string(),
            to: "+15550002".to_string(),
            content: content.to_string(),
            message_type: MessageType::MobileTerminated,
            request_received_at: received,
        },
        received,
    )
}

#[tokio::test]
async fn test_save_and_load_message() {
    let (_container, repo) = setup_test_db().await;
    let message = pending_message(1, "hello");

    repo.save(&message).await.unwrap();
    let loaded = repo.load(message.id).await.unwrap();

    assert_eq!(loaded.id, message.id);
    assert_eq!(loaded.from, "+15550001");
    assert_eq!(loaded.to, "+15550002");
    assert_eq!(loaded.content, "hello");
    assert_eq!(loaded.message_type, MessageType::MobileTerminated);
    assert_eq!(loaded.status, MessageStatus::Pending);
    assert!(loaded.send_duration.is_none());
    assert!(loaded.sent_at.is_none());
}

#[tokio::test]
async fn test_load_missing_message() {
    let (_container, repo) = setup_test_db().await;

    let result = repo.load(Uuid::from_u128(404)).await;

    assert!(matches!(result, Err(DomainError::MessageNotFound(_))));
}

#[tokio::test]
async fn test_resave_same_content_is_noop() {
    let (_container, repo) = setup_test_db().await;
    let message = pending_message(2, "hello");

    repo.save(&message).await.unwrap();
    repo.save(&message).await.unwrap();

    assert_eq!(repo.load(message.id).await.unwrap().content, "hello");
}

#[tokio::test]
async fn test_resave_divergent_content_conflicts() {
    let (_container, repo) = setup_test_db().await;

    repo.save(&pending_message(3, "first")).await.unwrap();
    let result = repo.save(&pending_message(3, "second")).await;

    assert!(matches!(result, Err(DomainError::MessageConflict(_))));
    assert_eq!(repo.load(Uuid::from_u128(3)).await.unwrap().content, "first");
}

#[tokio::test]
async fn test_concurrent_conflicting_saves_keep_one_record() {
    let (_container, repo) = setup_test_db().await;
    let repo = Arc::new(repo);

    let a = {
        let repo = repo.clone();
        tokio::spawn(async move { repo.save(&pending_message(4, "a")).await })
    };
    let b = {
        let repo = repo.clone();
        tokio::spawn(async move { repo.save(&pending_message(4, "b")).await })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(DomainError::MessageConflict(_))))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_update_applies_forward_transition() {
    let (_container, repo) = setup_test_db().await;
    let mut message = pending_message(5, "hello");
    repo.save(&message).await.unwrap();

    let sent_at = message.request_received_at + chrono::Duration::seconds(2);
    message
        .transition(MessageStatus::Sent, sent_at, sent_at)
        .unwrap();
    repo.update(&message).await.unwrap();

    let loaded = repo.load(message.id).await.unwrap();
    assert_eq!(loaded.status, MessageStatus::Sent);
    assert!(loaded.sent_at.is_some());
    assert_eq!(
        loaded.send_duration.map(|d| d.as_secs()),
        Some(2),
        "send duration stored in milliseconds"
    );
}

#[tokio::test]
async fn test_update_rejects_regression() {
    let (_container, repo) = setup_test_db().await;
    let mut message = pending_message(6, "hello");
    repo.save(&message).await.unwrap();

    let at = message.request_received_at;
    message.transition(MessageStatus::Expired, at, at).unwrap();
    repo.update(&message).await.unwrap();

    // A stale writer still holding the pending copy tries to mark it sent
    let mut stale = pending_message(6, "hello");
    stale.transition(MessageStatus::Sent, at, at).unwrap();
    let result = repo.update(&stale).await;

    assert!(matches!(
        result,
        Err(DomainError::InvalidStatusTransition {
            from: MessageStatus::Expired,
            to: MessageStatus::Sent,
            ..
        })
    ));
}

#[tokio::test]
async fn test_update_missing_message() {
    let (_container, repo) = setup_test_db().await;
    let mut message = pending_message(7, "hello");
    let at = message.request_received_at;
    message.transition(MessageStatus::Failed, at, at).unwrap();

    let result = repo.update(&message).await;

    assert!(matches!(result, Err(DomainError::MessageNotFound(_))));
}
