use crate::domain::{
    DomainError, DomainResult, Message, MessageRepository, MessageStatus, MessageType,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use std::time::Duration;
use tokio_postgres::Row;
use tracing::{debug, instrument};
use uuid::Uuid;

const SELECT_COLUMNS: &str = "id, from_number, to_number, content, message_type, status,
    request_received_at, order_timestamp, created_at, updated_at, send_duration_ms,
    last_attempted_at, sent_at, received_at";

/// Message row as stored in the `messages` table
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: Uuid,
    pub from_number: String,
    pub to_number: String,
    pub content: String,
    pub message_type: String,
    pub status: String,
    pub request_received_at: DateTime<Utc>,
    pub order_timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub send_duration_ms: Option<i64>,
    pub last_attempted_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
}

impl MessageRow {
    fn from_row(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            from_number: row.get("from_number"),
            to_number: row.get("to_number"),
            content: row.get("content"),
            message_type: row.get("message_type"),
            status: row.get("status"),
            request_received_at: row.get("request_received_at"),
            order_timestamp: row.get("order_timestamp"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            send_duration_ms: row.get("send_duration_ms"),
            last_attempted_at: row.get("last_attempted_at"),
            sent_at: row.get("sent_at"),
            received_at: row.get("received_at"),
        }
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = DomainError;

    fn try_from(row: MessageRow) -> DomainResult<Self> {
        Ok(Message {
            id: row.id,
            from: row.from_number,
            to: row.to_number,
            content: row.content,
            message_type: row.message_type.parse::<MessageType>()?,
            status: row.status.parse::<MessageStatus>()?,
            request_received_at: row.request_received_at,
            order_timestamp: row.order_timestamp,
            created_at: row.created_at,
            updated_at: row.updated_at,
            send_duration: row
                .send_duration_ms
                .map(|ms| Duration::from_millis(ms.max(0) as u64)),
            last_attempted_at: row.last_attempted_at,
            sent_at: row.sent_at,
            received_at: row.received_at,
        })
    }
}

/// TIMESTAMPTZ keeps microseconds, so content comparisons against a stored row
/// must use the same precision.
fn to_storage_precision(message: &Message) -> Message {
    let mut message = message.clone();
    message.request_received_at = message.request_received_at.trunc_subsecs(6);
    message.order_timestamp = message.order_timestamp.trunc_subsecs(6);
    message
}

fn send_duration_ms(message: &Message) -> Option<i64> {
    message
        .send_duration
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

/// PostgreSQL implementation of MessageRepository
#[derive(Clone)]
pub struct PostgresMessageRepository {
    client: PostgresClient,
}

impl PostgresMessageRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    async fn connection(&self, message_id: Uuid) -> DomainResult<deadpool_postgres::Client> {
        self.client
            .get_connection()
            .await
            .map_err(|e| DomainError::store_unavailable(message_id, e))
    }

    async fn fetch(
        &self,
        conn: &deadpool_postgres::Client,
        id: Uuid,
    ) -> DomainResult<Option<Message>> {
        let row = conn
            .query_opt(
                &format!("SELECT {SELECT_COLUMNS} FROM messages WHERE id = $1"),
                &[&id],
            )
            .await
            .map_err(|e| DomainError::store_unavailable(id, e))?;

        row.map(|row| Message::try_from(MessageRow::from_row(&row)))
            .transpose()
    }
}

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    #[instrument(skip(self, message), fields(message_id = %message.id))]
    async fn save(&self, message: &Message) -> DomainResult<()> {
        let conn = self.connection(message.id).await?;
        let send_duration_ms = send_duration_ms(message);

        let inserted = conn
            .execute(
                "INSERT INTO messages (id, from_number, to_number, content, message_type, status,
                     request_received_at, order_timestamp, created_at, updated_at,
                     send_duration_ms, last_attempted_at, sent_at, received_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                 ON CONFLICT (id) DO NOTHING",
                &[
                    &message.id,
                    &message.from,
                    &message.to,
                    &message.content,
                    &message.message_type.as_str(),
                    &message.status.as_str(),
                    &message.request_received_at,
                    &message.order_timestamp,
                    &message.created_at,
                    &message.updated_at,
                    &send_duration_ms,
                    &message.last_attempted_at,
                    &message.sent_at,
                    &message.received_at,
                ],
            )
            .await
            .map_err(|e| DomainError::store_unavailable(message.id, e))?;

        if inserted == 1 {
            debug!(message_id = %message.id, "message inserted");
            return Ok(());
        }

        // Lost the race or a redelivery: the stored record decides
        match self.fetch(&conn, message.id).await? {
            Some(existing) if existing.has_same_content(&to_storage_precision(message)) => {
                debug!(message_id = %message.id, "message already stored, skipping save");
                Ok(())
            }
            _ => Err(DomainError::MessageConflict(message.id.to_string())),
        }
    }

    #[instrument(skip(self), fields(message_id = %id))]
    async fn load(&self, id: Uuid) -> DomainResult<Message> {
        let conn = self.connection(id).await?;

        self.fetch(&conn, id)
            .await?
            .ok_or_else(|| DomainError::MessageNotFound(id.to_string()))
    }

    #[instrument(skip(self, message), fields(message_id = %message.id, status = %message.status))]
    async fn update(&self, message: &Message) -> DomainResult<()> {
        let conn = self.connection(message.id).await?;
        let send_duration_ms = send_duration_ms(message);
        let predecessors: Vec<&str> = message
            .status
            .predecessors()
            .iter()
            .map(|s| s.as_str())
            .collect();

        let updated = conn
            .execute(
                "UPDATE messages
                 SET status = $2, updated_at = $3, send_duration_ms = $4,
                     last_attempted_at = $5, sent_at = $6, received_at = $7
                 WHERE id = $1 AND status = ANY($8)",
                &[
                    &message.id,
                    &message.status.as_str(),
                    &message.updated_at,
                    &send_duration_ms,
                    &message.last_attempted_at,
                    &message.sent_at,
                    &message.received_at,
                    &predecessors,
                ],
            )
            .await
            .map_err(|e| DomainError::store_unavailable(message.id, e))?;

        if updated == 1 {
            debug!(message_id = %message.id, status = %message.status, "message updated");
            return Ok(());
        }

        // Either missing or the stored status is not a predecessor
        match self.fetch(&conn, message.id).await? {
            None => Err(DomainError::MessageNotFound(message.id.to_string())),
            Some(stored) => Err(DomainError::InvalidStatusTransition {
                message_id: message.id.to_string(),
                from: stored.status,
                to: message.status,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row() -> MessageRow {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        MessageRow {
            id: Uuid::from_u128(7),
            from_number: "+15550001".to_string(),
            to_number: "+15550002".to_string(),
            content: "hello".to_string(),
            message_type: "mobile-terminated".to_string(),
            status: "sent".to_string(),
            request_received_at: at,
            order_timestamp: at,
            created_at: at,
            updated_at: at,
            send_duration_ms: Some(1500),
            last_attempted_at: Some(at),
            sent_at: Some(at),
            received_at: None,
        }
    }

    #[test]
    fn test_row_converts_to_message() {
        let message = Message::try_from(row()).unwrap();

        assert_eq!(message.id, Uuid::from_u128(7));
        assert_eq!(message.message_type, MessageType::MobileTerminated);
        assert_eq!(message.status, MessageStatus::Sent);
        assert_eq!(message.send_duration, Some(Duration::from_millis(1500)));
        assert!(message.received_at.is_none());
    }

    #[test]
    fn test_row_with_unknown_status_is_rejected() {
        let mut row = row();
        row.status = "queued".to_string();

        let result = Message::try_from(row);

        assert!(matches!(result, Err(DomainError::InvalidMessageStatus(s)) if s == "queued"));
    }

    #[test]
    fn test_storage_precision_truncates_to_micros() {
        let mut message = Message::try_from(row()).unwrap();
        let precise = Utc
            .with_ymd_and_hms(2025, 3, 1, 12, 0, 0)
            .unwrap()
            .checked_add_signed(chrono::Duration::nanoseconds(1_234_567))
            .unwrap();
        message.request_received_at = precise;
        message.order_timestamp = precise;

        let stored = to_storage_precision(&message);

        assert_eq!(stored.request_received_at.timestamp_subsec_nanos(), 1_234_000);
        assert!(!stored.has_same_content(&message));
        assert!(stored.has_same_content(&to_storage_precision(&stored)));
    }
}
