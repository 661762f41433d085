use crate::domain::clock::{Clock, IdGenerator};
use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub const EVENT_TYPE_MESSAGE_API_SENT: &str = "message.api.sent";
pub const EVENT_TYPE_MESSAGE_PHONE_SENT: &str = "message.phone.sent";
pub const EVENT_TYPE_MESSAGE_PHONE_DELIVERED: &str = "message.phone.delivered";
pub const EVENT_TYPE_MESSAGE_SEND_FAILED: &str = "message.send.failed";
pub const EVENT_TYPE_MESSAGE_SEND_EXPIRED: &str = "message.send.expired";

const SPEC_VERSION: &str = "1.0";
const CONTENT_TYPE_JSON: &str = "application/json";

/// Versioned, self-describing event published to the event bus
///
/// Fields are read-only; an envelope is either built by `EventEnvelopeBuilder`
/// or decoded from the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    specversion: String,
    id: String,
    source: String,
    #[serde(rename = "type")]
    event_type: String,
    time: DateTime<Utc>,
    datacontenttype: String,
    data: serde_json::Value,
}

impl EventEnvelope {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn data_content_type(&self) -> &str {
        &self.datacontenttype
    }

    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// Decode the payload into its domain type
    pub fn decode_data<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.data)
    }

    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Builds envelopes with a fresh identity and timestamp
#[derive(Clone)]
pub struct EventEnvelopeBuilder {
    clock: Arc<dyn Clock>,
    id_generator: Arc<dyn IdGenerator>,
}

impl EventEnvelopeBuilder {
    pub fn new(clock: Arc<dyn Clock>, id_generator: Arc<dyn IdGenerator>) -> Self {
        Self {
            clock,
            id_generator,
        }
    }

    pub fn build<P: Serialize>(
        &self,
        source: &str,
        event_type: &str,
        payload: &P,
    ) -> serde_json::Result<EventEnvelope> {
        let data = serde_json::to_value(payload)?;

        Ok(EventEnvelope {
            specversion: SPEC_VERSION.to_string(),
            id: self.id_generator.generate().to_string(),
            source: source.to_string(),
            event_type: event_type.to_string(),
            time: self.clock.now(),
            datacontenttype: CONTENT_TYPE_JSON.to_string(),
            data,
        })
    }
}

/// Send intent emitted by the API for a new outbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageApiSentPayload {
    pub id: Uuid,
    pub from: String,
    pub to: String,
    pub request_received_at: DateTime<Utc>,
    pub content: String,
}

/// Status change reported by the phone for an existing message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStatusPayload {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// Publishes envelopes to the event bus
///
/// Delivery to subscribers is at-least-once; implementations do not deduplicate.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    /// Returns once the bus has accepted the envelope, `EventBusUnavailable` otherwise
    async fn dispatch(&self, envelope: &EventEnvelope) -> DomainResult<()>;
}

/// Consumer of envelopes delivered by the event bus
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait EventListener: Send + Sync {
    async fn handle(&self, envelope: &EventEnvelope) -> DomainResult<()>;
}
