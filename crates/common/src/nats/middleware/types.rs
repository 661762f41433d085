use async_nats::HeaderMap;
use bytes::Bytes;

/// Header JetStream uses to drop duplicate publishes within its dedup window
pub const NATS_MSG_ID_HEADER: &str = "Nats-Msg-Id";

/// An encoded event envelope ready to be published to NATS
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub subject: String,
    pub payload: Bytes,
    /// Trace context is injected here by the tracing layer
    pub headers: HeaderMap,
    pub event_id: String,
    pub event_type: String,
}

impl PublishRequest {
    pub fn new(
        subject: impl Into<String>,
        payload: impl Into<Bytes>,
        event_id: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        let event_id = event_id.into();
        let mut headers = HeaderMap::new();
        headers.insert(NATS_MSG_ID_HEADER, event_id.as_str());

        Self {
            subject: subject.into(),
            payload: payload.into(),
            headers,
            event_id,
            event_type: event_type.into(),
        }
    }
}

#[derive(Debug)]
pub struct PublishResponse {
    pub subject: String,
    pub event_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_carries_dedup_header() {
        let request = PublishRequest::new(
            "message_events.message.api.sent",
            b"{}".to_vec(),
            "evt-123",
            "message.api.sent",
        );

        assert_eq!(
            request.headers.get(NATS_MSG_ID_HEADER).map(|v| v.as_str()),
            Some("evt-123")
        );
        assert_eq!(request.payload.len(), 2);
    }
}
