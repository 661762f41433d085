use anyhow::Context;
use async_trait::async_trait;
use common::domain::{DomainError, DomainResult, EventDispatcher, EventEnvelope};
use common::nats::middleware::{layered_publisher, LayeredPublisher, PublishRequest};
use common::nats::JetStreamPublisher;
use std::sync::Arc;
use tower::ServiceExt;
use tracing::instrument;

/// Publishes event envelopes to JetStream as JSON
///
/// Each envelope goes to `{base_subject}.{event type}` with the event id as the
/// JetStream dedup id. `dispatch` returns once the stream has acked the publish.
pub struct NatsEventDispatcher {
    publisher: LayeredPublisher,
    base_subject: String,
}

impl NatsEventDispatcher {
    pub fn new(
        jetstream: Arc<dyn JetStreamPublisher>,
        base_subject: impl Into<String>,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            publisher: layered_publisher(jetstream, service_name),
            base_subject: base_subject.into(),
        }
    }

    pub fn subject_for(&self, event_type: &str) -> String {
        format!("{}.{}", self.base_subject, event_type)
    }
}

#[async_trait]
impl EventDispatcher for NatsEventDispatcher {
    #[instrument(skip(self, envelope), fields(event_id = %envelope.id(), event_type = %envelope.event_type()))]
    async fn dispatch(&self, envelope: &EventEnvelope) -> DomainResult<()> {
        let payload = envelope
            .to_json_bytes()
            .context("Failed to encode event envelope")
            .map_err(DomainError::EventBusUnavailable)?;

        let request = PublishRequest::new(
            self.subject_for(envelope.event_type()),
            payload,
            envelope.id(),
            envelope.event_type(),
        );

        self.publisher
            .clone()
            .oneshot(request)
            .await
            .map_err(DomainError::EventBusUnavailable)?;

        Ok(())
    }
}
