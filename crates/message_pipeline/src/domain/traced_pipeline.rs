use crate::domain::{
    MessagePipeline, SendMessageInput, StoreMessageInput, UpdateMessageStatusInput,
};
use async_trait::async_trait;
use common::domain::{DomainResult, Message};
use std::time::Instant;
use tracing::{error, field, info, info_span, Instrument, Span};

/// Wraps a [`MessagePipeline`] with a span and an outcome log per operation
pub struct TracedMessagePipeline<P> {
    inner: P,
}

impl<P> TracedMessagePipeline<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}

fn record_outcome(operation: &str, result: &DomainResult<Message>, started: Instant) {
    let duration_ms = started.elapsed().as_millis() as u64;
    let span = Span::current();

    match result {
        Ok(message) => {
            span.record("message_id", field::display(message.id));
            span.record("otel.status_code", "OK");
            info!(
                operation,
                message_id = %message.id,
                status = %message.status,
                duration_ms,
                "{operation} completed in {duration_ms}ms"
            );
        }
        Err(e) => {
            span.record("otel.status_code", "ERROR");
            error!(
                operation,
                error = %e,
                retriable = e.is_retriable(),
                duration_ms,
                "{operation} failed after {duration_ms}ms: {e}"
            );
        }
    }
}

#[async_trait]
impl<P: MessagePipeline> MessagePipeline for TracedMessagePipeline<P> {
    async fn send_message(&self, input: SendMessageInput) -> DomainResult<Message> {
        let span = info_span!(
            "send_message",
            message_id = field::Empty,
            message.source = %input.source,
            otel.status_code = field::Empty,
        );

        async {
            let started = Instant::now();
            let result = self.inner.send_message(input).await;
            record_outcome("send_message", &result, started);
            result
        }
        .instrument(span)
        .await
    }

    async fn store_message(&self, input: StoreMessageInput) -> DomainResult<Message> {
        let span = info_span!(
            "store_message",
            message_id = %input.id,
            otel.status_code = field::Empty,
        );

        async {
            let started = Instant::now();
            let result = self.inner.store_message(input).await;
            record_outcome("store_message", &result, started);
            result
        }
        .instrument(span)
        .await
    }

    async fn update_message_status(
        &self,
        input: UpdateMessageStatusInput,
    ) -> DomainResult<Message> {
        let span = info_span!(
            "update_message_status",
            message_id = %input.message_id,
            message.status = %input.status,
            otel.status_code = field::Empty,
        );

        async {
            let started = Instant::now();
            let result = self.inner.update_message_status(input).await;
            record_outcome("update_message_status", &result, started);
            result
        }
        .instrument(span)
        .await
    }
}
