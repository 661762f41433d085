use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use super::types::{PublishRequest, PublishResponse};
use tower::{Layer, Service};
use tracing::{error, info, Instrument, Span};

/// Tower layer that logs each event publish with its outcome and latency
#[derive(Clone, Default)]
pub struct EventPublishLoggingLayer;

impl EventPublishLoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for EventPublishLoggingLayer {
    type Service = EventPublishLoggingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        EventPublishLoggingService { inner: service }
    }
}

#[derive(Clone)]
pub struct EventPublishLoggingService<S> {
    inner: S,
}

impl<S> Service<PublishRequest> for EventPublishLoggingService<S>
where
    S: Service<PublishRequest, Response = PublishResponse> + Clone + Send + 'static,
    S::Error: std::fmt::Display + Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: PublishRequest) -> Self::Future {
        let subject = req.subject.clone();
        let event_id = req.event_id.clone();
        let event_type = req.event_type.clone();
        let payload_size = req.payload.len();
        let start = Instant::now();
        let mut inner = self.inner.clone();
        let span = Span::current();

        Box::pin(
            async move {
                let result = inner.call(req).await;
                let duration_ms = start.elapsed().as_millis();

                match &result {
                    Ok(_) => info!(
                        subject = %subject,
                        event_id = %event_id,
                        event_type = %event_type,
                        payload_bytes = payload_size,
                        duration_ms = %duration_ms,
                        "event [{event_id}] dispatched to {subject} in {duration_ms}ms"
                    ),
                    Err(e) => error!(
                        subject = %subject,
                        event_id = %event_id,
                        event_type = %event_type,
                        payload_bytes = payload_size,
                        duration_ms = %duration_ms,
                        error = %e,
                        "cannot dispatch event [{event_id}] to {subject} after {duration_ms}ms: {e}"
                    ),
                }

                result
            }
            .instrument(span),
        )
    }
}
