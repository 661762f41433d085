use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::types::{PublishRequest, PublishResponse};
use crate::nats::trace_context::inject_trace_context;
use tower::{Layer, Service};
use tracing::{field, info_span, Instrument, Span};

/// Tower layer that opens a producer span per event publish and propagates it in headers
#[derive(Clone, Debug, Default)]
pub struct EventPublishTracingLayer {
    service_name: String,
}

impl EventPublishTracingLayer {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }
}

impl<S> Layer<S> for EventPublishTracingLayer {
    type Service = EventPublishTracingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        EventPublishTracingService {
            inner: service,
            service_name: self.service_name.clone(),
        }
    }
}

#[derive(Clone)]
pub struct EventPublishTracingService<S> {
    inner: S,
    service_name: String,
}

impl<S> Service<PublishRequest> for EventPublishTracingService<S>
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

    fn call(&mut self, mut req: PublishRequest) -> Self::Future {
        let span = info_span!(
            target: "nats",
            "event_publish",
            otel.name = %format!("{} publish", req.event_type),
            otel.kind = "producer",
            messaging.system = "nats",
            messaging.operation = "publish",
            messaging.destination.name = %req.subject,
            messaging.message.id = %req.event_id,
            messaging.message.body.size = req.payload.len(),
            service.name = %self.service_name,
            otel.status_code = field::Empty,
        );

        // Inject inside the producer span so consumers link to it
        span.in_scope(|| inject_trace_context(&mut req.headers));

        let mut inner = self.inner.clone();

        Box::pin(
            async move {
                let result = inner.call(req).await;

                match &result {
                    Ok(_) => {
                        Span::current().record("otel.status_code", "OK");
                    }
                    Err(e) => {
                        Span::current().record("otel.status_code", "ERROR");
                        tracing::error!(error = %e, "event publish failed");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
