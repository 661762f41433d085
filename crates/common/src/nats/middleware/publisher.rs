use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use super::types::{PublishRequest, PublishResponse};
use super::{
    EventPublishLoggingLayer, EventPublishLoggingService, EventPublishTracingLayer,
    EventPublishTracingService,
};
use crate::nats::JetStreamPublisher;
use anyhow::Result;
use tower::{Service, ServiceBuilder};

/// Innermost service: hands the request to JetStream and waits for the ack
#[derive(Clone)]
pub struct EventPublishService {
    publisher: Arc<dyn JetStreamPublisher>,
}

impl EventPublishService {
    pub fn new(publisher: Arc<dyn JetStreamPublisher>) -> Self {
        Self { publisher }
    }
}

impl Service<PublishRequest> for EventPublishService {
    type Response = PublishResponse;
    type Error = anyhow::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: PublishRequest) -> Self::Future {
        let publisher = Arc::clone(&self.publisher);

        Box::pin(async move {
            publisher
                .publish_with_headers(req.subject.clone(), req.headers, req.payload)
                .await?;
            Ok(PublishResponse {
                subject: req.subject,
                event_id: req.event_id,
            })
        })
    }
}

/// Publish stack used for message events: tracing outermost, then logging, then JetStream
pub type LayeredPublisher =
    EventPublishTracingService<EventPublishLoggingService<EventPublishService>>;

pub fn layered_publisher(
    publisher: Arc<dyn JetStreamPublisher>,
    service_name: impl Into<String>,
) -> LayeredPublisher {
    ServiceBuilder::new()
        .layer(EventPublishTracingLayer::new(service_name))
        .layer(EventPublishLoggingLayer::new())
        .service(EventPublishService::new(publisher))
}
