use crate::config::ServiceConfig;
use common::domain::{MessageRepository, SystemClock, UuidV4Generator};
use common::nats::{JetStreamConsumer, JetStreamPublisher};
use message_pipeline::{
    MessageEventListener, MessagePipeline, MessagePipelineWorker, MessageService,
    NatsEventDispatcher, TracedMessagePipeline, WorkerProcess,
};
use std::sync::Arc;
use tracing::debug;

/// Shared clients the application is assembled from
pub struct SmsRelayDependencies {
    pub repository: Arc<dyn MessageRepository>,
    pub consumer: Arc<dyn JetStreamConsumer>,
    pub publisher: Arc<dyn JetStreamPublisher>,
}

/// The producer-side pipeline and the consumer worker over one store and stream
pub struct SmsRelay {
    pipeline: Arc<dyn MessagePipeline>,
    worker: MessagePipelineWorker,
}

impl SmsRelay {
    pub async fn new(config: &ServiceConfig, deps: SmsRelayDependencies) -> anyhow::Result<Self> {
        debug!("Initializing sms-relay module");

        let dispatcher = Arc::new(NatsEventDispatcher::new(
            deps.publisher,
            config.nats_message_stream.clone(),
            config.otel_service_name.clone(),
        ));
        let service = MessageService::new(
            deps.repository.clone(),
            dispatcher,
            Arc::new(SystemClock),
            Arc::new(UuidV4Generator),
            config.message_service(),
        );
        let pipeline: Arc<dyn MessagePipeline> = Arc::new(TracedMessagePipeline::new(service));

        let listener = Arc::new(MessageEventListener::new(
            deps.repository,
            Arc::new(SystemClock),
        ));
        let worker = MessagePipelineWorker::new(deps.consumer, listener, config.worker()).await?;

        Ok(Self { pipeline, worker })
    }

    /// Entry point for send and store requests
    pub fn pipeline(&self) -> Arc<dyn MessagePipeline> {
        Arc::clone(&self.pipeline)
    }

    pub fn into_runner_process(self) -> WorkerProcess {
        self.worker.into_runner_process()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreBackend;
    use async_nats::HeaderMap;
    use bytes::Bytes;
    use chrono::Utc;
    use common::domain::{DomainError, InMemoryMessageRepository, MessageStatus};
    use common::nats::{MockJetStreamConsumer, MockJetStreamPublisher, MockPullConsumer};
    use message_pipeline::{SendMessageInput, StoreMessageInput};
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    fn config() -> ServiceConfig {
        ServiceConfig {
            log_level: "info".to_string(),
            nats_url: "nats://localhost:4222".to_string(),
            nats_message_stream: "message_events".to_string(),
            nats_message_subject: "message_events.>".to_string(),
            nats_consumer_name: "sms-relay-message-events".to_string(),
            nats_batch_size: 10,
            nats_batch_wait_ms: 10,
            store_backend: StoreBackend::Memory,
            postgres_host: "localhost".to_string(),
            postgres_port: 5432,
            postgres_database: "sms_relay".to_string(),
            postgres_username: "sms_relay".to_string(),
            postgres_password: "sms_relay".to_string(),
            postgres_max_pool_size: 1,
            postgres_run_migrations: false,
            read_back_timeout_ms: 0,
            read_back_initial_backoff_ms: 25,
            read_back_max_backoff_ms: 500,
            request_timeout_ms: 1_000,
            otel_endpoint: "http://localhost:4317".to_string(),
            otel_service_name: "sms-relay".to_string(),
            otel_enabled: false,
            startup_timeout_secs: 1,
            shutdown_timeout_secs: 1,
        }
    }

    fn consumer() -> MockJetStreamConsumer {
        let mut pull = MockPullConsumer::new();
        pull.expect_fetch_messages().returning(|_, _| Ok(vec![]));
        let mut consumer = MockJetStreamConsumer::new();
        consumer
            .expect_create_consumer()
            .return_once(move |_, _| Ok(Box::new(pull)));
        consumer
    }

    #[tokio::test]
    async fn test_store_message_goes_straight_to_repository() {
        let repository = Arc::new(InMemoryMessageRepository::new());
        let app = SmsRelay::new(
            &config(),
            SmsRelayDependencies {
                repository: repository.clone(),
                consumer: Arc::new(consumer()),
                publisher: Arc::new(MockJetStreamPublisher::new()),
            },
        )
        .await
        .unwrap();
        let id = Uuid::new_v4();

        let message = app
            .pipeline()
            .store_message(StoreMessageInput {
                id,
                from: "+3000".to_string(),
                to: "+4000".to_string(),
                content: "hey".to_string(),
                request_received_at: Utc::now(),
            })
            .await
            .unwrap();

        assert_eq!(message.status, MessageStatus::Pending);
        assert!(repository.contains(id).await);
    }

    #[tokio::test]
    async fn test_send_message_publishes_to_message_stream() {
        let mut publisher = MockJetStreamPublisher::new();
        publisher
            .expect_publish_with_headers()
            .withf(|subject: &String, _: &HeaderMap, _: &Bytes| {
                subject == "message_events.message.api.sent"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        let app = SmsRelay::new(
            &config(),
            SmsRelayDependencies {
                repository: Arc::new(InMemoryMessageRepository::new()),
                consumer: Arc::new(consumer()),
                publisher: Arc::new(publisher),
            },
        )
        .await
        .unwrap();

        // No worker is running, so the single read-back finds nothing
        let result = app
            .pipeline()
            .send_message(SendMessageInput {
                from: "+1000".to_string(),
                to: "+2000".to_string(),
                content: "hi".to_string(),
                request_received_at: Utc::now(),
                source: "api".to_string(),
            })
            .await;

        assert!(matches!(result, Err(DomainError::MessageNotFound(_))));
    }

    #[tokio::test]
    async fn test_runner_process_stops_on_cancel() {
        let app = SmsRelay::new(
            &config(),
            SmsRelayDependencies {
                repository: Arc::new(InMemoryMessageRepository::new()),
                consumer: Arc::new(consumer()),
                publisher: Arc::new(MockJetStreamPublisher::new()),
            },
        )
        .await
        .unwrap();
        let ctx = CancellationToken::new();

        let handle = tokio::spawn((app.into_runner_process())(ctx.clone()));
        ctx.cancel();

        assert!(handle.await.unwrap().is_ok());
    }
}
