use crate::nats::create_message_event_processor;
use common::domain::EventListener;
use common::nats::{JetStreamConsumer, NatsConsumer};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub type WorkerProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send,
>;

#[derive(Debug, Clone)]
pub struct MessagePipelineWorkerConfig {
    pub stream: String,
    pub subject_filter: String,
    pub consumer_name: String,
    pub batch_size: usize,
    pub batch_wait: Duration,
}

/// Consumes the message events stream and feeds each envelope to the listener
pub struct MessagePipelineWorker {
    consumer: NatsConsumer,
}

impl MessagePipelineWorker {
    pub async fn new(
        consumer_client: Arc<dyn JetStreamConsumer>,
        listener: Arc<dyn EventListener>,
        config: MessagePipelineWorkerConfig,
    ) -> anyhow::Result<Self> {
        info!(
            stream = %config.stream,
            consumer = %config.consumer_name,
            "Initializing message pipeline worker"
        );

        let consumer = NatsConsumer::new(
            consumer_client.as_ref(),
            &config.stream,
            &config.consumer_name,
            &config.subject_filter,
            config.batch_size,
            config.batch_wait,
            create_message_event_processor(listener),
        )
        .await?;

        Ok(Self { consumer })
    }

    pub fn into_runner_process(self) -> WorkerProcess {
        let consumer = self.consumer;
        Box::new(move |ctx| Box::pin(async move { consumer.run(ctx).await }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::MockEventListener;
    use common::nats::{MockJetStreamConsumer, MockPullConsumer};

    fn config() -> MessagePipelineWorkerConfig {
        MessagePipelineWorkerConfig {
            stream: "message_events".to_string(),
            subject_filter: "message_events.>".to_string(),
            consumer_name: "sms-relay-message-events".to_string(),
            batch_size: 10,
            batch_wait: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_worker_runs_until_cancelled() {
        let mut pull = MockPullConsumer::new();
        pull.expect_fetch_messages().returning(|_, _| Ok(vec![]));
        let mut client = MockJetStreamConsumer::new();
        client
            .expect_create_consumer()
            .withf(|config, stream| {
                stream == "message_events"
                    && config.durable_name.as_deref() == Some("sms-relay-message-events")
            })
            .return_once(move |_, _| Ok(Box::new(pull)));

        let worker = MessagePipelineWorker::new(
            Arc::new(client),
            Arc::new(MockEventListener::new()),
            config(),
        )
        .await
        .unwrap();

        let ctx = CancellationToken::new();
        let process = worker.into_runner_process();
        let handle = tokio::spawn(process(ctx.clone()));
        ctx.cancel();

        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_worker_fails_when_consumer_cannot_be_created() {
        let mut client = MockJetStreamConsumer::new();
        client
            .expect_create_consumer()
            .returning(|_, _| Err(anyhow::anyhow!("stream not found")));

        let result = MessagePipelineWorker::new(
            Arc::new(client),
            Arc::new(MockEventListener::new()),
            config(),
        )
        .await;

        assert!(result.is_err());
    }
}
