use crate::nats::{JetStreamConsumer, PullConsumer};
use anyhow::Result;
use async_nats::jetstream::{self, Message};
use futures::future::BoxFuture;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Per-message outcome of a processed batch, by index into the fetched batch
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProcessingResult {
    /// Indices to acknowledge
    pub ack: Vec<usize>,
    /// Indices to reject for redelivery, with an optional reason
    pub nak: Vec<(usize, Option<String>)>,
}

impl ProcessingResult {
    pub fn ack_all(count: usize) -> Self {
        Self {
            ack: (0..count).collect(),
            nak: Vec::new(),
        }
    }

    pub fn nak_all(count: usize, error: Option<String>) -> Self {
        Self {
            ack: Vec::new(),
            nak: (0..count).map(|i| (i, error.clone())).collect(),
        }
    }

    pub fn new(ack: Vec<usize>, nak: Vec<(usize, Option<String>)>) -> Self {
        Self { ack, nak }
    }
}

/// Takes a batch of raw JetStream messages and decides which to ack or nak
pub type BatchProcessor =
    Box<dyn Fn(&[Message]) -> BoxFuture<'static, Result<ProcessingResult>> + Send + Sync>;

/// Durable pull consumer that feeds fetched batches through a [`BatchProcessor`]
pub struct NatsConsumer {
    consumer: Box<dyn PullConsumer>,
    batch_size: usize,
    max_wait: Duration,
    processor: BatchProcessor,
}

impl NatsConsumer {
    pub async fn new(
        client: &dyn JetStreamConsumer,
        stream_name: &str,
        consumer_name: &str,
        subject_filter: &str,
        batch_size: usize,
        max_wait: Duration,
        processor: BatchProcessor,
    ) -> Result<Self> {
        debug!(
            stream = stream_name,
            consumer = consumer_name,
            subject = subject_filter,
            "Creating JetStream consumer"
        );

        let consumer = client
            .create_consumer(
                jetstream::consumer::pull::Config {
                    name: Some(consumer_name.to_string()),
                    durable_name: Some(consumer_name.to_string()),
                    filter_subject: subject_filter.to_string(),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ..Default::default()
                },
                stream_name,
            )
            .await?;

        info!(
            stream = stream_name,
            consumer = consumer_name,
            "Consumer created successfully"
        );

        Ok(Self {
            consumer,
            batch_size,
            max_wait,
            processor,
        })
    }

    pub async fn run(&self, ctx: CancellationToken) -> Result<()> {
        info!("Starting consumer loop");

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("Received shutdown signal, stopping consumer");
                    break;
                }
                result = self.fetch_and_process_batch() => {
                    if let Err(e) = result {
                        error!(error = %e, "Error processing batch");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }

        info!("Consumer stopped gracefully");
        Ok(())
    }

    async fn fetch_and_process_batch(&self) -> Result<()> {
        let messages = self
            .consumer
            .fetch_messages(self.batch_size, self.max_wait)
            .await?;

        if messages.is_empty() {
            debug!("No messages in batch");
            return Ok(());
        }

        debug!(message_count = messages.len(), "Received message batch");

        let processing_result = match (self.processor)(&messages).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Processor returned error, rejecting all messages");
                ProcessingResult::nak_all(messages.len(), Some(e.to_string()))
            }
        };

        for idx in processing_result.ack {
            let Some(msg) = messages.get(idx) else {
                warn!(message_index = idx, batch_size = messages.len(), "Invalid ack index");
                continue;
            };
            if let Err(e) = msg.ack().await {
                error!(error = %e, message_index = idx, "Failed to acknowledge message");
            }
        }

        for (idx, reason) in processing_result.nak {
            let Some(msg) = messages.get(idx) else {
                warn!(message_index = idx, batch_size = messages.len(), "Invalid nak index");
                continue;
            };
            warn!(
                message_index = idx,
                subject = %msg.subject,
                reason = reason.as_deref().unwrap_or("unspecified"),
                "Rejecting message for redelivery"
            );
            if let Err(e) = msg.ack_with(jetstream::AckKind::Nak(None)).await {
                error!(error = %e, message_index = idx, "Failed to reject message");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nats::{MockJetStreamConsumer, MockPullConsumer};

    fn noop_processor() -> BatchProcessor {
        Box::new(|messages: &[Message]| {
            let count = messages.len();
            Box::pin(async move { Ok(ProcessingResult::ack_all(count)) })
        })
    }

    #[test]
    fn test_processing_result_helpers() {
        assert_eq!(ProcessingResult::ack_all(3).ack, vec![0, 1, 2]);

        let rejected = ProcessingResult::nak_all(2, Some("store down".to_string()));
        assert!(rejected.ack.is_empty());
        assert_eq!(
            rejected.nak,
            vec![
                (0, Some("store down".to_string())),
                (1, Some("store down".to_string()))
            ]
        );
    }

    #[tokio::test]
    async fn test_new_creates_durable_explicit_ack_consumer() {
        let mut client = MockJetStreamConsumer::new();
        client
            .expect_create_consumer()
            .withf(|config, stream| {
                stream == "message_events"
                    && config.durable_name.as_deref() == Some("sms-relay-message-events")
                    && config.filter_subject == "message_events.>"
                    && config.ack_policy == jetstream::consumer::AckPolicy::Explicit
            })
            .times(1)
            .returning(|_, _| Ok(Box::new(MockPullConsumer::new())));

        let consumer = NatsConsumer::new(
            &client,
            "message_events",
            "sms-relay-message-events",
            "message_events.>",
            10,
            Duration::from_secs(1),
            noop_processor(),
        )
        .await;

        assert!(consumer.is_ok());
    }

    #[tokio::test]
    async fn test_new_propagates_consumer_creation_error() {
        let mut client = MockJetStreamConsumer::new();
        client
            .expect_create_consumer()
            .returning(|_, _| Err(anyhow::anyhow!("stream not found")));

        let result = NatsConsumer::new(
            &client,
            "message_events",
            "sms-relay-message-events",
            "message_events.>",
            10,
            Duration::from_secs(1),
            noop_processor(),
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let mut pull = MockPullConsumer::new();
        pull.expect_fetch_messages().returning(|_, _| Ok(vec![]));

        let mut client = MockJetStreamConsumer::new();
        client
            .expect_create_consumer()
            .return_once(move |_, _| Ok(Box::new(pull)));

        let consumer = NatsConsumer::new(
            &client,
            "message_events",
            "sms-relay-message-events",
            "message_events.>",
            10,
            Duration::from_millis(10),
            noop_processor(),
        )
        .await
        .unwrap();

        let ctx = CancellationToken::new();
        ctx.cancel();

        assert!(consumer.run(ctx).await.is_ok());
    }
}
