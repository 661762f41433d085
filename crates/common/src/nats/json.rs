use crate::nats::{set_parent_from_headers, BatchProcessor, ProcessingResult};
use anyhow::Result;
use async_nats::jetstream::Message;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, error, info_span, Instrument};

/// A decoded JSON payload paired with its position in the fetched batch
#[derive(Debug)]
pub struct DecodedMessage<T> {
    pub index: usize,
    pub subject: String,
    pub decoded: T,
}

impl<T> DecodedMessage<T> {
    pub fn new(index: usize, subject: impl Into<String>, decoded: T) -> Self {
        Self {
            index,
            subject: subject.into(),
            decoded,
        }
    }
}

/// Business handler for successfully decoded messages
pub type JsonHandler<T> = Arc<
    dyn Fn(Vec<DecodedMessage<T>>) -> BoxFuture<'static, Result<ProcessingResult>> + Send + Sync,
>;

/// Output of the decode phase: decoded values plus the indices that failed to decode
#[derive(Debug)]
pub struct DecodedBatch<T> {
    pub decoded: Vec<DecodedMessage<T>>,
    pub decode_failures: Vec<usize>,
}

/// Decode `(subject, payload)` pairs as JSON, keeping batch indices
pub fn decode_json_batch<'a, T, I>(payloads: I) -> DecodedBatch<T>
where
    T: DeserializeOwned,
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut decoded = Vec::new();
    let mut decode_failures = Vec::new();

    for (idx, (subject, payload)) in payloads.into_iter().enumerate() {
        match serde_json::from_slice::<T>(payload) {
            Ok(value) => decoded.push(DecodedMessage::new(idx, subject, value)),
            Err(e) => {
                error!(
                    error = %e,
                    subject = %subject,
                    message_index = idx,
                    payload_size = payload.len(),
                    "failed to decode JSON message - acking to prevent poison pill"
                );
                decode_failures.push(idx);
            }
        }
    }

    DecodedBatch {
        decoded,
        decode_failures,
    }
}

/// Run the handler on a decoded batch and fold decode failures into the acks
pub async fn process_decoded_batch<T>(
    batch: DecodedBatch<T>,
    handler: &JsonHandler<T>,
) -> Result<ProcessingResult> {
    debug!(
        decoded_count = batch.decoded.len(),
        failed_count = batch.decode_failures.len(),
        "JSON decode phase complete"
    );

    let mut result = if batch.decoded.is_empty() {
        ProcessingResult::default()
    } else {
        handler(batch.decoded).await?
    };

    result.ack.extend(batch.decode_failures);
    Ok(result)
}

/// Batch processor that decodes JSON payloads into `T` and delegates to `handler`.
///
/// Undecodable payloads are acked so they are never redelivered. A handler error
/// propagates, which makes the consumer nak the whole batch.
pub fn create_json_processor<T>(handler: JsonHandler<T>) -> BatchProcessor
where
    T: DeserializeOwned + Send + 'static,
{
    Box::new(move |messages: &[Message]| {
        let messages = messages.to_vec();
        let handler = handler.clone();

        Box::pin(async move {
            let batch_span = info_span!(
                "process_nats_batch",
                batch_size = messages.len(),
                message_type = std::any::type_name::<T>()
            );

            async move {
                for msg in &messages {
                    if let Some(headers) = msg.headers.as_ref() {
                        set_parent_from_headers(headers);
                    }
                }

                let batch = decode_json_batch::<T, _>(
                    messages
                        .iter()
                        .map(|msg| (msg.subject.as_str(), msg.payload.as_ref())),
                );

                process_decoded_batch(batch, &handler).await
            }
            .instrument(batch_span)
            .await
        })
    })
}
