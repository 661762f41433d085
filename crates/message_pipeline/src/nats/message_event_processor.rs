use crate::domain::status_for_event_type;
use common::domain::{DomainError, EventEnvelope, EventListener};
use common::nats::{
    create_json_processor, BatchProcessor, DecodedMessage, JsonHandler, ProcessingResult,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A status event can overtake the send intent it refers to, so a missing
/// message is worth another delivery
fn requests_redelivery(envelope: &EventEnvelope, error: &DomainError) -> bool {
    error.is_retriable()
        || (matches!(error, DomainError::MessageNotFound(_))
            && status_for_event_type(envelope.event_type()).is_some())
}

/// Hand each decoded envelope to the listener and decide its ack.
///
/// Success acks. Retriable errors, and status events for messages not stored yet,
/// nak so JetStream redelivers. Anything else will never succeed on redelivery,
/// so it is logged and acked.
pub async fn process_message_events(
    listener: &dyn EventListener,
    messages: Vec<DecodedMessage<EventEnvelope>>,
) -> ProcessingResult {
    let mut result = ProcessingResult::default();

    for message in messages {
        let envelope = &message.decoded;

        match listener.handle(envelope).await {
            Ok(()) => {
                debug!(
                    index = message.index,
                    event_id = %envelope.id(),
                    event_type = %envelope.event_type(),
                    "processed message event"
                );
                result.ack.push(message.index);
            }
            Err(e) if requests_redelivery(envelope, &e) => {
                warn!(
                    error = %e,
                    index = message.index,
                    event_id = %envelope.id(),
                    subject = %message.subject,
                    "message event failed, requesting redelivery"
                );
                result.nak.push((message.index, Some(e.to_string())));
            }
            Err(e) => {
                error!(
                    error = %e,
                    index = message.index,
                    event_id = %envelope.id(),
                    subject = %message.subject,
                    "dropping message event that cannot be processed"
                );
                result.ack.push(message.index);
            }
        }
    }

    result
}

/// Batch processor for the message events stream
pub fn create_message_event_processor(listener: Arc<dyn EventListener>) -> BatchProcessor {
    let handler: JsonHandler<EventEnvelope> = Arc::new(move |messages| {
        let listener = Arc::clone(&listener);
        Box::pin(async move { Ok(process_message_events(listener.as_ref(), messages).await) })
    });

    create_json_processor(handler)
}
