use anyhow::anyhow;
use async_trait::async_trait;
use common::domain::{DomainError, DomainResult, EventDispatcher, EventEnvelope, EventListener};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Event bus that delivers to listeners inside the process
///
/// `dispatch` returns only after every listener subscribed to the event type has
/// handled the envelope, in subscription order.
#[derive(Default)]
pub struct InProcessEventBus {
    listeners: RwLock<HashMap<String, Vec<Arc<dyn EventListener>>>>,
}

impl InProcessEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, event_type: impl Into<String>, listener: Arc<dyn EventListener>) {
        self.listeners
            .write()
            .await
            .entry(event_type.into())
            .or_default()
            .push(listener);
    }
}

#[async_trait]
impl EventDispatcher for InProcessEventBus {
    async fn dispatch(&self, envelope: &EventEnvelope) -> DomainResult<()> {
        // Snapshot so no lock is held while listeners run
        let listeners = self
            .listeners
            .read()
            .await
            .get(envelope.event_type())
            .cloned()
            .unwrap_or_default();

        if listeners.is_empty() {
            debug!(event_type = %envelope.event_type(), event_id = %envelope.id(), "no listeners, dropping event");
            return Ok(());
        }

        // Retriable listener failures mean the bus could not deliver; anything else
        // is the listener's verdict on the event and passes through unchanged
        for listener in listeners {
            listener.handle(envelope).await.map_err(|e| {
                if !e.is_retriable() {
                    return e;
                }
                DomainError::EventBusUnavailable(anyhow!(e).context(format!(
                    "listener failed for event {} ({})",
                    envelope.id(),
                    envelope.event_type()
                )))
            })?;
        }

        Ok(())
    }
}
