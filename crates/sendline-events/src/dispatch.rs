//! Event dispatch entry point for business operations.
//!
//! Durable path: append to the broker's stream and let the consumer group
//! process it. Degraded path: when no stream is configured, run the
//! notification worker inline on the emitting task. Inline failures are
//! logged and swallowed — a notification hiccup must never fail the
//! business write that already committed.

use std::sync::Arc;

use tracing::{debug, warn};

use sendline_core::{DomainEvent, Result};

use crate::broker::EventBroker;
use crate::worker::NotificationWorker;

/// Routes domain events to the durable stream or the inline worker.
pub struct EventDispatcher {
    broker: Arc<EventBroker>,
    inline_worker: Option<Arc<NotificationWorker>>,
}

impl EventDispatcher {
    pub fn new(broker: Arc<EventBroker>, inline_worker: Option<Arc<NotificationWorker>>) -> Self {
        Self {
            broker,
            inline_worker,
        }
    }

    /// Emit a domain event.
    ///
    /// With an initialized broker this is a durable append; otherwise the
    /// inline worker (when present) processes the event synchronously.
    /// Both paths are best-effort toward the caller: failures are logged,
    /// never returned.
    pub async fn publish(&self, event: DomainEvent) -> Result<()> {
        if self.broker.is_initialized().await {
            return self.broker.publish(&event).await;
        }

        match &self.inline_worker {
            Some(worker) => {
                debug!(
                    subsystem = "broker",
                    component = "dispatch",
                    event_type = %event.event_type,
                    "No durable stream, processing event inline"
                );
                if let Err(e) = worker.process_event(&event).await {
                    warn!(
                        subsystem = "broker",
                        component = "dispatch",
                        event_type = %event.event_type,
                        entity_id = %event.entity_id,
                        error = %e,
                        "Inline event processing failed"
                    );
                }
            }
            None => {
                warn!(
                    subsystem = "broker",
                    component = "dispatch",
                    event_type = %event.event_type,
                    "No durable stream and no inline worker, dropping event"
                );
            }
        }
        Ok(())
    }
}
