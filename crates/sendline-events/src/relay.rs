//! Cross-instance relay transport.
//!
//! The router fans events out locally first; the relay carries them to other
//! processes. [`RelayTransport`] is the seam: [`RedisRelay`] implements it
//! over Redis pub/sub, unit tests substitute a mock.
//!
//! Every outbound payload is wrapped in a [`RelayEnvelope`] stamped with the
//! sending instance's ID. Inbound messages carrying our own instance ID are
//! discarded — the originating process already delivered the event locally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use sendline_core::{Error, RelayEnvelope, Result};

/// An event received from another instance: `(channel, payload)`.
pub type RelayMessage = (String, serde_json::Value);

/// Receiving half of the relay's inbound message stream. Handed to the
/// router, which dispatches each message to its local subscribers.
pub type RelayInbox = mpsc::UnboundedReceiver<RelayMessage>;

/// Transport seam for cross-instance event relay.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Unique identifier of this process instance.
    fn instance_id(&self) -> &str;

    /// Whether the transport currently believes it can reach other
    /// instances. Used by the router's fail-closed checks.
    fn is_connected(&self) -> bool;

    /// Publish an event to a channel on all other instances.
    async fn publish(&self, channel: &str, event: &serde_json::Value) -> Result<()>;

    /// Start receiving events published to a channel by other instances.
    async fn subscribe(&self, channel: &str) -> Result<()>;

    /// Stop receiving events for a channel.
    async fn unsubscribe(&self, channel: &str) -> Result<()>;
}

/// Decode an inbound relay payload, dropping malformed envelopes and
/// messages that originated from this instance.
fn decode_inbound(own_instance_id: &str, payload: &str) -> Option<serde_json::Value> {
    let envelope: RelayEnvelope = match serde_json::from_str(payload) {
        Ok(e) => e,
        Err(e) => {
            warn!(
                subsystem = "relay",
                error = %e,
                "Dropping malformed relay envelope"
            );
            return None;
        }
    };
    if envelope.instance_id == own_instance_id {
        trace!(
            subsystem = "relay",
            "Discarding own-instance relay message"
        );
        return None;
    }
    Some(envelope.event)
}

/// Redis pub/sub relay.
///
/// Holds two connections: a [`ConnectionManager`] for PUBLISH (auto
/// reconnecting) and a dedicated pub/sub connection split into a
/// subscription sink and an inbound stream. A background task drains the
/// stream into the [`RelayInbox`].
pub struct RedisRelay {
    instance_id: String,
    publisher: ConnectionManager,
    sink: Mutex<redis::aio::PubSubSink>,
    connected: AtomicBool,
}

impl RedisRelay {
    /// Connect to Redis with a freshly generated instance ID.
    pub async fn connect(redis_url: &str) -> Result<(Arc<Self>, RelayInbox)> {
        Self::connect_with_instance(redis_url, Uuid::new_v4().to_string()).await
    }

    /// Connect with an explicit instance ID.
    pub async fn connect_with_instance(
        redis_url: &str,
        instance_id: String,
    ) -> Result<(Arc<Self>, RelayInbox)> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Config(format!("invalid Redis URL: {e}")))?;
        let publisher = ConnectionManager::new(client.clone()).await?;
        let pubsub = client.get_async_pubsub().await?;
        let (sink, mut stream) = pubsub.split();

        let (tx, rx) = mpsc::unbounded_channel();
        let relay = Arc::new(Self {
            instance_id,
            publisher,
            sink: Mutex::new(sink),
            connected: AtomicBool::new(true),
        });

        let reader = Arc::clone(&relay);
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let channel = msg.get_channel_name().to_string();
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(
                            subsystem = "relay",
                            channel = %channel,
                            error = %e,
                            "Dropping non-text relay payload"
                        );
                        continue;
                    }
                };
                if let Some(event) = decode_inbound(&reader.instance_id, &payload) {
                    if tx.send((channel, event)).is_err() {
                        break;
                    }
                }
            }
            reader.connected.store(false, Ordering::SeqCst);
            warn!(
                subsystem = "relay",
                instance_id = %reader.instance_id,
                "Relay inbound stream closed"
            );
        });

        debug!(
            subsystem = "relay",
            instance_id = %relay.instance_id,
            "Relay connected"
        );
        Ok((relay, rx))
    }
}

#[async_trait]
impl RelayTransport for RedisRelay {
    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, channel: &str, event: &serde_json::Value) -> Result<()> {
        let envelope = RelayEnvelope::new(&self.instance_id, event.clone());
        let payload = serde_json::to_string(&envelope)?;
        let mut conn = self.publisher.clone();
        let _: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.subscribe(channel).await?;
        debug!(
            subsystem = "relay",
            channel = %channel,
            "Relay channel subscribed"
        );
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.unsubscribe(channel).await?;
        debug!(
            subsystem = "relay",
            channel = %channel,
            "Relay channel unsubscribed"
        );
        Ok(())
    }
}
