//! Hybrid local/cross-instance pub/sub router.
//!
//! One router instance per process owns the channel → subscriber registry.
//! `publish` dispatches to local subscribers synchronously (order preserved
//! relative to other publishes from the same task), then appends queue-class
//! events to the replay buffer and relays to other instances, both
//! asynchronously. Relay and buffer failures never suppress a local delivery
//! that already happened.
//!
//! The relay subscription per channel is reference counted: it is
//! established, awaited, when the first local subscriber registers and torn
//! down exactly once when the last one leaves.
//!
//! Two modes:
//! - local-only: no relay configured; never errors for relay reasons.
//! - clustered: relay configured. With `relay_required`, subscribe and
//!   publish fail closed while the relay is down; otherwise the router
//!   degrades to local delivery and logs.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use sendline_core::{Error, Result};

use crate::channel::ChannelKey;
use crate::relay::{RelayInbox, RelayTransport};
use crate::replay::ReplayBuffer;

/// A local subscriber callback. Invoked inline on the publishing (or relay
/// inbound) task; must not block.
pub type Subscriber = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Default)]
struct ChannelRegistry {
    // BTreeMap keeps dispatch in registration order.
    subscribers: BTreeMap<u64, Subscriber>,
}

/// Handle to an active local subscription.
///
/// `close().await` removes the callback and, when the channel's local
/// subscriber count reaches zero, tears down the relay subscription.
/// Dropping without closing schedules the same removal best-effort.
pub struct Subscription {
    router: Arc<PubSubRouter>,
    channel: String,
    id: u64,
    closed: AtomicBool,
}

impl Subscription {
    /// The rendered channel this subscription listens on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Remove the subscription. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.router.remove_subscriber(&self.channel, self.id).await;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let router = Arc::clone(&self.router);
        let channel = std::mem::take(&mut self.channel);
        let id = self.id;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                router.remove_subscriber(&channel, id).await;
            });
        }
    }
}

/// The process-local pub/sub router.
pub struct PubSubRouter {
    channels: RwLock<HashMap<String, ChannelRegistry>>,
    next_id: AtomicU64,
    relay: Option<Arc<dyn RelayTransport>>,
    relay_required: bool,
    replay: ReplayBuffer,
}

impl PubSubRouter {
    /// A router with no cross-instance relay. Single-process deployments and
    /// tests.
    pub fn local_only(replay: ReplayBuffer) -> Arc<Self> {
        Arc::new(Self {
            channels: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            relay: None,
            relay_required: false,
            replay,
        })
    }

    /// A router wired to a relay transport. Spawns the inbound dispatch task
    /// draining `inbox` into local subscribers.
    ///
    /// With `relay_required`, subscribe and publish fail closed while the
    /// relay reports disconnected.
    pub fn clustered(
        relay: Arc<dyn RelayTransport>,
        mut inbox: RelayInbox,
        replay: ReplayBuffer,
        relay_required: bool,
    ) -> Arc<Self> {
        let router = Arc::new(Self {
            channels: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            relay: Some(relay),
            relay_required,
            replay,
        });

        let inbound = Arc::clone(&router);
        tokio::spawn(async move {
            while let Some((channel, event)) = inbox.recv().await {
                let delivered = inbound.dispatch_local(&channel, &event).await;
                trace!(
                    subsystem = "pubsub",
                    channel = %channel,
                    subscriber_count = delivered,
                    "Dispatched relay inbound event"
                );
            }
            debug!(subsystem = "pubsub", "Relay inbox closed");
        });

        router
    }

    fn check_relay_available(&self, channel: &str) -> Result<()> {
        if let Some(relay) = &self.relay {
            if self.relay_required && !relay.is_connected() {
                return Err(Error::Relay(format!(
                    "relay unavailable, failing closed on {channel}"
                )));
            }
        }
        Ok(())
    }

    /// Register a local callback on a channel.
    ///
    /// When this is the first local subscriber, the relay subscription is
    /// established before returning, closing the window where a
    /// cross-instance event could be missed between registration and relay
    /// setup. On relay failure the registration is rolled back in
    /// relay-required mode; otherwise the router logs and degrades to local
    /// delivery.
    pub async fn subscribe<F>(self: &Arc<Self>, key: &ChannelKey, callback: F) -> Result<Subscription>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let channel = key.render();
        self.check_relay_available(&channel)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut channels = self.channels.write().await;
        let registry = channels.entry(channel.clone()).or_default();
        let first = registry.subscribers.is_empty();
        registry.subscribers.insert(id, Arc::new(callback));

        if first {
            if let Some(relay) = &self.relay {
                // Awaited under the registry lock so a concurrent first
                // subscriber cannot race the channel setup.
                if let Err(e) = relay.subscribe(&channel).await {
                    if self.relay_required {
                        if let Some(registry) = channels.get_mut(&channel) {
                            registry.subscribers.remove(&id);
                            if registry.subscribers.is_empty() {
                                channels.remove(&channel);
                            }
                        }
                        return Err(e);
                    }
                    warn!(
                        subsystem = "pubsub",
                        channel = %channel,
                        error = %e,
                        "Relay subscribe failed, degrading to local-only delivery"
                    );
                }
            }
        }
        drop(channels);

        debug!(
            subsystem = "pubsub",
            channel = %channel,
            first_subscriber = first,
            "Local subscriber registered"
        );
        Ok(Subscription {
            router: Arc::clone(self),
            channel,
            id,
            closed: AtomicBool::new(false),
        })
    }

    async fn remove_subscriber(&self, channel: &str, id: u64) {
        let mut channels = self.channels.write().await;
        let teardown = match channels.get_mut(channel) {
            Some(registry) => {
                registry.subscribers.remove(&id);
                if registry.subscribers.is_empty() {
                    channels.remove(channel);
                    true
                } else {
                    false
                }
            }
            None => false,
        };

        if teardown {
            if let Some(relay) = &self.relay {
                // Awaited under the registry lock, like the first-subscriber
                // setup: a concurrent subscribe cannot register and relay-
                // subscribe until this stale teardown has landed.
                if let Err(e) = relay.unsubscribe(channel).await {
                    warn!(
                        subsystem = "pubsub",
                        channel = %channel,
                        error = %e,
                        "Relay unsubscribe failed"
                    );
                }
            }
        }
        drop(channels);
        debug!(
            subsystem = "pubsub",
            channel = %channel,
            teardown,
            "Local subscriber removed"
        );
    }

    /// Publish an event: local subscribers first (synchronous, ordered),
    /// then replay buffer append (queue channels) and cross-instance relay,
    /// both detached and best-effort.
    pub async fn publish(&self, key: &ChannelKey, event: Value) -> Result<()> {
        let channel = key.render();
        self.check_relay_available(&channel)?;

        let delivered = self.dispatch_local(&channel, &event).await;
        trace!(
            subsystem = "pubsub",
            channel = %channel,
            subscriber_count = delivered,
            "Dispatched local event"
        );

        if key.is_replayed() {
            let replay = self.replay.clone();
            let replay_channel = channel.clone();
            let replay_event = event.clone();
            tokio::spawn(async move {
                if let Err(e) = replay.append(&replay_channel, &replay_event).await {
                    warn!(
                        subsystem = "pubsub",
                        channel = %replay_channel,
                        error = %e,
                        "Replay buffer append failed"
                    );
                }
            });
        }

        if let Some(relay) = &self.relay {
            let relay = Arc::clone(relay);
            tokio::spawn(async move {
                if let Err(e) = relay.publish(&channel, &event).await {
                    warn!(
                        subsystem = "pubsub",
                        channel = %channel,
                        error = %e,
                        "Relay publish failed"
                    );
                }
            });
        }
        Ok(())
    }

    async fn dispatch_local(&self, channel: &str, event: &Value) -> usize {
        let channels = self.channels.read().await;
        match channels.get(channel) {
            Some(registry) => {
                for callback in registry.subscribers.values() {
                    callback(event.clone());
                }
                registry.subscribers.len()
            }
            None => 0,
        }
    }

    /// Replay-buffer delta read: events on a queue channel with a sequence
    /// newer than the cursor. Non-queue channels have no buffer and yield
    /// an empty list.
    pub async fn events_since(&self, key: &ChannelKey, sequence: u64) -> Result<Vec<Value>> {
        if !key.is_replayed() {
            return Ok(Vec::new());
        }
        self.replay.events_since(&key.render(), sequence).await
    }

    /// Current local subscriber count on a channel.
    pub async fn subscriber_count(&self, key: &ChannelKey) -> usize {
        let channels = self.channels.read().await;
        channels
            .get(&key.render())
            .map(|r| r.subscribers.len())
            .unwrap_or(0)
    }
}
