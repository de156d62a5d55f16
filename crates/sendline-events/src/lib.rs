//! # sendline-events
//!
//! Real-time event distribution core for sendline.
//!
//! This crate provides:
//! - Durable domain-event broker over a Redis stream with consumer-group
//!   semantics (at-least-once, crash reclaim)
//! - Hybrid local/cross-instance pub/sub router with a best-effort replay
//!   buffer for delta resync
//! - Notification worker: recipient resolution, dedup windows, persisted
//!   rows and enriched live pushes
//! - Push-to-pull subscription bridge for live-subscription endpoints
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sendline_events::{
//!     BrokerConfig, ChannelKey, EventBroker, EventDispatcher, EventStream,
//!     NotificationWorker, PubSubRouter, RedisRelay, ReplayBuffer, WorkerConfig,
//! };
//! use sendline_db::Database;
//!
//! let db = Database::connect("postgres://...").await?;
//! let broker = Arc::new(EventBroker::connect("redis://...", BrokerConfig::from_env()).await?);
//!
//! let (relay, inbox) = RedisRelay::connect("redis://...").await?;
//! let replay = ReplayBuffer::connect("redis://...").await?;
//! let router = PubSubRouter::clustered(relay, inbox, replay, false);
//!
//! let worker = Arc::new(NotificationWorker::new(
//!     db.notifications.clone(),
//!     db.profiles.clone(),
//!     db.social.clone(),
//!     db.feeds.clone(),
//!     Arc::clone(&router),
//!     WorkerConfig::from_env(),
//! ));
//! let handle = worker.start(&broker).await?;
//!
//! // A live subscription endpoint
//! let subscribe_router = Arc::clone(&router);
//! let stream = EventStream::eager(move |push| async move {
//!     subscribe_router
//!         .subscribe(&ChannelKey::notifications("user-a"), move |e| push(e))
//!         .await
//! })
//! .await?;
//! while let Some(event) = stream.recv().await {
//!     println!("notification: {event}");
//! }
//!
//! handle.shutdown().await?;
//! ```

pub mod bridge;
pub mod broker;
pub mod channel;
pub mod dispatch;
pub mod pubsub;
pub mod relay;
pub mod replay;
pub mod resolver;
pub mod worker;

#[cfg(test)]
pub(crate) mod testkit;

// Re-export core types
pub use sendline_core::*;

pub use bridge::{EventStream, PushFn};
pub use broker::{BrokerConfig, BrokerHandle, EventBroker, EventHandler};
pub use channel::ChannelKey;
pub use dispatch::EventDispatcher;
pub use pubsub::{PubSubRouter, Subscription};
pub use relay::{RedisRelay, RelayInbox, RelayMessage, RelayTransport};
pub use replay::ReplayBuffer;
pub use resolver::resolve_recipients;
pub use worker::{NotificationWorker, WorkerConfig};
