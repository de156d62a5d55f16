//! Centralized default constants for the sendline event system.
//!
//! **This module is the single source of truth** for all shared default
//! values. These are operational tunables, not protocol values: every one of
//! them is overridable through the corresponding config struct or
//! environment variable.

// =============================================================================
// EVENT BROKER (durable stream)
// =============================================================================

/// Redis stream key for durable domain events.
pub const EVENT_STREAM_KEY: &str = "sendline:events";

/// Consumer group shared by all notification worker instances.
pub const EVENT_CONSUMER_GROUP: &str = "notification-workers";

/// Max entries fetched per blocking read.
pub const EVENT_BATCH_SIZE: usize = 50;

/// Blocking read timeout in milliseconds.
pub const EVENT_BLOCK_MS: u64 = 5_000;

/// Idle threshold after which a pending entry becomes reclaimable.
pub const EVENT_CLAIM_IDLE_MS: u64 = 30_000;

/// Max entries reclaimed per auto-claim pass.
pub const EVENT_CLAIM_BATCH_SIZE: usize = 10;

/// Approximate stream length cap (`MAXLEN ~`).
pub const EVENT_MAX_STREAM_LEN: usize = 10_000;

/// Upper bound for the consumer loop's exponential error backoff.
pub const EVENT_MAX_BACKOFF_MS: u64 = 30_000;

// =============================================================================
// PUBSUB / REPLAY BUFFER
// =============================================================================

/// Events retained per queue channel for delta resync.
pub const REPLAY_BUFFER_SIZE: usize = 100;

/// Replay buffer TTL in seconds.
pub const REPLAY_BUFFER_TTL_SECS: u64 = 300;

// =============================================================================
// SUBSCRIPTION BRIDGE
// =============================================================================

/// Max buffered items per live subscription before the oldest is dropped.
pub const SUBSCRIPTION_QUEUE_CAPACITY: usize = 1_000;

// =============================================================================
// NOTIFICATION DEDUP WINDOWS (minutes)
// =============================================================================

/// Repeat votes on the same entity are suppressed within this window.
pub const VOTE_DEDUP_MINUTES: i64 = 60;

/// Repeat follows of the same user are suppressed within this window.
pub const FOLLOW_DEDUP_MINUTES: i64 = 1_440;

/// Repeat proposal activity notifications are suppressed within this window.
pub const PROPOSAL_DEDUP_MINUTES: i64 = 60;

// =============================================================================
// ENRICHMENT
// =============================================================================

/// Max characters of comment body included in a live push.
pub const COMMENT_PREVIEW_LENGTH: usize = 100;
