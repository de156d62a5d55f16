//! Structured logging field name constants for sendline.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data (dispatch fan-out) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "broker", "pubsub", "relay", "worker", "db"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "consumer_loop", "replay_buffer", "resolver"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "publish", "subscribe", "reclaim", "fanout"
pub const OPERATION: &str = "op";

/// Process instance identifier (consumer name / relay instance).
pub const INSTANCE_ID: &str = "instance_id";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Domain event type (dot-namespaced).
pub const EVENT_TYPE: &str = "event_type";

/// Stream entry ID being processed.
pub const ENTRY_ID: &str = "entry_id";

/// Channel key a pub/sub operation targets.
pub const CHANNEL: &str = "channel";

/// Entity ID a domain event references.
pub const ENTITY_ID: &str = "entity_id";

/// Recipient user ID of a notification.
pub const RECIPIENT_ID: &str = "recipient_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of stream entries in a batch (read or reclaimed).
pub const BATCH_COUNT: &str = "batch_count";

/// Number of recipients resolved for an event.
pub const RECIPIENT_COUNT: &str = "recipient_count";

/// Number of local subscribers on a channel.
pub const SUBSCRIBER_COUNT: &str = "subscriber_count";
