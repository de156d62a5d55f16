//! Bounded, TTL'd per-channel replay buffer for delta resync.
//!
//! Queue-class channels keep their last N events in a Redis list so a
//! reconnecting client can ask "everything since sequence S" instead of
//! refetching full state. The buffer is best-effort: appends never block or
//! fail the publish path, and a cursor that has aged out simply yields
//! whatever remains (the client falls back to a full resync).

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;

use sendline_core::{defaults, Error, Result};

/// Replay buffer over Redis lists. Cheap to clone (the connection manager is
/// a shared handle).
#[derive(Clone)]
pub struct ReplayBuffer {
    connection: Option<ConnectionManager>,
    capacity: usize,
    ttl_secs: u64,
}

impl ReplayBuffer {
    /// A buffer that retains nothing. Used when Redis is not configured and
    /// in local-only test setups.
    pub fn disabled() -> Self {
        Self {
            connection: None,
            capacity: defaults::REPLAY_BUFFER_SIZE,
            ttl_secs: defaults::REPLAY_BUFFER_TTL_SECS,
        }
    }

    /// Wrap an existing connection with default capacity and TTL.
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection: Some(connection),
            capacity: defaults::REPLAY_BUFFER_SIZE,
            ttl_secs: defaults::REPLAY_BUFFER_TTL_SECS,
        }
    }

    /// Connect a dedicated buffer connection.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Config(format!("invalid Redis URL: {e}")))?;
        Ok(Self::new(ConnectionManager::new(client).await?))
    }

    /// Override the retained event count per channel.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Override the buffer TTL.
    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs.max(1);
        self
    }

    fn key(channel: &str) -> String {
        format!("{channel}:replay")
    }

    /// Append an event to a channel's buffer, trimming to capacity and
    /// refreshing the TTL. No-op when disabled.
    pub async fn append(&self, channel: &str, event: &Value) -> Result<()> {
        let Some(connection) = &self.connection else {
            return Ok(());
        };
        let mut conn = connection.clone();
        let key = Self::key(channel);
        let payload = serde_json::to_string(event)?;
        redis::pipe()
            .lpush(&key, payload)
            .ignore()
            .ltrim(&key, 0, self.capacity as isize - 1)
            .ignore()
            .expire(&key, self.ttl_secs as i64)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    /// Events with a `sequence` greater than the given cursor, oldest first.
    /// A disabled buffer (or an aged-out channel) yields an empty list.
    pub async fn events_since(&self, channel: &str, sequence: u64) -> Result<Vec<Value>> {
        let Some(connection) = &self.connection else {
            return Ok(Vec::new());
        };
        let mut conn = connection.clone();
        let raw: Vec<String> = conn.lrange(Self::key(channel), 0, -1).await?;
        Ok(filter_since(&raw, sequence))
    }
}

/// Parse buffered entries and keep those newer than the cursor, sorted by
/// sequence. Entries without a numeric `sequence` (or unparsable ones) are
/// skipped.
fn filter_since(raw: &[String], sequence: u64) -> Vec<Value> {
    let mut matched: Vec<(u64, Value)> = raw
        .iter()
        .filter_map(|s| serde_json::from_str::<Value>(s).ok())
        .filter_map(|v| {
            v.get("sequence")
                .and_then(Value::as_u64)
                .map(|seq| (seq, v))
        })
        .filter(|(seq, _)| *seq > sequence)
        .collect();
    matched.sort_by_key(|(seq, _)| *seq);
    matched.into_iter().map(|(_, v)| v).collect()
}
