//! Durable event broker over a Redis stream with consumer-group semantics.
//!
//! Producers append domain events with an approximate length cap; a shared
//! consumer group spreads entries across worker instances. Delivery is
//! at-least-once: an entry is acknowledged only after its handler returns
//! `Ok`, and entries left pending by a crashed consumer are reclaimed once
//! their idle time passes the claim threshold.
//!
//! Unparsable entries are acknowledged and dropped — redelivering them can
//! never succeed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamAutoClaimReply, StreamId, StreamReadReply};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use sendline_core::{defaults, DomainEvent, Error, Result};

/// Initial consumer-loop backoff after an error, doubled up to
/// [`defaults::EVENT_MAX_BACKOFF_MS`].
const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Redis stream key holding domain events.
    pub stream_key: String,
    /// Consumer group shared by worker instances.
    pub consumer_group: String,
    /// Max entries fetched per blocking read.
    pub batch_size: usize,
    /// Blocking read timeout in milliseconds.
    pub block_ms: u64,
    /// Idle threshold after which a pending entry is reclaimed.
    pub claim_idle_ms: u64,
    /// Max entries reclaimed per auto-claim pass.
    pub claim_batch_size: usize,
    /// Approximate stream length cap (`MAXLEN ~`).
    pub max_stream_len: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            stream_key: defaults::EVENT_STREAM_KEY.to_string(),
            consumer_group: defaults::EVENT_CONSUMER_GROUP.to_string(),
            batch_size: defaults::EVENT_BATCH_SIZE,
            block_ms: defaults::EVENT_BLOCK_MS,
            claim_idle_ms: defaults::EVENT_CLAIM_IDLE_MS,
            claim_batch_size: defaults::EVENT_CLAIM_BATCH_SIZE,
            max_stream_len: defaults::EVENT_MAX_STREAM_LEN,
        }
    }
}

impl BrokerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `EVENT_STREAM_KEY` | `sendline:events` | Stream key |
    /// | `EVENT_CONSUMER_GROUP` | `notification-workers` | Consumer group |
    /// | `EVENT_BATCH_SIZE` | `50` | Entries per blocking read |
    /// | `EVENT_BLOCK_MS` | `5000` | Blocking read timeout |
    /// | `EVENT_CLAIM_IDLE_MS` | `30000` | Reclaim idle threshold |
    /// | `EVENT_CLAIM_BATCH_SIZE` | `10` | Entries per auto-claim pass |
    /// | `EVENT_MAX_STREAM_LEN` | `10000` | Approximate stream cap |
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            stream_key: std::env::var("EVENT_STREAM_KEY").unwrap_or(base.stream_key),
            consumer_group: std::env::var("EVENT_CONSUMER_GROUP").unwrap_or(base.consumer_group),
            batch_size: env_parse("EVENT_BATCH_SIZE", base.batch_size).max(1),
            block_ms: env_parse("EVENT_BLOCK_MS", base.block_ms),
            claim_idle_ms: env_parse("EVENT_CLAIM_IDLE_MS", base.claim_idle_ms),
            claim_batch_size: env_parse("EVENT_CLAIM_BATCH_SIZE", base.claim_batch_size).max(1),
            max_stream_len: env_parse("EVENT_MAX_STREAM_LEN", base.max_stream_len).max(1),
        }
    }

    /// Set the stream key.
    pub fn with_stream_key(mut self, key: impl Into<String>) -> Self {
        self.stream_key = key.into();
        self
    }

    /// Set the consumer group name.
    pub fn with_consumer_group(mut self, group: impl Into<String>) -> Self {
        self.consumer_group = group.into();
        self
    }

    /// Set the blocking-read batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the blocking read timeout.
    pub fn with_block_ms(mut self, ms: u64) -> Self {
        self.block_ms = ms;
        self
    }

    /// Set the reclaim idle threshold.
    pub fn with_claim_idle_ms(mut self, ms: u64) -> Self {
        self.claim_idle_ms = ms;
        self
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Handler invoked for each consumed domain event.
///
/// Returning `Err` leaves the entry unacknowledged; it is redelivered via
/// auto-claim, so handlers must be idempotent or dedup-guarded.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent) -> Result<()>;
}

/// Handle for controlling a running consumer loop.
pub struct BrokerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl BrokerHandle {
    /// Signal the consumer to shut down gracefully. The loop exits after
    /// the current blocking read returns.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }
}

/// Durable event broker.
///
/// Holds a publisher connection for non-blocking commands (XADD, XACK,
/// XGROUP) and a separate consumer connection for blocking reads, so a
/// 5-second XREADGROUP never stalls a publish.
pub struct EventBroker {
    config: BrokerConfig,
    publisher: RwLock<Option<ConnectionManager>>,
    consumer: Mutex<Option<ConnectionManager>>,
    consumer_name: String,
}

impl EventBroker {
    /// A broker with no backing stream. `publish` becomes a logged no-op
    /// and `start_consumer` refuses to start; callers fall back to inline
    /// dispatch.
    pub fn disabled(config: BrokerConfig) -> Self {
        Self {
            config,
            publisher: RwLock::new(None),
            consumer: Mutex::new(None),
            consumer_name: Self::generate_consumer_name(),
        }
    }

    /// Connect to Redis and ensure the consumer group exists on the stream
    /// (created with `MKSTREAM` if absent; a pre-existing group is fine).
    pub async fn connect(redis_url: &str, config: BrokerConfig) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Config(format!("invalid Redis URL: {e}")))?;
        let publisher = ConnectionManager::new(client.clone()).await?;
        let consumer = ConnectionManager::new(client).await?;

        let broker = Self {
            config,
            publisher: RwLock::new(Some(publisher)),
            consumer: Mutex::new(Some(consumer)),
            consumer_name: Self::generate_consumer_name(),
        };
        broker.ensure_group().await?;
        info!(
            subsystem = "broker",
            stream = %broker.config.stream_key,
            group = %broker.config.consumer_group,
            instance_id = %broker.consumer_name,
            "Event broker connected"
        );
        Ok(broker)
    }

    fn generate_consumer_name() -> String {
        let id = Uuid::new_v4().simple().to_string();
        format!("instance-{}", &id[..8])
    }

    /// This process's consumer name within the group.
    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Whether a backing stream is configured.
    pub async fn is_initialized(&self) -> bool {
        self.publisher.read().await.is_some()
    }

    async fn ensure_group(&self) -> Result<()> {
        let Some(conn) = self.publisher.read().await.clone() else {
            return Ok(());
        };
        let mut conn = conn;
        let created: std::result::Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_key)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match created {
            Ok(()) => Ok(()),
            // Group already exists: another instance won the race.
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Append a domain event to the stream, trimming approximately to the
    /// configured cap. A logged no-op when uninitialized.
    ///
    /// Best-effort: an append failure is logged and swallowed. The business
    /// write that emitted the event has already committed, so a broker
    /// outage must not surface to that caller.
    pub async fn publish(&self, event: &DomainEvent) -> Result<()> {
        let Some(conn) = self.publisher.read().await.clone() else {
            debug!(
                subsystem = "broker",
                event_type = %event.event_type,
                "Broker uninitialized, dropping publish"
            );
            return Ok(());
        };
        let mut conn = conn;

        match self.append(&mut conn, event).await {
            Ok(entry_id) => debug!(
                subsystem = "broker",
                op = "publish",
                event_type = %event.event_type,
                entity_id = %event.entity_id,
                entry_id = %entry_id,
                "Event appended"
            ),
            Err(e) => error!(
                subsystem = "broker",
                op = "publish",
                event_type = %event.event_type,
                entity_id = %event.entity_id,
                error = %e,
                "Event append failed, dropping event"
            ),
        }
        Ok(())
    }

    async fn append(&self, conn: &mut ConnectionManager, event: &DomainEvent) -> Result<String> {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.config.stream_key)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.config.max_stream_len)
            .arg("*");
        for (field, value) in event.to_field_pairs() {
            cmd.arg(field).arg(value);
        }
        Ok(cmd.query_async(conn).await?)
    }

    /// Start the consumer loop feeding `handler`. Errors if the broker is
    /// uninitialized or a consumer is already running.
    pub async fn start_consumer(
        self: &Arc<Self>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<BrokerHandle> {
        if !self.is_initialized().await {
            return Err(Error::Config(
                "cannot start consumer: broker has no backing stream".into(),
            ));
        }
        let connection = self
            .consumer
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::Internal("consumer loop already started".into()))?;

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let broker = Arc::clone(self);
        tokio::spawn(async move {
            broker.run(connection, handler, &mut shutdown_rx).await;
        });

        Ok(BrokerHandle { shutdown_tx })
    }

    async fn run(
        &self,
        mut conn: ConnectionManager,
        handler: Arc<dyn EventHandler>,
        shutdown_rx: &mut mpsc::Receiver<()>,
    ) {
        info!(
            subsystem = "broker",
            component = "consumer_loop",
            instance_id = %self.consumer_name,
            batch_size = self.config.batch_size,
            "Consumer loop started"
        );

        let mut backoff_ms = INITIAL_BACKOFF_MS;
        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            let pass = async {
                self.claim_stale(&mut conn, handler.as_ref()).await?;
                self.read_new(&mut conn, handler.as_ref()).await
            };

            let outcome = tokio::select! {
                _ = shutdown_rx.recv() => None,
                result = pass => Some(result),
            };
            match outcome {
                None => break,
                Some(Ok(())) => backoff_ms = INITIAL_BACKOFF_MS,
                Some(Err(e)) => {
                    error!(
                        subsystem = "broker",
                        component = "consumer_loop",
                        error = %e,
                        backoff_ms,
                        "Consumer pass failed, backing off"
                    );
                    let interrupted = tokio::select! {
                        _ = shutdown_rx.recv() => true,
                        _ = sleep(Duration::from_millis(backoff_ms)) => false,
                    };
                    if interrupted {
                        break;
                    }
                    backoff_ms = (backoff_ms * 2).min(defaults::EVENT_MAX_BACKOFF_MS);
                }
            }
        }

        info!(
            subsystem = "broker",
            component = "consumer_loop",
            instance_id = %self.consumer_name,
            "Consumer loop stopped"
        );
    }

    /// Reclaim entries another consumer left pending past the idle
    /// threshold and run them through the handler.
    async fn claim_stale(
        &self,
        conn: &mut ConnectionManager,
        handler: &dyn EventHandler,
    ) -> Result<()> {
        let reply: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream_key)
            .arg(&self.config.consumer_group)
            .arg(&self.consumer_name)
            .arg(self.config.claim_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(self.config.claim_batch_size)
            .query_async(conn)
            .await?;

        if !reply.claimed.is_empty() {
            warn!(
                subsystem = "broker",
                component = "consumer_loop",
                batch_count = reply.claimed.len(),
                "Reclaimed stale pending entries"
            );
        }
        for entry in &reply.claimed {
            self.process_entry(conn, handler, entry).await?;
        }
        Ok(())
    }

    /// Blocking read of new entries for this consumer.
    async fn read_new(
        &self,
        conn: &mut ConnectionManager,
        handler: &dyn EventHandler,
    ) -> Result<()> {
        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.consumer_name)
            .arg("COUNT")
            .arg(self.config.batch_size)
            .arg("BLOCK")
            .arg(self.config.block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_key)
            .arg(">")
            .query_async(conn)
            .await?;

        let Some(reply) = reply else {
            return Ok(());
        };
        for key in &reply.keys {
            for entry in &key.ids {
                self.process_entry(conn, handler, entry).await?;
            }
        }
        Ok(())
    }

    /// Decode and handle one entry. Parse failures are acknowledged and
    /// dropped; handler failures leave the entry pending for reclaim.
    /// Returns `Err` only for Redis-level failures (the ack itself).
    async fn process_entry(
        &self,
        conn: &mut ConnectionManager,
        handler: &dyn EventHandler,
        entry: &StreamId,
    ) -> Result<()> {
        let Some(event) = decode_entry(entry) else {
            warn!(
                subsystem = "broker",
                component = "consumer_loop",
                entry_id = %entry.id,
                "Unparsable stream entry, acknowledging and dropping"
            );
            self.ack(conn, &entry.id).await?;
            return Ok(());
        };

        match handler.handle(&event).await {
            Ok(()) => {
                self.ack(conn, &entry.id).await?;
                debug!(
                    subsystem = "broker",
                    component = "consumer_loop",
                    entry_id = %entry.id,
                    event_type = %event.event_type,
                    "Entry processed and acknowledged"
                );
            }
            Err(e) => {
                // Left pending on purpose: the entry is redelivered once it
                // passes the claim idle threshold.
                error!(
                    subsystem = "broker",
                    component = "consumer_loop",
                    entry_id = %entry.id,
                    event_type = %event.event_type,
                    error = %e,
                    "Handler failed, leaving entry pending"
                );
            }
        }
        Ok(())
    }

    async fn ack(&self, conn: &mut ConnectionManager, entry_id: &str) -> Result<()> {
        let _: i64 = redis::cmd("XACK")
            .arg(&self.config.stream_key)
            .arg(&self.config.consumer_group)
            .arg(entry_id)
            .query_async(conn)
            .await?;
        Ok(())
    }
}

/// Decode a stream entry's field map into a domain event. `None` marks the
/// entry unparsable (acknowledge and drop).
fn decode_entry(entry: &StreamId) -> Option<DomainEvent> {
    let mut pairs: Vec<(String, String)> = Vec::with_capacity(entry.map.len());
    for (field, value) in &entry.map {
        let text: String = redis::from_redis_value(value).ok()?;
        pairs.push((field.clone(), text));
    }
    DomainEvent::from_field_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = BrokerConfig::default();
        assert_eq!(config.stream_key, "sendline:events");
        assert_eq!(config.consumer_group, "notification-workers");
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.block_ms, 5_000);
        assert_eq!(config.claim_idle_ms, 30_000);
        assert_eq!(config.max_stream_len, 10_000);
    }

    #[test]
    fn test_config_builders() {
        let config = BrokerConfig::default()
            .with_stream_key("test:events")
            .with_consumer_group("test-group")
            .with_batch_size(0)
            .with_block_ms(100)
            .with_claim_idle_ms(50);
        assert_eq!(config.stream_key, "test:events");
        assert_eq!(config.consumer_group, "test-group");
        // Batch size is clamped to at least one.
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.block_ms, 100);
        assert_eq!(config.claim_idle_ms, 50);
    }

    #[test]
    fn test_consumer_name_format() {
        let name = EventBroker::generate_consumer_name();
        assert!(name.starts_with("instance-"));
        assert_eq!(name.len(), "instance-".len() + 8);
    }

    #[tokio::test]
    async fn test_disabled_broker_drops_publish_and_refuses_consumer() {
        let broker = Arc::new(EventBroker::disabled(BrokerConfig::default()));
        assert!(!broker.is_initialized().await);

        let event = DomainEvent::new(
            sendline_core::EventType::FollowCreated,
            "user-a",
            sendline_core::SocialEntityType::User,
            "user-b",
        );
        broker.publish(&event).await.unwrap();

        struct Noop;
        #[async_trait]
        impl EventHandler for Noop {
            async fn handle(&self, _event: &DomainEvent) -> Result<()> {
                Ok(())
            }
        }
        assert!(broker.start_consumer(Arc::new(Noop)).await.is_err());
    }

    // RESP commands start with `*<count>` on a line boundary; argument data
    // (like XADD's `*` entry ID) never does.
    fn count_commands(buf: &[u8]) -> usize {
        (0..buf.len())
            .filter(|&i| {
                buf[i] == b'*'
                    && buf.get(i + 1).is_some_and(u8::is_ascii_digit)
                    && (i == 0 || buf[..i].ends_with(b"\r\n"))
            })
            .count()
    }

    #[tokio::test]
    async fn test_publish_swallows_backend_outage() {
        use std::sync::Mutex;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        // A stand-in backend that answers +OK to every command, so connect()
        // and the XGROUP handshake succeed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let conns: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>> =
            Arc::new(Mutex::new(Vec::new()));
        let accept_conns = Arc::clone(&conns);
        let accept = tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                accept_conns.lock().unwrap().push(tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    loop {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                for _ in 0..count_commands(&buf[..n]) {
                                    if socket.write_all(b"+OK\r\n").await.is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                    }
                }));
            }
        });

        let broker = EventBroker::connect(&format!("redis://{addr}"), BrokerConfig::default())
            .await
            .unwrap();

        // Take the backend away: stop accepting and sever every connection.
        accept.abort();
        for task in conns.lock().unwrap().drain(..) {
            task.abort();
        }

        let event = DomainEvent::new(
            sendline_core::EventType::VoteCast,
            "user-a",
            sendline_core::SocialEntityType::Tick,
            "t-1",
        );
        // The outage is logged, never surfaced to the emitting caller.
        assert!(broker.publish(&event).await.is_ok());
    }
}
