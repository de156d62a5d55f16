//! Integration tests against a live Redis instance.
//!
//! Run with: `cargo test -p sendline-events -- --ignored`

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use sendline_events::{
    BrokerConfig, ChannelKey, DomainEvent, Error, EventBroker, EventHandler, EventType,
    PubSubRouter, RedisRelay, ReplayBuffer, Result, SocialEntityType,
};

fn redis_url() -> String {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

struct Collector {
    events: Mutex<Vec<DomainEvent>>,
    fail_first: Mutex<bool>,
    failures: AtomicU32,
}

impl Collector {
    fn new(fail_first: bool) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            fail_first: Mutex::new(fail_first),
            failures: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl EventHandler for Collector {
    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        let mut fail_first = self.fail_first.lock().unwrap();
        if *fail_first {
            *fail_first = false;
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(Error::Internal("induced failure".into()));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

async fn wait_for<F: Fn() -> bool>(predicate: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
#[ignore = "requires redis"]
async fn test_broker_publish_consume_ack() {
    let config = BrokerConfig::default()
        .with_stream_key(unique("test:events"))
        .with_block_ms(200);
    let broker = Arc::new(EventBroker::connect(&redis_url(), config).await.unwrap());

    let collector = Collector::new(false);
    let handle = broker
        .start_consumer(Arc::clone(&collector) as _)
        .await
        .unwrap();

    let event = DomainEvent::new(
        EventType::FollowCreated,
        "user-a",
        SocialEntityType::User,
        "user-b",
    );
    broker.publish(&event).await.unwrap();

    assert!(
        wait_for(
            || !collector.events.lock().unwrap().is_empty(),
            Duration::from_secs(5)
        )
        .await
    );
    assert_eq!(collector.events.lock().unwrap()[0], event);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
#[ignore = "requires redis"]
async fn test_failed_entry_is_reclaimed_and_redelivered() {
    let config = BrokerConfig::default()
        .with_stream_key(unique("test:events"))
        .with_block_ms(200)
        .with_claim_idle_ms(500);
    let broker = Arc::new(EventBroker::connect(&redis_url(), config).await.unwrap());

    // First delivery fails and the entry is left pending; the auto-claim
    // pass redelivers it once the idle threshold passes.
    let collector = Collector::new(true);
    let handle = broker
        .start_consumer(Arc::clone(&collector) as _)
        .await
        .unwrap();

    let event = DomainEvent::new(
        EventType::VoteCast,
        "user-a",
        SocialEntityType::Tick,
        "t-1",
    );
    broker.publish(&event).await.unwrap();

    assert!(
        wait_for(
            || collector.failures.load(Ordering::SeqCst) > 0,
            Duration::from_secs(5)
        )
        .await,
        "first delivery never reached the handler"
    );

    // Well under the 500ms idle threshold the pending entry must not be
    // claimable yet.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(
        collector.events.lock().unwrap().is_empty(),
        "entry was redelivered before the idle threshold"
    );

    assert!(
        wait_for(
            || !collector.events.lock().unwrap().is_empty(),
            Duration::from_secs(10)
        )
        .await,
        "entry was never redelivered"
    );
    handle.shutdown().await.unwrap();
}

#[tokio::test]
#[ignore = "requires redis"]
async fn test_relay_carries_events_between_instances() {
    let url = redis_url();
    let (relay_a, inbox_a) = RedisRelay::connect_with_instance(&url, unique("inst-a"))
        .await
        .unwrap();
    let (relay_b, inbox_b) = RedisRelay::connect_with_instance(&url, unique("inst-b"))
        .await
        .unwrap();

    let router_a = PubSubRouter::clustered(relay_a, inbox_a, ReplayBuffer::disabled(), false);
    let router_b = PubSubRouter::clustered(relay_b, inbox_b, ReplayBuffer::disabled(), false);

    let key = ChannelKey::session(unique("s"));
    let received = Arc::new(Mutex::new(Vec::<serde_json::Value>::new()));
    let sink = Arc::clone(&received);
    let sub = router_b
        .subscribe(&key, move |event| sink.lock().unwrap().push(event))
        .await
        .unwrap();

    // Let the SUBSCRIBE reach the server before publishing.
    tokio::time::sleep(Duration::from_millis(200)).await;
    router_a.publish(&key, json!({"joined": "user-a"})).await.unwrap();

    assert!(
        wait_for(
            || !received.lock().unwrap().is_empty(),
            Duration::from_secs(5)
        )
        .await
    );
    assert_eq!(received.lock().unwrap()[0]["joined"], "user-a");
    sub.close().await;
}

#[tokio::test]
#[ignore = "requires redis"]
async fn test_replay_buffer_delta_resync() {
    let buffer = ReplayBuffer::connect(&redis_url())
        .await
        .unwrap()
        .with_capacity(3);
    let channel = format!("sendline:queue:{}", unique("s"));

    for sequence in 1..=5u64 {
        buffer
            .append(&channel, &json!({"sequence": sequence}))
            .await
            .unwrap();
    }

    // Capacity 3 keeps sequences 3..=5; the cursor filters to 4..=5.
    let events = buffer.events_since(&channel, 3).await.unwrap();
    let seqs: Vec<u64> = events
        .iter()
        .map(|e| e["sequence"].as_u64().unwrap())
        .collect();
    assert_eq!(seqs, vec![4, 5]);

    let aged_out = buffer.events_since(&channel, 0).await.unwrap();
    assert_eq!(aged_out.len(), 3);
}
