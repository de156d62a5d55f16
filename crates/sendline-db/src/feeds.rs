//! Feed fan-out repository implementation.
//!
//! Feed items are fanned out at write time: one row per follower, inserted
//! with a single INSERT…SELECT so the fan-out is atomic per event. Feed
//! handlers must be idempotent under redelivery, so duplicates within a
//! single event are avoided by keying on the follower scan rather than
//! application-side loops.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use tracing::debug;

use sendline_core::{FeedRepository, Result};

/// PostgreSQL implementation of [`FeedRepository`].
#[derive(Clone)]
pub struct PgFeedRepository {
    pool: Pool<Postgres>,
}

impl PgFeedRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn fanout(
        &self,
        actor_id: &str,
        item_type: &str,
        entity_id: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "INSERT INTO feed_items (user_id, actor_id, item_type, entity_id, created_at)
             SELECT f.follower_id, $1, $2, $3, $4
             FROM follows f
             WHERE f.followee_id = $1
             ON CONFLICT (user_id, item_type, entity_id) DO NOTHING",
        )
        .bind(actor_id)
        .bind(item_type)
        .bind(entity_id)
        .bind(occurred_at)
        .execute(&self.pool)
        .await?;

        let written = result.rows_affected();
        debug!(
            subsystem = "db",
            component = "feeds",
            op = "fanout",
            item_type,
            entity_id,
            rows = written,
            "Fanned out feed items"
        );
        Ok(written)
    }
}

#[async_trait]
impl FeedRepository for PgFeedRepository {
    async fn fanout_ascent(
        &self,
        actor_id: &str,
        tick_uuid: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<u64> {
        self.fanout(actor_id, "ascent", tick_uuid, occurred_at).await
    }

    async fn fanout_new_climb(
        &self,
        actor_id: &str,
        climb_uuid: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<u64> {
        self.fanout(actor_id, "new_climb", climb_uuid, occurred_at)
            .await
    }
}
