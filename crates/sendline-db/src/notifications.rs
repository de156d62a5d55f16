//! Notification repository implementation.

use async_trait::async_trait;
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use sendline_core::{
    CreateNotificationRequest, Error, Notification, NotificationRepository, NotificationType,
    Result, SocialEntityType,
};

/// PostgreSQL implementation of [`NotificationRepository`].
#[derive(Clone)]
pub struct PgNotificationRepository {
    pool: Pool<Postgres>,
}

impl PgNotificationRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn map_row(row: &PgRow) -> Result<Notification> {
        let type_str: String = row.try_get("type")?;
        let notification_type = NotificationType::parse(&type_str).ok_or_else(|| {
            Error::Serialization(format!("unknown notification type: {type_str}"))
        })?;

        let entity_type = row
            .try_get::<Option<String>, _>("entity_type")?
            .as_deref()
            .and_then(SocialEntityType::parse);

        Ok(Notification {
            uuid: row.try_get("uuid")?,
            recipient_id: row.try_get("recipient_id")?,
            actor_id: row.try_get("actor_id")?,
            notification_type,
            entity_type,
            entity_id: row.try_get("entity_id")?,
            comment_id: row.try_get("comment_id")?,
            read_at: row.try_get("read_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn insert(&self, req: CreateNotificationRequest) -> Result<()> {
        sqlx::query(
            "INSERT INTO notifications
                (uuid, recipient_id, actor_id, type, entity_type, entity_id, comment_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(req.uuid)
        .bind(&req.recipient_id)
        .bind(&req.actor_id)
        .bind(req.notification_type.as_str())
        .bind(req.entity_type.map(|t| t.as_str()))
        .bind(&req.entity_id)
        .bind(req.comment_id)
        .execute(&self.pool)
        .await?;

        debug!(
            subsystem = "db",
            component = "notifications",
            op = "insert",
            recipient_id = %req.recipient_id,
            notification_type = %req.notification_type,
            "Inserted notification"
        );
        Ok(())
    }

    async fn exists_recent(
        &self,
        actor_id: &str,
        recipient_id: &str,
        notification_type: NotificationType,
        entity_id: &str,
        since_minutes: i64,
    ) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 AS hit FROM notifications
             WHERE actor_id = $1
               AND recipient_id = $2
               AND type = $3
               AND entity_id = $4
               AND created_at > NOW() - make_interval(mins => $5)
             LIMIT 1",
        )
        .bind(actor_id)
        .bind(recipient_id)
        .bind(notification_type.as_str())
        .bind(entity_id)
        .bind(since_minutes as i32)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn mark_read(&self, recipient_id: &str, uuids: &[Uuid]) -> Result<u64> {
        if uuids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "UPDATE notifications
             SET read_at = NOW()
             WHERE recipient_id = $1 AND uuid = ANY($2) AND read_at IS NULL",
        )
        .bind(recipient_id)
        .bind(uuids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn mark_all_read(&self, recipient_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications
             SET read_at = NOW()
             WHERE recipient_id = $1 AND read_at IS NULL",
        )
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_for_recipient(
        &self,
        recipient_id: &str,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>> {
        let sql = if unread_only {
            "SELECT uuid, recipient_id, actor_id, type, entity_type, entity_id,
                    comment_id, read_at, created_at
             FROM notifications
             WHERE recipient_id = $1 AND read_at IS NULL
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3"
        } else {
            "SELECT uuid, recipient_id, actor_id, type, entity_type, entity_id,
                    comment_id, read_at, created_at
             FROM notifications
             WHERE recipient_id = $1
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3"
        };

        let rows = sqlx::query(sql)
            .bind(recipient_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::map_row).collect()
    }

    async fn unread_count(&self, recipient_id: &str) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM notifications
             WHERE recipient_id = $1 AND read_at IS NULL",
        )
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("count")?)
    }

    async fn comment_id_for_uuid(&self, comment_uuid: &str) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT id FROM comments WHERE uuid = $1")
            .bind(comment_uuid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.try_get("id")).transpose()?)
    }
}
