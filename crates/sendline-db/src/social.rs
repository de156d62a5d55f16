//! Social graph and entity ownership lookups.
//!
//! Every lookup returns `Ok(None)` / `Ok(vec![])` for missing entities:
//! recipient resolution must degrade to "no notification" when the
//! referenced row has been deleted, not fail the pipeline.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use sendline_core::{ClimbSummary, ProposalInfo, Result, SocialGraphRepository};

/// PostgreSQL implementation of [`SocialGraphRepository`].
#[derive(Clone)]
pub struct PgSocialGraphRepository {
    pool: Pool<Postgres>,
}

impl PgSocialGraphRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn single_column(&self, sql: &str, bind: &str) -> Result<Option<String>> {
        let row = sqlx::query(sql).bind(bind).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| r.try_get(0)).transpose()?)
    }

    async fn id_list(&self, sql: &str, bind: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(sql).bind(bind).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|r| r.try_get(0).map_err(Into::into))
            .collect()
    }
}

#[async_trait]
impl SocialGraphRepository for PgSocialGraphRepository {
    async fn comment_author(&self, comment_uuid: &str) -> Result<Option<String>> {
        self.single_column("SELECT user_id FROM comments WHERE uuid = $1", comment_uuid)
            .await
    }

    async fn tick_owner(&self, tick_uuid: &str) -> Result<Option<String>> {
        self.single_column("SELECT user_id FROM ticks WHERE uuid = $1", tick_uuid)
            .await
    }

    async fn climb_setter(&self, climb_uuid: &str) -> Result<Option<String>> {
        self.single_column(
            "SELECT user_id FROM board_climbs WHERE uuid = $1",
            climb_uuid,
        )
        .await
    }

    async fn followers_of(&self, user_id: &str) -> Result<Vec<String>> {
        self.id_list(
            "SELECT follower_id FROM follows WHERE followee_id = $1",
            user_id,
        )
        .await
    }

    async fn layout_subscribers(&self, board_type: &str, layout_id: i32) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT user_id FROM layout_subscriptions
             WHERE board_type = $1 AND layout_id = $2",
        )
        .bind(board_type)
        .bind(layout_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| r.try_get(0).map_err(Into::into))
            .collect()
    }

    async fn proposal(&self, proposal_uuid: &str) -> Result<Option<ProposalInfo>> {
        let row = sqlx::query(
            "SELECT user_id, climb_uuid, board_type
             FROM climb_proposals WHERE uuid = $1",
        )
        .bind(proposal_uuid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(|r| -> Result<ProposalInfo> {
                Ok(ProposalInfo {
                    proposer_id: r.try_get("user_id")?,
                    climb_uuid: r.try_get("climb_uuid")?,
                    board_type: r.try_get("board_type")?,
                })
            })
            .transpose()?)
    }

    async fn proposal_upvoters(&self, proposal_uuid: &str) -> Result<Vec<String>> {
        self.id_list(
            "SELECT user_id FROM proposal_votes WHERE proposal_uuid = $1 AND vote > 0",
            proposal_uuid,
        )
        .await
    }

    async fn climb_summary(&self, climb_uuid: &str) -> Result<Option<ClimbSummary>> {
        let row = sqlx::query(
            "SELECT
                c.uuid, c.name, c.board_type, c.layout_id, c.angle, c.frames,
                c.difficulty_name, c.created_at,
                COALESCE(p.display_name, u.name) AS setter_display_name,
                COALESCE(p.avatar_url, u.image)  AS setter_avatar_url
             FROM board_climbs c
             LEFT JOIN users u ON u.id = c.user_id
             LEFT JOIN user_profiles p ON p.user_id = u.id
             WHERE c.uuid = $1",
        )
        .bind(climb_uuid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(|r| -> Result<ClimbSummary> {
                Ok(ClimbSummary {
                    uuid: r.try_get("uuid")?,
                    name: r.try_get("name")?,
                    board_type: r.try_get("board_type")?,
                    layout_id: r.try_get("layout_id")?,
                    setter_display_name: r.try_get("setter_display_name")?,
                    setter_avatar_url: r.try_get("setter_avatar_url")?,
                    angle: r.try_get("angle")?,
                    frames: r.try_get("frames")?,
                    difficulty_name: r.try_get("difficulty_name")?,
                    created_at: r.try_get("created_at")?,
                })
            })
            .transpose()?)
    }

    async fn comment_preview(
        &self,
        comment_uuid: &str,
        max_len: usize,
    ) -> Result<Option<String>> {
        let body = self
            .single_column("SELECT body FROM comments WHERE uuid = $1", comment_uuid)
            .await?;

        Ok(body.map(|b| {
            if b.chars().count() > max_len {
                let truncated: String = b.chars().take(max_len).collect();
                format!("{truncated}...")
            } else {
                b
            }
        }))
    }
}
