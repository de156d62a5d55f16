//! User display profile repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use sendline_core::{DisplayProfile, ProfileRepository, Result};

/// PostgreSQL implementation of [`ProfileRepository`].
///
/// Falls back to the account's base name/image when no profile row exists,
/// matching what clients display elsewhere.
#[derive(Clone)]
pub struct PgProfileRepository {
    pool: Pool<Postgres>,
}

impl PgProfileRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileRepository for PgProfileRepository {
    async fn fetch_display_profile(&self, user_id: &str) -> Result<Option<DisplayProfile>> {
        let row = sqlx::query(
            "SELECT
                COALESCE(p.display_name, u.name) AS display_name,
                COALESCE(p.avatar_url, u.image)  AS avatar_url
             FROM users u
             LEFT JOIN user_profiles p ON p.user_id = u.id
             WHERE u.id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(|r| -> Result<DisplayProfile> {
                Ok(DisplayProfile {
                    display_name: r.try_get("display_name")?,
                    avatar_url: r.try_get("avatar_url")?,
                })
            })
            .transpose()?)
    }
}
