//! # sendline-db
//!
//! PostgreSQL persistence layer for sendline.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for notifications, profiles, social-graph
//!   lookups, and feed fan-out
//! - SQL migrations for the tables the event core touches
//!
//! ## Example
//!
//! ```rust,ignore
//! use sendline_db::Database;
//! use sendline_core::NotificationRepository;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/sendline").await?;
//!     let count = db.notifications.unread_count("user-1").await?;
//!     println!("unread: {count}");
//!     Ok(())
//! }
//! ```

pub mod feeds;
pub mod notifications;
pub mod pool;
pub mod profiles;
pub mod social;

pub mod test_support;

// Re-export core types
pub use sendline_core::*;

// Re-export repository implementations
pub use feeds::PgFeedRepository;
pub use notifications::PgNotificationRepository;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use profiles::PgProfileRepository;
pub use social::PgSocialGraphRepository;

use std::sync::Arc;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Notification persistence and read-state transitions.
    pub notifications: Arc<PgNotificationRepository>,
    /// Display profile lookups for push enrichment.
    pub profiles: Arc<PgProfileRepository>,
    /// Social graph and entity ownership lookups.
    pub social: Arc<PgSocialGraphRepository>,
    /// Per-follower feed fan-out.
    pub feeds: Arc<PgFeedRepository>,
}

impl Database {
    /// Connect with default pool configuration.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with_config(database_url, PoolConfig::default()).await
    }

    /// Connect with custom pool configuration.
    pub async fn connect_with_config(database_url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(database_url, config).await?;
        Ok(Self::from_pool(pool))
    }

    /// Build the repository set over an existing pool.
    pub fn from_pool(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            notifications: Arc::new(PgNotificationRepository::new(pool.clone())),
            profiles: Arc::new(PgProfileRepository::new(pool.clone())),
            social: Arc::new(PgSocialGraphRepository::new(pool.clone())),
            feeds: Arc::new(PgFeedRepository::new(pool.clone())),
            pool,
        }
    }

    /// Run embedded migrations against the connected database.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("migration failed: {e}")))?;
        Ok(())
    }
}
