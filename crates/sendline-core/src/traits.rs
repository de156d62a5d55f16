//! Repository traits for persistence and social-graph lookups.
//!
//! These traits are the seams between the event distribution core and the
//! relational store. The `sendline-db` crate provides PostgreSQL
//! implementations; tests substitute in-memory fakes.
//!
//! Lookup methods degrade to `Ok(None)` / `Ok(vec![])` when the referenced
//! entity does not exist — a missing entity means "no notification", never a
//! pipeline failure. Infrastructure errors still propagate as `Err`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    ClimbSummary, CreateNotificationRequest, DisplayProfile, Notification, NotificationType,
};

/// Proposal context needed by recipient resolution and enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalInfo {
    /// User who opened the proposal.
    pub proposer_id: String,
    /// Climb the proposal targets.
    pub climb_uuid: String,
    /// Board the climb belongs to.
    pub board_type: String,
}

/// Repository for persisted notifications.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Insert a new notification row.
    async fn insert(&self, req: CreateNotificationRequest) -> Result<()>;

    /// Dedup probe: does a notification with the same
    /// `(actor, recipient, type, entity)` exist within the last
    /// `since_minutes`?
    async fn exists_recent(
        &self,
        actor_id: &str,
        recipient_id: &str,
        notification_type: NotificationType,
        entity_id: &str,
        since_minutes: i64,
    ) -> Result<bool>;

    /// Mark specific notifications as read. Returns the number updated.
    async fn mark_read(&self, recipient_id: &str, uuids: &[Uuid]) -> Result<u64>;

    /// Mark all of a recipient's unread notifications as read.
    async fn mark_all_read(&self, recipient_id: &str) -> Result<u64>;

    /// List a recipient's notifications, newest first.
    async fn list_for_recipient(
        &self,
        recipient_id: &str,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>>;

    /// Count a recipient's unread notifications.
    async fn unread_count(&self, recipient_id: &str) -> Result<i64>;

    /// Resolve a comment's internal row ID from its public UUID.
    async fn comment_id_for_uuid(&self, comment_uuid: &str) -> Result<Option<i64>>;
}

/// Repository for lightweight user display profiles.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Fetch the display profile for a user. `None` if the user is unknown.
    async fn fetch_display_profile(&self, user_id: &str) -> Result<Option<DisplayProfile>>;
}

/// Read-only social graph and entity ownership lookups used by recipient
/// resolution and enrichment.
#[async_trait]
pub trait SocialGraphRepository: Send + Sync {
    /// Author of a comment, by public UUID.
    async fn comment_author(&self, comment_uuid: &str) -> Result<Option<String>>;

    /// Owner of a tick (logged ascent), by public UUID.
    async fn tick_owner(&self, tick_uuid: &str) -> Result<Option<String>>;

    /// Setter of a climb, by public UUID.
    async fn climb_setter(&self, climb_uuid: &str) -> Result<Option<String>>;

    /// Users following the given user.
    async fn followers_of(&self, user_id: &str) -> Result<Vec<String>>;

    /// Users subscribed to new climbs on a board layout.
    async fn layout_subscribers(&self, board_type: &str, layout_id: i32) -> Result<Vec<String>>;

    /// Proposal context, by public UUID.
    async fn proposal(&self, proposal_uuid: &str) -> Result<Option<ProposalInfo>>;

    /// Users who cast an upvote on a proposal.
    async fn proposal_upvoters(&self, proposal_uuid: &str) -> Result<Vec<String>>;

    /// Denormalized climb summary for realtime publication.
    async fn climb_summary(&self, climb_uuid: &str) -> Result<Option<ClimbSummary>>;

    /// Truncated comment body for live-push enrichment.
    async fn comment_preview(&self, comment_uuid: &str, max_len: usize)
        -> Result<Option<String>>;
}

/// Repository for per-follower feed fan-out.
///
/// Feed items are write-fanned at event time so feed reads stay a single
/// indexed scan per user.
#[async_trait]
pub trait FeedRepository: Send + Sync {
    /// Fan a logged ascent out into each follower's feed.
    /// Returns the number of feed rows written.
    async fn fanout_ascent(
        &self,
        actor_id: &str,
        tick_uuid: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<u64>;

    /// Fan a newly created climb out into each follower's feed.
    /// Returns the number of feed rows written.
    async fn fanout_new_climb(
        &self,
        actor_id: &str,
        climb_uuid: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<u64>;
}
