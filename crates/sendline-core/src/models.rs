//! Notification data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::events::SocialEntityType;

/// Notification classification, one per distinct user-facing cause.
///
/// The database stores the snake_case wire name (see [`Self::as_str`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// Someone commented on your tick.
    TickComment,
    /// Someone commented on your climb.
    ClimbComment,
    /// Someone replied to your comment.
    CommentReply,
    /// Someone voted on your tick or comment.
    Vote,
    /// Someone followed you.
    Follow,
    /// Someone you follow published a climb.
    NewClimb,
    /// A climb was published on a layout you subscribe to.
    NewClimbGlobal,
    /// A proposal was opened against your climb.
    ProposalCreated,
    /// Someone voted on your proposal.
    ProposalVote,
    /// Your proposal (or one you upvoted) was approved.
    ProposalApproved,
    /// Your proposal was rejected.
    ProposalRejected,
}

impl NotificationType {
    /// Returns the database/wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::TickComment => "tick_comment",
            NotificationType::ClimbComment => "climb_comment",
            NotificationType::CommentReply => "comment_reply",
            NotificationType::Vote => "vote",
            NotificationType::Follow => "follow",
            NotificationType::NewClimb => "new_climb",
            NotificationType::NewClimbGlobal => "new_climb_global",
            NotificationType::ProposalCreated => "proposal_created",
            NotificationType::ProposalVote => "proposal_vote",
            NotificationType::ProposalApproved => "proposal_approved",
            NotificationType::ProposalRejected => "proposal_rejected",
        }
    }

    /// Parse a database/wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tick_comment" => Some(NotificationType::TickComment),
            "climb_comment" => Some(NotificationType::ClimbComment),
            "comment_reply" => Some(NotificationType::CommentReply),
            "vote" => Some(NotificationType::Vote),
            "follow" => Some(NotificationType::Follow),
            "new_climb" => Some(NotificationType::NewClimb),
            "new_climb_global" => Some(NotificationType::NewClimbGlobal),
            "proposal_created" => Some(NotificationType::ProposalCreated),
            "proposal_vote" => Some(NotificationType::ProposalVote),
            "proposal_approved" => Some(NotificationType::ProposalApproved),
            "proposal_rejected" => Some(NotificationType::ProposalRejected),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted notification row.
///
/// Created once by the notification worker (or the degraded inline path)
/// after recipient resolution and the dedup check pass. Mutated only by
/// read-state transitions; never physically deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Public identifier.
    pub uuid: Uuid,
    /// User receiving the notification.
    pub recipient_id: String,
    /// User whose action caused it.
    pub actor_id: String,
    /// Classification.
    pub notification_type: NotificationType,
    /// Referenced entity kind, if any (follows carry none).
    pub entity_type: Option<SocialEntityType>,
    /// Referenced entity ID.
    pub entity_id: String,
    /// Internal comment row ID, for comment-derived notifications.
    pub comment_id: Option<i64>,
    /// When the recipient read it; `None` while unread.
    pub read_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Parameters for inserting a new notification row.
#[derive(Debug, Clone)]
pub struct CreateNotificationRequest {
    pub uuid: Uuid,
    pub recipient_id: String,
    pub actor_id: String,
    pub notification_type: NotificationType,
    pub entity_type: Option<SocialEntityType>,
    pub entity_id: String,
    pub comment_id: Option<i64>,
}

/// A resolved `(recipient, classification)` pair produced by recipient
/// resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub recipient_id: String,
    pub notification_type: NotificationType,
}

impl Recipient {
    pub fn new(recipient_id: impl Into<String>, notification_type: NotificationType) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            notification_type,
        }
    }
}

/// Lightweight actor display profile used to enrich live pushes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayProfile {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Notification payload pushed on the recipient's live channel.
///
/// Carries enough denormalized context (actor profile, comment preview,
/// climb summary) that clients can render without a follow-up query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedNotification {
    pub uuid: Uuid,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub actor_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_avatar_url: Option<String>,
    pub entity_type: Option<SocialEntityType>,
    pub entity_id: String,
    /// Truncated comment body, for comment-derived notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub climb_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub climb_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal_uuid: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Summary of a climb published on a layout channel alongside notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClimbSummary {
    pub uuid: String,
    pub name: Option<String>,
    pub board_type: String,
    pub layout_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setter_display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setter_avatar_url: Option<String>,
    pub angle: Option<i32>,
    pub frames: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty_name: Option<String>,
    pub created_at: DateTime<Utc>,
}
