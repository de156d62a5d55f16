//! Channel key conventions for the pub/sub router.
//!
//! A channel is a logical grouping key: queue and session channels are keyed
//! by session, the notification channel by recipient, comment threads by the
//! commented entity, and new-climb channels by board layout. The rendered
//! string is what travels over the relay and keys the local registry.

use std::fmt;

use sendline_core::SocialEntityType;

/// A typed channel key. Rendered form is stable wire format.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    /// Queue state for a board session. Queue channels are the only class
    /// backed by the replay buffer.
    Queue { session_id: String },
    /// Session membership and presence for a board session.
    Session { session_id: String },
    /// Per-user live notification pushes.
    Notifications { user_id: String },
    /// Live comment thread on an entity.
    CommentThread {
        entity_type: SocialEntityType,
        entity_id: String,
    },
    /// New climbs published on a board layout.
    NewClimb { board_type: String, layout_id: i32 },
}

impl ChannelKey {
    pub fn queue(session_id: impl Into<String>) -> Self {
        ChannelKey::Queue {
            session_id: session_id.into(),
        }
    }

    pub fn session(session_id: impl Into<String>) -> Self {
        ChannelKey::Session {
            session_id: session_id.into(),
        }
    }

    pub fn notifications(user_id: impl Into<String>) -> Self {
        ChannelKey::Notifications {
            user_id: user_id.into(),
        }
    }

    pub fn comment_thread(entity_type: SocialEntityType, entity_id: impl Into<String>) -> Self {
        ChannelKey::CommentThread {
            entity_type,
            entity_id: entity_id.into(),
        }
    }

    pub fn new_climb(board_type: impl Into<String>, layout_id: i32) -> Self {
        ChannelKey::NewClimb {
            board_type: board_type.into(),
            layout_id,
        }
    }

    /// Render the wire/registry name for this channel.
    pub fn render(&self) -> String {
        match self {
            ChannelKey::Queue { session_id } => format!("sendline:queue:{session_id}"),
            ChannelKey::Session { session_id } => format!("sendline:session:{session_id}"),
            ChannelKey::Notifications { user_id } => format!("sendline:notifications:{user_id}"),
            ChannelKey::CommentThread {
                entity_type,
                entity_id,
            } => format!("sendline:comments:{entity_type}:{entity_id}"),
            ChannelKey::NewClimb {
                board_type,
                layout_id,
            } => format!("sendline:climbs:{board_type}:{layout_id}"),
        }
    }

    /// Whether events on this channel are retained in the replay buffer.
    pub fn is_replayed(&self) -> bool {
        matches!(self, ChannelKey::Queue { .. })
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
