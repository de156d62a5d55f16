//! Domain event types and wire formats for the event distribution core.
//!
//! A [`DomainEvent`] is emitted by a business operation once its write
//! commits. It travels either through the durable Redis stream (flat
//! key/value field list, see [`DomainEvent::to_field_pairs`]) or through the
//! cross-instance relay (JSON [`RelayEnvelope`]).
//!
//! Invariants:
//! - metadata values are always strings (wire-safe)
//! - events are immutable once created and are not retained beyond the
//!   broker's trim window
//! - `timestamp` carries no ordering guarantee across actors or processes

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of supported domain event types.
///
/// The dot-namespaced names are the wire representation on the durable
/// stream and drive recipient resolution in the notification worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A top-level comment was created on an entity.
    CommentCreated,
    /// A reply to an existing comment was created.
    CommentReply,
    /// A vote was cast on a tick or comment.
    VoteCast,
    /// A user started following another user.
    FollowCreated,
    /// A new climb was published.
    ClimbCreated,
    /// An ascent (tick) was logged. Feed-only: produces no notification row.
    AscentLogged,
    /// A climb edit proposal was created.
    ProposalCreated,
    /// A vote was cast on a proposal.
    ProposalVoted,
    /// A proposal was approved.
    ProposalApproved,
    /// A proposal was rejected.
    ProposalRejected,
}

impl EventType {
    /// Returns the namespaced wire name (e.g. `"comment.created"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CommentCreated => "comment.created",
            EventType::CommentReply => "comment.reply",
            EventType::VoteCast => "vote.cast",
            EventType::FollowCreated => "follow.created",
            EventType::ClimbCreated => "climb.created",
            EventType::AscentLogged => "ascent.logged",
            EventType::ProposalCreated => "proposal.created",
            EventType::ProposalVoted => "proposal.voted",
            EventType::ProposalApproved => "proposal.approved",
            EventType::ProposalRejected => "proposal.rejected",
        }
    }

    /// Parse a wire name back into an event type.
    ///
    /// Returns `None` for anything outside the closed set — callers treat
    /// that as an unparsable entry (ack and drop).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "comment.created" => Some(EventType::CommentCreated),
            "comment.reply" => Some(EventType::CommentReply),
            "vote.cast" => Some(EventType::VoteCast),
            "follow.created" => Some(EventType::FollowCreated),
            "climb.created" => Some(EventType::ClimbCreated),
            "ascent.logged" => Some(EventType::AscentLogged),
            "proposal.created" => Some(EventType::ProposalCreated),
            "proposal.voted" => Some(EventType::ProposalVoted),
            "proposal.approved" => Some(EventType::ProposalApproved),
            "proposal.rejected" => Some(EventType::ProposalRejected),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity kinds a domain event (or notification) can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialEntityType {
    /// A logged ascent.
    Tick,
    /// A comment on an entity.
    Comment,
    /// A published climb.
    Climb,
    /// A climb edit proposal.
    Proposal,
    /// A user (follow events).
    User,
}

impl SocialEntityType {
    /// Returns the wire/database name for the entity type.
    pub fn as_str(&self) -> &'static str {
        match self {
            SocialEntityType::Tick => "tick",
            SocialEntityType::Comment => "comment",
            SocialEntityType::Climb => "climb",
            SocialEntityType::Proposal => "proposal",
            SocialEntityType::User => "user",
        }
    }

    /// Parse a wire name back into an entity type.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tick" => Some(SocialEntityType::Tick),
            "comment" => Some(SocialEntityType::Comment),
            "climb" => Some(SocialEntityType::Climb),
            "proposal" => Some(SocialEntityType::Proposal),
            "user" => Some(SocialEntityType::User),
            _ => None,
        }
    }
}

impl fmt::Display for SocialEntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A social interaction event, created by a business operation at commit
/// time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Event type (closed set).
    pub event_type: EventType,
    /// User ID of the actor who caused the event.
    pub actor_id: String,
    /// Kind of entity the event references.
    pub entity_type: SocialEntityType,
    /// ID of the referenced entity.
    pub entity_id: String,
    /// Emission time, epoch milliseconds. No cross-process ordering guarantee.
    pub timestamp: i64,
    /// Extra context. Values are always strings; the map is ordered so the
    /// wire encoding is deterministic.
    pub metadata: BTreeMap<String, String>,
}

impl DomainEvent {
    /// Create an event stamped with the current time.
    pub fn new(
        event_type: EventType,
        actor_id: impl Into<String>,
        entity_type: SocialEntityType,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            actor_id: actor_id.into(),
            entity_type,
            entity_id: entity_id.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry (builder style).
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Look up a metadata value.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Encode as the flat field list appended to the durable stream:
    /// `type`, `actorId`, `entityType`, `entityId`, `timestamp`
    /// (stringified milliseconds), `metadata` (JSON string map).
    pub fn to_field_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("type", self.event_type.as_str().to_string()),
            ("actorId", self.actor_id.clone()),
            ("entityType", self.entity_type.as_str().to_string()),
            ("entityId", self.entity_id.clone()),
            ("timestamp", self.timestamp.to_string()),
            (
                "metadata",
                serde_json::to_string(&self.metadata).unwrap_or_else(|_| "{}".to_string()),
            ),
        ]
    }

    /// Decode a stream entry's field pairs back into an event.
    ///
    /// Returns `None` when any required field is missing, the event type is
    /// outside the closed set, the timestamp is not an integer, or the
    /// metadata field is not valid JSON. Such entries are acknowledged and
    /// dropped by the consumer, never retried.
    pub fn from_field_pairs<'a, I>(pairs: I) -> Option<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut map: BTreeMap<&str, &str> = BTreeMap::new();
        for (k, v) in pairs {
            map.insert(k, v);
        }

        let event_type = EventType::parse(map.get("type")?)?;
        let actor_id = (*map.get("actorId")?).to_string();
        let entity_type = SocialEntityType::parse(map.get("entityType")?)?;
        let entity_id = (*map.get("entityId")?).to_string();
        let timestamp: i64 = map.get("timestamp")?.parse().ok()?;
        let metadata: BTreeMap<String, String> =
            serde_json::from_str(map.get("metadata").copied().unwrap_or("{}")).ok()?;

        Some(Self {
            event_type,
            actor_id,
            entity_type,
            entity_id,
            timestamp,
            metadata,
        })
    }
}

/// JSON envelope for cross-instance relay messages.
///
/// A receiving instance discards any message whose `instance_id` matches its
/// own — the originating process already delivered the event locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayEnvelope {
    /// Originating process instance identifier.
    #[serde(rename = "instanceId")]
    pub instance_id: String,
    /// The relayed event payload.
    pub event: serde_json::Value,
    /// Envelope creation time, epoch milliseconds.
    pub timestamp: i64,
}

impl RelayEnvelope {
    /// Wrap an event payload for relay from the given instance.
    pub fn new(instance_id: impl Into<String>, event: serde_json::Value) -> Self {
        Self {
            instance_id: instance_id.into(),
            event,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}
