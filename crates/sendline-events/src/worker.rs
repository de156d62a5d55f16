//! Notification worker: consumes domain events, resolves recipients,
//! persists notification rows and pushes enriched payloads onto each
//! recipient's live channel.
//!
//! Processing is at-least-once. The guards making redelivery safe:
//! - self-notifications are skipped (actor == recipient)
//! - noisy types are suppressed by a `(actor, recipient, type, entity)`
//!   probe against recent rows (votes and proposal activity 60 min,
//!   follows 24 h); comment notifications are never deduped
//! - feed fan-out inserts are uniquely keyed, so re-running them is a no-op
//!
//! Resolver and persistence errors propagate (the stream entry stays
//! pending and is reclaimed); a live-push or realtime-enrichment failure
//! after a successful write is logged and swallowed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use sendline_core::{
    defaults, CreateNotificationRequest, DisplayProfile, DomainEvent, EnrichedNotification,
    EventType, FeedRepository, NotificationRepository, NotificationType, ProfileRepository,
    Recipient, Result, SocialGraphRepository,
};

use crate::broker::{BrokerHandle, EventBroker, EventHandler};
use crate::channel::ChannelKey;
use crate::pubsub::PubSubRouter;
use crate::resolver::{self, meta};

/// Worker tunables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Suppression window for repeat votes, in minutes.
    pub vote_dedup_minutes: i64,
    /// Suppression window for repeat follows, in minutes.
    pub follow_dedup_minutes: i64,
    /// Suppression window for repeat proposal activity, in minutes.
    pub proposal_dedup_minutes: i64,
    /// Max characters of comment body in a live push.
    pub comment_preview_length: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            vote_dedup_minutes: defaults::VOTE_DEDUP_MINUTES,
            follow_dedup_minutes: defaults::FOLLOW_DEDUP_MINUTES,
            proposal_dedup_minutes: defaults::PROPOSAL_DEDUP_MINUTES,
            comment_preview_length: defaults::COMMENT_PREVIEW_LENGTH,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `NOTIFY_VOTE_DEDUP_MINUTES` | `60` | Vote suppression window |
    /// | `NOTIFY_FOLLOW_DEDUP_MINUTES` | `1440` | Follow suppression window |
    /// | `NOTIFY_PROPOSAL_DEDUP_MINUTES` | `60` | Proposal suppression window |
    /// | `NOTIFY_COMMENT_PREVIEW_LENGTH` | `100` | Comment preview length |
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            vote_dedup_minutes: env_parse("NOTIFY_VOTE_DEDUP_MINUTES", base.vote_dedup_minutes),
            follow_dedup_minutes: env_parse(
                "NOTIFY_FOLLOW_DEDUP_MINUTES",
                base.follow_dedup_minutes,
            ),
            proposal_dedup_minutes: env_parse(
                "NOTIFY_PROPOSAL_DEDUP_MINUTES",
                base.proposal_dedup_minutes,
            ),
            comment_preview_length: env_parse(
                "NOTIFY_COMMENT_PREVIEW_LENGTH",
                base.comment_preview_length,
            ),
        }
    }

    /// Set the vote suppression window.
    pub fn with_vote_dedup_minutes(mut self, minutes: i64) -> Self {
        self.vote_dedup_minutes = minutes;
        self
    }

    /// Set the follow suppression window.
    pub fn with_follow_dedup_minutes(mut self, minutes: i64) -> Self {
        self.follow_dedup_minutes = minutes;
        self
    }

    /// Suppression window for a notification type, `None` when the type is
    /// never deduped.
    fn dedup_window(&self, notification_type: NotificationType) -> Option<i64> {
        match notification_type {
            NotificationType::Vote => Some(self.vote_dedup_minutes),
            NotificationType::Follow => Some(self.follow_dedup_minutes),
            NotificationType::ProposalVote | NotificationType::ProposalCreated => {
                Some(self.proposal_dedup_minutes)
            }
            // Comments and terminal proposal outcomes are always delivered;
            // new-climb notifications are already unique per climb.
            NotificationType::TickComment
            | NotificationType::ClimbComment
            | NotificationType::CommentReply
            | NotificationType::NewClimb
            | NotificationType::NewClimbGlobal
            | NotificationType::ProposalApproved
            | NotificationType::ProposalRejected => None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn event_time(event: &DomainEvent) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(event.timestamp)
        .single()
        .unwrap_or_else(Utc::now)
}

/// The notification worker.
pub struct NotificationWorker {
    notifications: Arc<dyn NotificationRepository>,
    profiles: Arc<dyn ProfileRepository>,
    social: Arc<dyn SocialGraphRepository>,
    feeds: Arc<dyn FeedRepository>,
    router: Arc<PubSubRouter>,
    config: WorkerConfig,
}

impl NotificationWorker {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        profiles: Arc<dyn ProfileRepository>,
        social: Arc<dyn SocialGraphRepository>,
        feeds: Arc<dyn FeedRepository>,
        router: Arc<PubSubRouter>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            notifications,
            profiles,
            social,
            feeds,
            router,
            config,
        }
    }

    /// Wire this worker as the broker's consumer handler.
    pub async fn start(self: &Arc<Self>, broker: &Arc<EventBroker>) -> Result<BrokerHandle> {
        broker
            .start_consumer(Arc::clone(self) as Arc<dyn EventHandler>)
            .await
    }

    /// Process one domain event end to end.
    ///
    /// An `Err` leaves the originating stream entry unacknowledged, so
    /// everything before the notification writes must be idempotent.
    pub async fn process_event(&self, event: &DomainEvent) -> Result<()> {
        let occurred_at = event_time(event);

        match event.event_type {
            EventType::AscentLogged => {
                let rows = self
                    .feeds
                    .fanout_ascent(&event.actor_id, &event.entity_id, occurred_at)
                    .await?;
                debug!(
                    subsystem = "worker",
                    event_type = %event.event_type,
                    entity_id = %event.entity_id,
                    rows,
                    "Ascent fanned out to follower feeds"
                );
                return Ok(());
            }
            EventType::ClimbCreated => {
                // Runs before the notification writes; the uniquely keyed
                // feed rows make a redelivered fan-out a no-op.
                let rows = self
                    .feeds
                    .fanout_new_climb(&event.actor_id, &event.entity_id, occurred_at)
                    .await?;
                debug!(
                    subsystem = "worker",
                    event_type = %event.event_type,
                    entity_id = %event.entity_id,
                    rows,
                    "New climb fanned out to follower feeds"
                );
            }
            _ => {}
        }

        let recipients = resolver::resolve_recipients(event, self.social.as_ref()).await?;
        debug!(
            subsystem = "worker",
            event_type = %event.event_type,
            entity_id = %event.entity_id,
            recipient_count = recipients.len(),
            "Recipients resolved"
        );

        for recipient in &recipients {
            if recipient.recipient_id == event.actor_id {
                continue;
            }
            if let Some(window) = self.config.dedup_window(recipient.notification_type) {
                let duplicate = self
                    .notifications
                    .exists_recent(
                        &event.actor_id,
                        &recipient.recipient_id,
                        recipient.notification_type,
                        &event.entity_id,
                        window,
                    )
                    .await?;
                if duplicate {
                    debug!(
                        subsystem = "worker",
                        recipient_id = %recipient.recipient_id,
                        event_type = %event.event_type,
                        "Suppressing duplicate notification"
                    );
                    continue;
                }
            }

            let comment_id = self.comment_row_id(event, recipient.notification_type).await?;
            let uuid = Uuid::new_v4();
            self.notifications
                .insert(CreateNotificationRequest {
                    uuid,
                    recipient_id: recipient.recipient_id.clone(),
                    actor_id: event.actor_id.clone(),
                    notification_type: recipient.notification_type,
                    entity_type: match event.event_type {
                        EventType::FollowCreated => None,
                        _ => Some(event.entity_type),
                    },
                    entity_id: event.entity_id.clone(),
                    comment_id,
                })
                .await?;

            // The write is committed; a push failure only costs liveness.
            if let Err(e) = self.push_live(event, recipient, uuid).await {
                warn!(
                    subsystem = "worker",
                    recipient_id = %recipient.recipient_id,
                    event_type = %event.event_type,
                    error = %e,
                    "Live push failed after persisted write"
                );
            }
        }

        if event.event_type == EventType::ClimbCreated {
            self.publish_climb_summary(event).await;
        }
        Ok(())
    }

    async fn comment_row_id(
        &self,
        event: &DomainEvent,
        notification_type: NotificationType,
    ) -> Result<Option<i64>> {
        let comment_typed = matches!(
            notification_type,
            NotificationType::TickComment
                | NotificationType::ClimbComment
                | NotificationType::CommentReply
        );
        if !comment_typed {
            return Ok(None);
        }
        match event.metadata_value(meta::COMMENT_UUID) {
            Some(comment_uuid) => self.notifications.comment_id_for_uuid(comment_uuid).await,
            None => Ok(None),
        }
    }

    /// Build the enriched payload and push it onto the recipient's live
    /// channel.
    async fn push_live(
        &self,
        event: &DomainEvent,
        recipient: &Recipient,
        uuid: Uuid,
    ) -> Result<()> {
        let profile = self
            .profiles
            .fetch_display_profile(&event.actor_id)
            .await?
            .unwrap_or_else(DisplayProfile::default);

        let comment_body = match event.metadata_value(meta::COMMENT_UUID) {
            Some(comment_uuid) if is_comment_typed(recipient.notification_type) => {
                self.social
                    .comment_preview(comment_uuid, self.config.comment_preview_length)
                    .await?
            }
            _ => None,
        };

        let climb = self
            .climb_context(event, recipient.notification_type)
            .await?;

        let enriched = EnrichedNotification {
            uuid,
            notification_type: recipient.notification_type,
            actor_id: event.actor_id.clone(),
            actor_display_name: profile.display_name,
            actor_avatar_url: profile.avatar_url,
            entity_type: match event.event_type {
                EventType::FollowCreated => None,
                _ => Some(event.entity_type),
            },
            entity_id: event.entity_id.clone(),
            comment_body,
            climb_name: climb.name,
            climb_uuid: climb.uuid,
            board_type: climb.board_type,
            proposal_uuid: climb.proposal_uuid,
            is_read: false,
            created_at: Utc::now(),
        };

        let key = ChannelKey::notifications(&recipient.recipient_id);
        self.router
            .publish(&key, serde_json::to_value(&enriched)?)
            .await
    }

    /// Climb-related enrichment for climb- and proposal-typed notifications.
    async fn climb_context(
        &self,
        event: &DomainEvent,
        notification_type: NotificationType,
    ) -> Result<ClimbContext> {
        let climb_uuid = match notification_type {
            NotificationType::NewClimb
            | NotificationType::NewClimbGlobal
            | NotificationType::ClimbComment => Some(event.entity_id.clone()),
            NotificationType::ProposalCreated
            | NotificationType::ProposalVote
            | NotificationType::ProposalApproved
            | NotificationType::ProposalRejected => self
                .social
                .proposal(&event.entity_id)
                .await?
                .map(|info| info.climb_uuid),
            _ => None,
        };
        let Some(climb_uuid) = climb_uuid else {
            return Ok(ClimbContext::default());
        };

        let proposal_uuid = matches!(event.entity_type, sendline_core::SocialEntityType::Proposal)
            .then(|| event.entity_id.clone());
        let summary = self.social.climb_summary(&climb_uuid).await?;
        Ok(ClimbContext {
            name: summary.as_ref().and_then(|s| s.name.clone()),
            board_type: summary.as_ref().map(|s| s.board_type.clone()),
            uuid: Some(climb_uuid),
            proposal_uuid,
        })
    }

    /// Publish the denormalized climb summary on the layout's new-climb
    /// channel. Best-effort realtime enrichment: every failure is logged
    /// and swallowed so a redelivery never duplicates notification rows.
    async fn publish_climb_summary(&self, event: &DomainEvent) {
        let summary = match self.social.climb_summary(&event.entity_id).await {
            Ok(Some(summary)) => summary,
            Ok(None) => {
                debug!(
                    subsystem = "worker",
                    entity_id = %event.entity_id,
                    "Climb summary missing, skipping realtime publish"
                );
                return;
            }
            Err(e) => {
                warn!(
                    subsystem = "worker",
                    entity_id = %event.entity_id,
                    error = %e,
                    "Climb summary lookup failed, skipping realtime publish"
                );
                return;
            }
        };

        let key = ChannelKey::new_climb(summary.board_type.clone(), summary.layout_id);
        let payload = match serde_json::to_value(&summary) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(subsystem = "worker", error = %e, "Climb summary serialization failed");
                return;
            }
        };
        if let Err(e) = self.router.publish(&key, payload).await {
            warn!(
                subsystem = "worker",
                channel = %key,
                error = %e,
                "Climb summary publish failed"
            );
        }
    }
}

fn is_comment_typed(notification_type: NotificationType) -> bool {
    matches!(
        notification_type,
        NotificationType::TickComment
            | NotificationType::ClimbComment
            | NotificationType::CommentReply
    )
}

#[derive(Default)]
struct ClimbContext {
    name: Option<String>,
    board_type: Option<String>,
    uuid: Option<String>,
    proposal_uuid: Option<String>,
}

#[async_trait]
impl EventHandler for NotificationWorker {
    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        self.process_event(event).await
    }
}
