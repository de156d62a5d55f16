//! In-memory repository fakes shared by resolver and worker unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use sendline_core::{
    ClimbSummary, CreateNotificationRequest, DisplayProfile, Error, FeedRepository, Notification,
    NotificationRepository, NotificationType, ProfileRepository, ProposalInfo, Result,
    SocialGraphRepository,
};

#[derive(Default)]
pub struct FakeSocialGraph {
    comment_authors: HashMap<String, String>,
    tick_owners: HashMap<String, String>,
    climb_setters: HashMap<String, String>,
    followers: HashMap<String, Vec<String>>,
    layout_subscribers: HashMap<(String, i32), Vec<String>>,
    proposals: HashMap<String, ProposalInfo>,
    proposal_upvoters: HashMap<String, Vec<String>>,
    climb_summaries: HashMap<String, ClimbSummary>,
    comment_previews: HashMap<String, String>,
}

impl FakeSocialGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_comment_author(mut self, comment_uuid: &str, author: &str) -> Self {
        self.comment_authors
            .insert(comment_uuid.to_string(), author.to_string());
        self
    }

    pub fn with_tick_owner(mut self, tick_uuid: &str, owner: &str) -> Self {
        self.tick_owners
            .insert(tick_uuid.to_string(), owner.to_string());
        self
    }

    pub fn with_climb_setter(mut self, climb_uuid: &str, setter: &str) -> Self {
        self.climb_setters
            .insert(climb_uuid.to_string(), setter.to_string());
        self
    }

    pub fn with_followers(mut self, user_id: &str, followers: &[&str]) -> Self {
        self.followers.insert(
            user_id.to_string(),
            followers.iter().map(|f| f.to_string()).collect(),
        );
        self
    }

    pub fn with_layout_subscribers(
        mut self,
        board_type: &str,
        layout_id: i32,
        subscribers: &[&str],
    ) -> Self {
        self.layout_subscribers.insert(
            (board_type.to_string(), layout_id),
            subscribers.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn with_proposal(
        mut self,
        proposal_uuid: &str,
        proposer: &str,
        climb_uuid: &str,
        board_type: &str,
    ) -> Self {
        self.proposals.insert(
            proposal_uuid.to_string(),
            ProposalInfo {
                proposer_id: proposer.to_string(),
                climb_uuid: climb_uuid.to_string(),
                board_type: board_type.to_string(),
            },
        );
        self
    }

    pub fn with_proposal_upvoters(mut self, proposal_uuid: &str, upvoters: &[&str]) -> Self {
        self.proposal_upvoters.insert(
            proposal_uuid.to_string(),
            upvoters.iter().map(|u| u.to_string()).collect(),
        );
        self
    }

    pub fn with_climb_summary(mut self, summary: ClimbSummary) -> Self {
        self.climb_summaries.insert(summary.uuid.clone(), summary);
        self
    }

    pub fn with_comment_preview(mut self, comment_uuid: &str, preview: &str) -> Self {
        self.comment_previews
            .insert(comment_uuid.to_string(), preview.to_string());
        self
    }
}

#[async_trait]
impl SocialGraphRepository for FakeSocialGraph {
    async fn comment_author(&self, comment_uuid: &str) -> Result<Option<String>> {
        Ok(self.comment_authors.get(comment_uuid).cloned())
    }

    async fn tick_owner(&self, tick_uuid: &str) -> Result<Option<String>> {
        Ok(self.tick_owners.get(tick_uuid).cloned())
    }

    async fn climb_setter(&self, climb_uuid: &str) -> Result<Option<String>> {
        Ok(self.climb_setters.get(climb_uuid).cloned())
    }

    async fn followers_of(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self.followers.get(user_id).cloned().unwrap_or_default())
    }

    async fn layout_subscribers(&self, board_type: &str, layout_id: i32) -> Result<Vec<String>> {
        Ok(self
            .layout_subscribers
            .get(&(board_type.to_string(), layout_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn proposal(&self, proposal_uuid: &str) -> Result<Option<ProposalInfo>> {
        Ok(self.proposals.get(proposal_uuid).cloned())
    }

    async fn proposal_upvoters(&self, proposal_uuid: &str) -> Result<Vec<String>> {
        Ok(self
            .proposal_upvoters
            .get(proposal_uuid)
            .cloned()
            .unwrap_or_default())
    }

    async fn climb_summary(&self, climb_uuid: &str) -> Result<Option<ClimbSummary>> {
        Ok(self.climb_summaries.get(climb_uuid).cloned())
    }

    async fn comment_preview(
        &self,
        comment_uuid: &str,
        max_len: usize,
    ) -> Result<Option<String>> {
        Ok(self
            .comment_previews
            .get(comment_uuid)
            .map(|p| p.chars().take(max_len).collect()))
    }
}

/// Recorded notification row with an insertion timestamp for dedup probes.
pub struct InsertedNotification {
    pub request: CreateNotificationRequest,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct FakeNotificationRepo {
    pub rows: Mutex<Vec<InsertedNotification>>,
    pub fail_inserts: std::sync::atomic::AtomicBool,
}

impl FakeNotificationRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inserted(&self) -> Vec<CreateNotificationRequest> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.request.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationRepository for FakeNotificationRepo {
    async fn insert(&self, req: CreateNotificationRequest) -> Result<()> {
        if self.fail_inserts.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::Internal("insert refused".into()));
        }
        self.rows.lock().unwrap().push(InsertedNotification {
            request: req,
            created_at: Utc::now(),
        });
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
        let cutoff = Utc::now() - chrono::Duration::minutes(since_minutes);
        Ok(self.rows.lock().unwrap().iter().any(|row| {
            row.request.actor_id == actor_id
                && row.request.recipient_id == recipient_id
                && row.request.notification_type == notification_type
                && row.request.entity_id == entity_id
                && row.created_at > cutoff
        }))
    }

    async fn mark_read(&self, _recipient_id: &str, uuids: &[Uuid]) -> Result<u64> {
        Ok(uuids.len() as u64)
    }

    async fn mark_all_read(&self, _recipient_id: &str) -> Result<u64> {
        Ok(0)
    }

    async fn list_for_recipient(
        &self,
        _recipient_id: &str,
        _unread_only: bool,
        _limit: i64,
        _offset: i64,
    ) -> Result<Vec<Notification>> {
        Ok(Vec::new())
    }

    async fn unread_count(&self, _recipient_id: &str) -> Result<i64> {
        Ok(self.rows.lock().unwrap().len() as i64)
    }

    async fn comment_id_for_uuid(&self, _comment_uuid: &str) -> Result<Option<i64>> {
        Ok(None)
    }
}

#[derive(Default)]
pub struct FakeProfileRepo {
    pub profiles: Mutex<HashMap<String, DisplayProfile>>,
    pub fail_lookups: std::sync::atomic::AtomicBool,
}

impl FakeProfileRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(self, user_id: &str, display_name: &str) -> Self {
        self.profiles.lock().unwrap().insert(
            user_id.to_string(),
            DisplayProfile {
                display_name: Some(display_name.to_string()),
                avatar_url: None,
            },
        );
        self
    }
}

#[async_trait]
impl ProfileRepository for FakeProfileRepo {
    async fn fetch_display_profile(&self, user_id: &str) -> Result<Option<DisplayProfile>> {
        if self.fail_lookups.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::Internal("profile lookup refused".into()));
        }
        Ok(self.profiles.lock().unwrap().get(user_id).cloned())
    }
}

#[derive(Default)]
pub struct FakeFeedRepo {
    pub ascents: Mutex<Vec<(String, String)>>,
    pub climbs: Mutex<Vec<(String, String)>>,
}

impl FakeFeedRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedRepository for FakeFeedRepo {
    async fn fanout_ascent(
        &self,
        actor_id: &str,
        tick_uuid: &str,
        _occurred_at: DateTime<Utc>,
    ) -> Result<u64> {
        self.ascents
            .lock()
            .unwrap()
            .push((actor_id.to_string(), tick_uuid.to_string()));
        Ok(1)
    }

    async fn fanout_new_climb(
        &self,
        actor_id: &str,
        climb_uuid: &str,
        _occurred_at: DateTime<Utc>,
    ) -> Result<u64> {
        self.climbs
            .lock()
            .unwrap()
            .push((actor_id.to_string(), climb_uuid.to_string()));
        Ok(1)
    }
}
