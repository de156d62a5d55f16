//! Recipient resolution: domain event → `(recipient, classification)` pairs.
//!
//! Stateless lookups over the social graph seam. A missing entity (deleted
//! comment, unknown climb) resolves to an empty recipient list — "no
//! notification", never a pipeline failure. Infrastructure errors propagate
//! so the broker leaves the entry pending.
//!
//! The worker applies the self-notification guard and dedup windows on top
//! of what is resolved here.

use std::collections::HashSet;

use sendline_core::{
    DomainEvent, EventType, NotificationType, Recipient, Result, SocialEntityType,
    SocialGraphRepository,
};

/// Well-known metadata keys on domain events.
pub mod meta {
    /// Public UUID of the comment a comment event is about.
    pub const COMMENT_UUID: &str = "commentUuid";
    /// Public UUID of the parent comment, present on replies.
    pub const PARENT_COMMENT_UUID: &str = "parentCommentUuid";
    /// Board type of the climb a climb event is about.
    pub const BOARD_TYPE: &str = "boardType";
    /// Layout ID of the climb a climb event is about.
    pub const LAYOUT_ID: &str = "layoutId";
}

/// Resolve the recipients of a domain event.
pub async fn resolve_recipients(
    event: &DomainEvent,
    social: &dyn SocialGraphRepository,
) -> Result<Vec<Recipient>> {
    match event.event_type {
        EventType::CommentCreated | EventType::CommentReply => {
            resolve_comment(event, social).await
        }
        EventType::VoteCast => resolve_vote(event, social).await,
        EventType::FollowCreated => Ok(vec![Recipient::new(
            event.entity_id.clone(),
            NotificationType::Follow,
        )]),
        EventType::ClimbCreated => resolve_new_climb(event, social).await,
        // Feed-only: the worker fans the ascent out, no notification rows.
        EventType::AscentLogged => Ok(Vec::new()),
        EventType::ProposalCreated => resolve_proposal_created(event, social).await,
        EventType::ProposalVoted => {
            resolve_to_proposer(event, social, NotificationType::ProposalVote).await
        }
        EventType::ProposalApproved => resolve_proposal_approved(event, social).await,
        EventType::ProposalRejected => {
            resolve_to_proposer(event, social, NotificationType::ProposalRejected).await
        }
    }
}

/// Comment events notify the owner of the commented entity, and for replies
/// the parent comment's author. When the same user fills both roles they
/// receive the reply-typed notification only.
async fn resolve_comment(
    event: &DomainEvent,
    social: &dyn SocialGraphRepository,
) -> Result<Vec<Recipient>> {
    let owner = match event.entity_type {
        SocialEntityType::Tick => social
            .tick_owner(&event.entity_id)
            .await?
            .map(|owner| (owner, NotificationType::TickComment)),
        SocialEntityType::Climb => social
            .climb_setter(&event.entity_id)
            .await?
            .map(|setter| (setter, NotificationType::ClimbComment)),
        _ => None,
    };

    let parent_author = match event.metadata_value(meta::PARENT_COMMENT_UUID) {
        Some(parent_uuid) => social.comment_author(parent_uuid).await?,
        None => None,
    };

    let mut recipients = Vec::new();
    if let Some(author) = &parent_author {
        recipients.push(Recipient::new(author.clone(), NotificationType::CommentReply));
    }
    if let Some((owner, classification)) = owner {
        if parent_author.as_deref() != Some(owner.as_str()) {
            recipients.push(Recipient::new(owner, classification));
        }
    }
    Ok(recipients)
}

/// Votes notify the owner of the voted entity.
async fn resolve_vote(
    event: &DomainEvent,
    social: &dyn SocialGraphRepository,
) -> Result<Vec<Recipient>> {
    let owner = match event.entity_type {
        SocialEntityType::Tick => social.tick_owner(&event.entity_id).await?,
        SocialEntityType::Comment => social.comment_author(&event.entity_id).await?,
        SocialEntityType::Climb => social.climb_setter(&event.entity_id).await?,
        _ => None,
    };
    Ok(owner
        .map(|owner| vec![Recipient::new(owner, NotificationType::Vote)])
        .unwrap_or_default())
}

/// New climbs notify layout subscribers (`new_climb_global`) and the
/// setter's followers (`new_climb`). A user who is both gets the
/// subscription-classified notification: they asked for everything on that
/// layout, which subsumes following the setter.
async fn resolve_new_climb(
    event: &DomainEvent,
    social: &dyn SocialGraphRepository,
) -> Result<Vec<Recipient>> {
    let mut recipients = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let layout = event
        .metadata_value(meta::BOARD_TYPE)
        .zip(event.metadata_value(meta::LAYOUT_ID).and_then(|v| v.parse::<i32>().ok()));
    if let Some((board_type, layout_id)) = layout {
        for subscriber in social.layout_subscribers(board_type, layout_id).await? {
            if seen.insert(subscriber.clone()) {
                recipients.push(Recipient::new(subscriber, NotificationType::NewClimbGlobal));
            }
        }
    }

    for follower in social.followers_of(&event.actor_id).await? {
        if seen.insert(follower.clone()) {
            recipients.push(Recipient::new(follower, NotificationType::NewClimb));
        }
    }
    Ok(recipients)
}

/// A new proposal notifies the setter of the targeted climb.
async fn resolve_proposal_created(
    event: &DomainEvent,
    social: &dyn SocialGraphRepository,
) -> Result<Vec<Recipient>> {
    let Some(info) = social.proposal(&event.entity_id).await? else {
        return Ok(Vec::new());
    };
    let Some(setter) = social.climb_setter(&info.climb_uuid).await? else {
        return Ok(Vec::new());
    };
    Ok(vec![Recipient::new(setter, NotificationType::ProposalCreated)])
}

async fn resolve_to_proposer(
    event: &DomainEvent,
    social: &dyn SocialGraphRepository,
    classification: NotificationType,
) -> Result<Vec<Recipient>> {
    Ok(social
        .proposal(&event.entity_id)
        .await?
        .map(|info| vec![Recipient::new(info.proposer_id, classification)])
        .unwrap_or_default())
}

/// Approval notifies the proposer and everyone who upvoted.
async fn resolve_proposal_approved(
    event: &DomainEvent,
    social: &dyn SocialGraphRepository,
) -> Result<Vec<Recipient>> {
    let Some(info) = social.proposal(&event.entity_id).await? else {
        return Ok(Vec::new());
    };
    let mut recipients = vec![Recipient::new(
        info.proposer_id.clone(),
        NotificationType::ProposalApproved,
    )];
    let mut seen: HashSet<String> = HashSet::from([info.proposer_id]);
    for upvoter in social.proposal_upvoters(&event.entity_id).await? {
        if seen.insert(upvoter.clone()) {
            recipients.push(Recipient::new(upvoter, NotificationType::ProposalApproved));
        }
    }
    Ok(recipients)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::FakeSocialGraph;

    fn comment_event(entity_type: SocialEntityType, entity_id: &str) -> DomainEvent {
        DomainEvent::new(EventType::CommentCreated, "commenter", entity_type, entity_id)
            .with_metadata(meta::COMMENT_UUID, "c-new")
    }

    #[tokio::test]
    async fn test_tick_comment_notifies_owner() {
        let social = FakeSocialGraph::new().with_tick_owner("t-1", "owner");
        let recipients = resolve_recipients(
            &comment_event(SocialEntityType::Tick, "t-1"),
            &social,
        )
        .await
        .unwrap();
        assert_eq!(
            recipients,
            vec![Recipient::new("owner", NotificationType::TickComment)]
        );
    }

    #[tokio::test]
    async fn test_climb_comment_notifies_setter() {
        let social = FakeSocialGraph::new().with_climb_setter("cl-1", "setter");
        let recipients = resolve_recipients(
            &comment_event(SocialEntityType::Climb, "cl-1"),
            &social,
        )
        .await
        .unwrap();
        assert_eq!(
            recipients,
            vec![Recipient::new("setter", NotificationType::ClimbComment)]
        );
    }

    #[tokio::test]
    async fn test_reply_notifies_parent_author_and_owner() {
        let social = FakeSocialGraph::new()
            .with_tick_owner("t-1", "owner")
            .with_comment_author("c-parent", "parent-author");
        let event = comment_event(SocialEntityType::Tick, "t-1")
            .with_metadata(meta::PARENT_COMMENT_UUID, "c-parent");
        let recipients = resolve_recipients(&event, &social).await.unwrap();
        assert_eq!(
            recipients,
            vec![
                Recipient::new("parent-author", NotificationType::CommentReply),
                Recipient::new("owner", NotificationType::TickComment),
            ]
        );
    }

    #[tokio::test]
    async fn test_reply_to_owner_collapses_to_single_reply_notification() {
        let social = FakeSocialGraph::new()
            .with_tick_owner("t-1", "owner")
            .with_comment_author("c-parent", "owner");
        let event = comment_event(SocialEntityType::Tick, "t-1")
            .with_metadata(meta::PARENT_COMMENT_UUID, "c-parent");
        let recipients = resolve_recipients(&event, &social).await.unwrap();
        assert_eq!(
            recipients,
            vec![Recipient::new("owner", NotificationType::CommentReply)]
        );
    }

    #[tokio::test]
    async fn test_missing_entity_resolves_to_no_recipients() {
        let social = FakeSocialGraph::new();
        let recipients = resolve_recipients(
            &comment_event(SocialEntityType::Tick, "t-deleted"),
            &social,
        )
        .await
        .unwrap();
        assert!(recipients.is_empty());
    }

    #[tokio::test]
    async fn test_vote_notifies_entity_owner() {
        let social = FakeSocialGraph::new().with_comment_author("c-1", "author");
        let event = DomainEvent::new(
            EventType::VoteCast,
            "voter",
            SocialEntityType::Comment,
            "c-1",
        );
        let recipients = resolve_recipients(&event, &social).await.unwrap();
        assert_eq!(
            recipients,
            vec![Recipient::new("author", NotificationType::Vote)]
        );
    }

    #[tokio::test]
    async fn test_follow_notifies_followee_without_lookup() {
        let social = FakeSocialGraph::new();
        let event = DomainEvent::new(
            EventType::FollowCreated,
            "follower",
            SocialEntityType::User,
            "followee",
        );
        let recipients = resolve_recipients(&event, &social).await.unwrap();
        assert_eq!(
            recipients,
            vec![Recipient::new("followee", NotificationType::Follow)]
        );
    }

    #[tokio::test]
    async fn test_new_climb_subscription_takes_precedence_over_follow() {
        let social = FakeSocialGraph::new()
            .with_layout_subscribers("kilter", 8, &["both", "sub-only"])
            .with_followers("setter", &["both", "follower-only"]);
        let event = DomainEvent::new(
            EventType::ClimbCreated,
            "setter",
            SocialEntityType::Climb,
            "cl-1",
        )
        .with_metadata(meta::BOARD_TYPE, "kilter")
        .with_metadata(meta::LAYOUT_ID, "8");
        let recipients = resolve_recipients(&event, &social).await.unwrap();
        assert_eq!(
            recipients,
            vec![
                Recipient::new("both", NotificationType::NewClimbGlobal),
                Recipient::new("sub-only", NotificationType::NewClimbGlobal),
                Recipient::new("follower-only", NotificationType::NewClimb),
            ]
        );
    }

    #[tokio::test]
    async fn test_new_climb_without_layout_metadata_falls_back_to_followers() {
        let social = FakeSocialGraph::new().with_followers("setter", &["follower"]);
        let event = DomainEvent::new(
            EventType::ClimbCreated,
            "setter",
            SocialEntityType::Climb,
            "cl-1",
        );
        let recipients = resolve_recipients(&event, &social).await.unwrap();
        assert_eq!(
            recipients,
            vec![Recipient::new("follower", NotificationType::NewClimb)]
        );
    }

    #[tokio::test]
    async fn test_ascent_logged_has_no_notification_recipients() {
        let social = FakeSocialGraph::new().with_followers("climber", &["follower"]);
        let event = DomainEvent::new(
            EventType::AscentLogged,
            "climber",
            SocialEntityType::Tick,
            "t-1",
        );
        assert!(resolve_recipients(&event, &social).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_proposal_created_notifies_climb_setter() {
        let social = FakeSocialGraph::new()
            .with_proposal("p-1", "proposer", "cl-1", "kilter")
            .with_climb_setter("cl-1", "setter");
        let event = DomainEvent::new(
            EventType::ProposalCreated,
            "proposer",
            SocialEntityType::Proposal,
            "p-1",
        );
        let recipients = resolve_recipients(&event, &social).await.unwrap();
        assert_eq!(
            recipients,
            vec![Recipient::new("setter", NotificationType::ProposalCreated)]
        );
    }

    #[tokio::test]
    async fn test_proposal_vote_notifies_proposer() {
        let social = FakeSocialGraph::new().with_proposal("p-1", "proposer", "cl-1", "kilter");
        let event = DomainEvent::new(
            EventType::ProposalVoted,
            "voter",
            SocialEntityType::Proposal,
            "p-1",
        );
        let recipients = resolve_recipients(&event, &social).await.unwrap();
        assert_eq!(
            recipients,
            vec![Recipient::new("proposer", NotificationType::ProposalVote)]
        );
    }

    #[tokio::test]
    async fn test_proposal_approved_notifies_proposer_and_upvoters_once() {
        let social = FakeSocialGraph::new()
            .with_proposal("p-1", "proposer", "cl-1", "kilter")
            .with_proposal_upvoters("p-1", &["proposer", "upvoter-a", "upvoter-b"]);
        let event = DomainEvent::new(
            EventType::ProposalApproved,
            "moderator",
            SocialEntityType::Proposal,
            "p-1",
        );
        let recipients = resolve_recipients(&event, &social).await.unwrap();
        assert_eq!(
            recipients,
            vec![
                Recipient::new("proposer", NotificationType::ProposalApproved),
                Recipient::new("upvoter-a", NotificationType::ProposalApproved),
                Recipient::new("upvoter-b", NotificationType::ProposalApproved),
            ]
        );
    }

    #[tokio::test]
    async fn test_proposal_rejected_notifies_proposer_only() {
        let social = FakeSocialGraph::new()
            .with_proposal("p-1", "proposer", "cl-1", "kilter")
            .with_proposal_upvoters("p-1", &["upvoter-a"]);
        let event = DomainEvent::new(
            EventType::ProposalRejected,
            "moderator",
            SocialEntityType::Proposal,
            "p-1",
        );
        let recipients = resolve_recipients(&event, &social).await.unwrap();
        assert_eq!(
            recipients,
            vec![Recipient::new("proposer", NotificationType::ProposalRejected)]
        );
    }
}
