//! # sendline-core
//!
//! Core types, traits, and abstractions for the sendline event system.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the database and event-distribution crates depend on: the domain
//! event model, the notification model, repository traits, and shared
//! defaults.

pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{DomainEvent, EventType, RelayEnvelope, SocialEntityType};
pub use models::{
    ClimbSummary, CreateNotificationRequest, DisplayProfile, EnrichedNotification, Notification,
    NotificationType, Recipient,
};
pub use traits::{
    FeedRepository, NotificationRepository, ProfileRepository, ProposalInfo,
    SocialGraphRepository,
};
