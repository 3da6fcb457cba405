//! Outbound notification channels

use async_trait::async_trait;

use crate::error::SyncResult;
use crate::types::{DeliveryReference, OutgoingPost, RetractOutcome};

mod discord;

pub use discord::{DiscordWebhook, escape_markdown};

/// Notification channel collaborator
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Stable identifier of the destination, part of the account record key
    fn channel_id(&self) -> &str;

    /// Send a post and wait for the channel to confirm it
    async fn send(&self, post: &OutgoingPost) -> SyncResult<DeliveryReference>;

    /// Remove a previously sent post
    async fn retract(&self, reference: &DeliveryReference) -> SyncResult<RetractOutcome>;
}
