//! Remote feed access
//!
//! - [`FeedClient`]: the remote feed collaborator (pagination, downloads, profiles)
//! - [`FeedWalker`]: watermark-bounded, lazily paginated walk over one account's feed
//! - [`InstagramClient`]: HTTP implementation of [`FeedClient`]

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::SyncResult;
use crate::media_cache::MediaCache;
use crate::types::{AccountProfile, RemoteItem};

mod instagram;
mod walker;

pub use instagram::InstagramClient;
pub use walker::FeedWalker;

/// Position in a paginated feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// First (newest) page
    Start,
    /// Opaque continuation token returned with the previous page
    After(String),
}

/// One page of a feed, newest item first
#[derive(Debug, Clone, Default)]
pub struct FeedPage {
    pub items: Vec<RemoteItem>,
    /// Continuation token, `None` once the feed is exhausted
    pub next: Option<String>,
}

/// Remote feed collaborator
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Fetch one page of an account's posts in reverse-chronological order
    async fn fetch_page(&self, account_id: &str, cursor: &PageCursor) -> SyncResult<FeedPage>;

    /// Download every asset of an item into the scratch cache, in album order
    ///
    /// Each returned path's extension identifies its container format.
    async fn download_assets(
        &self,
        item: &RemoteItem,
        cache: &MediaCache,
    ) -> SyncResult<Vec<PathBuf>>;

    /// Public profile of an account, for author display
    async fn account_profile(&self, account_id: &str) -> SyncResult<AccountProfile>;

    /// Resolve a username to its profile (and stable account id)
    async fn resolve_username(&self, username: &str) -> SyncResult<AccountProfile>;
}
