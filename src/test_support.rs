//! Test fakes for the feed and channel collaborators, plus fixture writers

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::{ImageFormat, Rgba, RgbaImage};
use parking_lot::Mutex;

use crate::channel::NotificationChannel;
use crate::error::{SyncError, SyncResult};
use crate::feed::{FeedClient, FeedPage, PageCursor};
use crate::media_cache::MediaCache;
use crate::types::{
    AccountProfile, AssetKind, AssetRef, DeliveryReference, MediaKind, OutgoingPost,
    RemoteItem, RetractOutcome,
};

/// Instant `secs` seconds after the epoch
pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

/// Single-photo item of account `acct`
pub fn item(id: &str, secs: i64) -> RemoteItem {
    RemoteItem {
        id: id.to_string(),
        account_id: "acct".to_string(),
        taken_at: at(secs),
        kind: MediaKind::Photo,
        caption: format!("caption {}", id),
        assets: vec![AssetRef {
            url: format!("https://cdn.example.com/{}.jpg", id),
            kind: AssetKind::Image,
        }],
    }
}

/// Album item with the given asset kinds
pub fn album(id: &str, secs: i64, kinds: &[AssetKind]) -> RemoteItem {
    RemoteItem {
        kind: MediaKind::Album,
        assets: kinds
            .iter()
            .enumerate()
            .map(|(i, kind)| AssetRef {
                url: format!("https://cdn.example.com/{}_{}", id, i),
                kind: *kind,
            })
            .collect(),
        ..item(id, secs)
    }
}

/// Write a solid-color PNG, whatever the file extension
pub fn write_png(dir: &Path, name: &str, width: u32, height: u32, color: Rgba<u8>) -> PathBuf {
    let path = dir.join(name);
    RgbaImage::from_pixel(width, height, color)
        .save_with_format(&path, ImageFormat::Png)
        .unwrap();
    path
}

/// Write a file that starts like an MP4 container and is not an image
pub fn write_video(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"\x00\x00\x00\x18ftypmp42\x00\x00\x00\x00mp42isom").unwrap();
    path
}

fn transient(message: &str) -> SyncError {
    SyncError::Api {
        status: 503,
        message: message.to_string(),
    }
}

// =============================================================================
// Fake Feed
// =============================================================================

#[derive(Default)]
struct FeedState {
    pages: Vec<Vec<RemoteItem>>,
    account_pages: HashMap<String, Vec<Vec<RemoteItem>>>,
    failing_accounts: HashSet<String>,
    dangling_cursor: bool,
    failing_pages: HashSet<usize>,
    failing_downloads: HashSet<String>,
    page_requests: usize,
    cursors_seen: Vec<PageCursor>,
    downloads: Vec<String>,
    scratch_dirs: Vec<PathBuf>,
    resolved_ids: HashMap<String, String>,
    failing_usernames: HashSet<String>,
    resolve_requests: Vec<String>,
}

/// In-memory feed; page `n > 0` is addressed by the cursor `page-n`
#[derive(Default)]
pub struct FakeFeed {
    state: Mutex<FeedState>,
}

impl FakeFeed {
    pub fn with_pages(pages: Vec<Vec<RemoteItem>>) -> Self {
        let feed = Self::default();
        feed.set_pages(pages);
        feed
    }

    /// Replace the remote content
    pub fn set_pages(&self, pages: Vec<Vec<RemoteItem>>) {
        self.state.lock().pages = pages;
    }

    /// Give one account its own content instead of the shared pages
    pub fn set_account_pages(&self, account_id: &str, pages: Vec<Vec<RemoteItem>>) {
        self.state
            .lock()
            .account_pages
            .insert(account_id.to_string(), pages);
    }

    /// Fail every page request for an account
    pub fn fail_account(&self, account_id: &str) {
        self.state
            .lock()
            .failing_accounts
            .insert(account_id.to_string());
    }

    /// Return a continuation token even on the last page
    pub fn with_dangling_cursor(self) -> Self {
        self.state.lock().dangling_cursor = true;
        self
    }

    pub fn fail_page(self, index: usize) -> Self {
        self.state.lock().failing_pages.insert(index);
        self
    }

    pub fn set_failing_page(&self, index: usize, failing: bool) {
        let mut state = self.state.lock();
        if failing {
            state.failing_pages.insert(index);
        } else {
            state.failing_pages.remove(&index);
        }
    }

    pub fn fail_download(&self, item_id: &str) {
        self.state.lock().failing_downloads.insert(item_id.to_string());
    }

    /// Resolve `username` to `id` instead of `id_<username>`
    pub fn set_resolved_id(&self, username: &str, id: &str) {
        self.state
            .lock()
            .resolved_ids
            .insert(username.to_string(), id.to_string());
    }

    pub fn fail_resolve(&self, username: &str) {
        self.state
            .lock()
            .failing_usernames
            .insert(username.to_string());
    }

    /// Usernames passed to `resolve_username`, in order
    pub fn resolve_requests(&self) -> Vec<String> {
        self.state.lock().resolve_requests.clone()
    }

    pub fn page_requests(&self) -> usize {
        self.state.lock().page_requests
    }

    pub fn cursors_seen(&self) -> Vec<PageCursor> {
        self.state.lock().cursors_seen.clone()
    }

    /// Item ids whose assets were downloaded, in order
    pub fn downloads(&self) -> Vec<String> {
        self.state.lock().downloads.clone()
    }

    /// Scratch directories handed to `download_assets`
    pub fn scratch_dirs(&self) -> Vec<PathBuf> {
        self.state.lock().scratch_dirs.clone()
    }
}

#[async_trait]
impl FeedClient for FakeFeed {
    async fn fetch_page(&self, account_id: &str, cursor: &PageCursor) -> SyncResult<FeedPage> {
        let mut state = self.state.lock();
        state.page_requests += 1;
        state.cursors_seen.push(cursor.clone());

        let index = match cursor {
            PageCursor::Start => 0,
            PageCursor::After(token) => token
                .strip_prefix("page-")
                .and_then(|n| n.parse().ok())
                .unwrap_or(usize::MAX),
        };

        if state.failing_pages.contains(&index) || state.failing_accounts.contains(account_id) {
            return Err(transient("feed unavailable"));
        }

        let pages = state.account_pages.get(account_id).unwrap_or(&state.pages);
        let items = pages.get(index).cloned().unwrap_or_default();
        let next = (index + 1 < pages.len() || state.dangling_cursor)
            .then(|| format!("page-{}", index + 1));
        Ok(FeedPage { items, next })
    }

    async fn download_assets(
        &self,
        item: &RemoteItem,
        cache: &MediaCache,
    ) -> SyncResult<Vec<PathBuf>> {
        {
            let mut state = self.state.lock();
            state.scratch_dirs.push(cache.path().to_path_buf());
            if state.failing_downloads.contains(&item.id) {
                return Err(transient("cdn unavailable"));
            }
            state.downloads.push(item.id.clone());
        }

        let paths = item
            .assets
            .iter()
            .enumerate()
            .map(|(i, asset)| {
                let name = format!("{}_{}", item.id, i);
                match asset.kind {
                    AssetKind::Image => {
                        write_png(cache.path(), &format!("{}.jpg", name), 16, 12, Rgba([9, 9, 9, 255]))
                    }
                    AssetKind::Video => write_video(cache.path(), &format!("{}.mp4", name)),
                }
            })
            .collect();
        Ok(paths)
    }

    async fn account_profile(&self, account_id: &str) -> SyncResult<AccountProfile> {
        Ok(AccountProfile {
            id: account_id.to_string(),
            username: format!("user_{}", account_id),
            profile_pic_url: Some("https://cdn.example.com/avatar.jpg".to_string()),
        })
    }

    async fn resolve_username(&self, username: &str) -> SyncResult<AccountProfile> {
        let mut state = self.state.lock();
        state.resolve_requests.push(username.to_string());
        if state.failing_usernames.contains(username) {
            return Err(SyncError::Api {
                status: 404,
                message: format!("user {} not found", username),
            });
        }

        let id = state
            .resolved_ids
            .get(username)
            .cloned()
            .unwrap_or_else(|| format!("id_{}", username));
        Ok(AccountProfile {
            id,
            username: username.to_string(),
            profile_pic_url: None,
        })
    }
}

// =============================================================================
// Fake Channel
// =============================================================================

/// A post as the fake channel received it
#[derive(Debug, Clone)]
pub struct SentPost {
    pub reference: DeliveryReference,
    pub caption: String,
    pub author_name: String,
    pub file_names: Vec<String>,
}

#[derive(Default)]
struct ChannelState {
    next_id: u64,
    sent: Vec<SentPost>,
    retracted: Vec<DeliveryReference>,
    live: HashSet<DeliveryReference>,
    failing_captions: HashSet<String>,
    failing_retracts: HashSet<DeliveryReference>,
    send_attempts: HashMap<String, usize>,
}

/// In-memory notification channel
pub struct FakeChannel {
    id: String,
    state: Mutex<ChannelState>,
}

impl FakeChannel {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            state: Mutex::new(ChannelState::default()),
        }
    }

    /// Fail sends of posts with this caption
    pub fn set_failing_caption(&self, caption: &str, failing: bool) {
        let mut state = self.state.lock();
        if failing {
            state.failing_captions.insert(caption.to_string());
        } else {
            state.failing_captions.remove(caption);
        }
    }

    pub fn set_failing_retract(&self, reference: &DeliveryReference, failing: bool) {
        let mut state = self.state.lock();
        if failing {
            state.failing_retracts.insert(reference.clone());
        } else {
            state.failing_retracts.remove(reference);
        }
    }

    /// Drop a message on the channel side, as if deleted by hand
    pub fn forget(&self, reference: &DeliveryReference) {
        self.state.lock().live.remove(reference);
    }

    pub fn sent(&self) -> Vec<SentPost> {
        self.state.lock().sent.clone()
    }

    pub fn sent_captions(&self) -> Vec<String> {
        self.state.lock().sent.iter().map(|p| p.caption.clone()).collect()
    }

    pub fn retracted(&self) -> Vec<DeliveryReference> {
        self.state.lock().retracted.clone()
    }

    pub fn send_attempts(&self, caption: &str) -> usize {
        self.state
            .lock()
            .send_attempts
            .get(caption)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl NotificationChannel for FakeChannel {
    fn channel_id(&self) -> &str {
        &self.id
    }

    async fn send(&self, post: &OutgoingPost) -> SyncResult<DeliveryReference> {
        let mut state = self.state.lock();
        *state.send_attempts.entry(post.caption.clone()).or_default() += 1;

        if state.failing_captions.contains(&post.caption) {
            return Err(transient("webhook unavailable"));
        }
        for file in &post.files {
            if !file.exists() {
                return Err(SyncError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{:?} missing", file),
                )));
            }
        }

        state.next_id += 1;
        let reference = DeliveryReference(format!("{}-{}", self.id, state.next_id));
        state.live.insert(reference.clone());
        state.sent.push(SentPost {
            reference: reference.clone(),
            caption: post.caption.clone(),
            author_name: post.author_name.clone(),
            file_names: post
                .files
                .iter()
                .filter_map(|f| f.file_name().map(|n| n.to_string_lossy().into_owned()))
                .collect(),
        });
        Ok(reference)
    }

    async fn retract(&self, reference: &DeliveryReference) -> SyncResult<RetractOutcome> {
        let mut state = self.state.lock();
        if state.failing_retracts.contains(reference) {
            return Err(transient("webhook unavailable"));
        }
        state.retracted.push(reference.clone());
        if state.live.remove(reference) {
            Ok(RetractOutcome::Retracted)
        } else {
            Ok(RetractOutcome::NotFound)
        }
    }
}
