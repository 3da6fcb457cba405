//! Instagram API client
//!
//! Handles:
//! - User feed pagination (`max_id` cursor)
//! - Profile lookup by id and by username
//! - Asset download into the per-item scratch cache
//!
//! Authentication uses an existing web session cookie; logging in is left to
//! whoever provides the session id.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use serde::de::{DeserializeOwned, Error as _};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{FeedClient, FeedPage, PageCursor};
use crate::error::{SyncError, SyncResult};
use crate::media_cache::{MediaCache, url_extension};
use crate::types::{AccountProfile, AssetKind, AssetRef, MediaKind, RemoteItem};

// =============================================================================
// API Endpoints
// =============================================================================

const API_BASE: &str = "https://i.instagram.com/api/v1";
const USER_AGENT: &str = "Instagram 269.0.0.18.75 Android (26/8.0.0; 480dpi; 1080x1920; OnePlus; 6T Dev; devitron; qcom; en_US; 314665256)";
const APP_ID: &str = "936619743392459";
const PAGE_SIZE: u32 = 12;

// =============================================================================
// Instagram Client
// =============================================================================

/// Instagram private API client
#[derive(Clone)]
pub struct InstagramClient {
    http: Client,
    api_base: String,
}

impl InstagramClient {
    /// Create a client authenticated with a `sessionid` cookie
    pub fn new(session_id: &str, timeout: Duration) -> SyncResult<Self> {
        let mut headers = HeaderMap::new();
        let cookie = HeaderValue::from_str(&format!("sessionid={}", session_id)).map_err(|e| {
            SyncError::Api {
                status: 0,
                message: format!("invalid session id: {}", e),
            }
        })?;
        headers.insert(COOKIE, cookie);
        headers.insert("X-IG-App-ID", HeaderValue::from_static(APP_ID));

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            api_base: API_BASE.to_string(),
        })
    }

    /// Point the client at a different API root
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// GET an API path and decode the JSON body
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> SyncResult<T> {
        let url = format!("{}/{}", self.api_base, path);
        debug!("GET {}", url);

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!("Instagram API error {} for {}", status, path);
            return Err(SyncError::Api {
                status: status.as_u16(),
                message: truncate(&body, 200),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl FeedClient for InstagramClient {
    async fn fetch_page(&self, account_id: &str, cursor: &PageCursor) -> SyncResult<FeedPage> {
        let path = match cursor {
            PageCursor::Start => format!("feed/user/{}/?count={}", account_id, PAGE_SIZE),
            PageCursor::After(max_id) => format!(
                "feed/user/{}/?count={}&max_id={}",
                account_id, PAGE_SIZE, max_id
            ),
        };

        let response: UserFeedResponse = self.get_json(&path).await?;
        response.into_page(account_id)
    }

    async fn download_assets(
        &self,
        item: &RemoteItem,
        cache: &MediaCache,
    ) -> SyncResult<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(item.assets.len());

        for (index, asset) in item.assets.iter().enumerate() {
            let response = self.http.get(&asset.url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(SyncError::Api {
                    status: status.as_u16(),
                    message: format!("asset {} of item {} unavailable", index, item.id),
                });
            }
            let data = response.bytes().await?;

            let path = cache.asset_path(
                &format!("{}_{}", item.id, index),
                asset.kind,
                url_extension(&asset.url),
            );
            cache.save(&path, &data).await?;
            paths.push(path);
        }

        info!(
            "Downloaded {} assets for item {}",
            paths.len(),
            item.id
        );
        Ok(paths)
    }

    async fn account_profile(&self, account_id: &str) -> SyncResult<AccountProfile> {
        let response: UserInfoResponse = self.get_json(&format!("users/{}/info/", account_id)).await?;
        response.user.into_profile()
    }

    async fn resolve_username(&self, username: &str) -> SyncResult<AccountProfile> {
        let response: WebProfileResponse = self
            .get_json(&format!("users/web_profile_info/?username={}", username))
            .await?;
        let profile = response.data.user.into_profile()?;
        info!("Resolved @{} to account {}", username, profile.id);
        Ok(profile)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// =============================================================================
// Response Types
// =============================================================================

/// Id encoded either as a JSON string or number
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FlexibleId {
    Str(String),
    Num(u64),
}

impl From<FlexibleId> for String {
    fn from(id: FlexibleId) -> Self {
        match id {
            FlexibleId::Str(s) => s,
            FlexibleId::Num(n) => n.to_string(),
        }
    }
}

/// `feed/user/{id}/` response
#[derive(Debug, Deserialize)]
struct UserFeedResponse {
    #[serde(default)]
    items: Vec<MediaItem>,
    #[serde(default)]
    more_available: bool,
    #[serde(default)]
    next_max_id: Option<String>,
}

impl UserFeedResponse {
    fn into_page(self, account_id: &str) -> SyncResult<FeedPage> {
        let next = if self.more_available {
            self.next_max_id
        } else {
            None
        };
        let items = self
            .items
            .into_iter()
            .map(|item| item.into_remote_item(account_id))
            .collect::<SyncResult<Vec<_>>>()?;

        Ok(FeedPage { items, next })
    }
}

#[derive(Debug, Deserialize)]
struct MediaItem {
    pk: FlexibleId,
    taken_at: i64,
    media_type: i64,
    #[serde(default)]
    caption: Option<Caption>,
    #[serde(flatten)]
    media: MediaVersions,
    #[serde(default)]
    carousel_media: Option<Vec<CarouselMedia>>,
}

#[derive(Debug, Deserialize)]
struct Caption {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct MediaVersions {
    #[serde(default)]
    image_versions2: Option<ImageVersions>,
    #[serde(default)]
    video_versions: Option<Vec<VideoVersion>>,
}

#[derive(Debug, Deserialize)]
struct ImageVersions {
    #[serde(default)]
    candidates: Vec<ImageCandidate>,
}

#[derive(Debug, Deserialize)]
struct ImageCandidate {
    url: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

#[derive(Debug, Deserialize)]
struct VideoVersion {
    url: String,
}

#[derive(Debug, Deserialize)]
struct CarouselMedia {
    media_type: i64,
    #[serde(flatten)]
    media: MediaVersions,
}

impl MediaVersions {
    /// Largest image candidate
    fn best_image(&self) -> Option<AssetRef> {
        self.image_versions2
            .as_ref()?
            .candidates
            .iter()
            .max_by_key(|c| u64::from(c.width) * u64::from(c.height))
            .map(|c| AssetRef {
                url: c.url.clone(),
                kind: AssetKind::Image,
            })
    }

    fn video(&self) -> Option<AssetRef> {
        self.video_versions.as_ref()?.first().map(|v| AssetRef {
            url: v.url.clone(),
            kind: AssetKind::Video,
        })
    }

    /// Asset for a single media of the given type
    fn asset(&self, media_type: i64) -> Option<AssetRef> {
        match MediaKind::from_code(media_type) {
            MediaKind::Video => self.video().or_else(|| self.best_image()),
            _ => self.best_image(),
        }
    }
}

impl MediaItem {
    fn into_remote_item(self, account_id: &str) -> SyncResult<RemoteItem> {
        let taken_at = DateTime::from_timestamp(self.taken_at, 0).ok_or_else(|| {
            serde_json::Error::custom(format!("taken_at {} out of range", self.taken_at))
        })?;

        let kind = MediaKind::from_code(self.media_type);
        let assets = match kind {
            MediaKind::Photo | MediaKind::Video => {
                self.media.asset(self.media_type).into_iter().collect()
            }
            MediaKind::Album => self
                .carousel_media
                .unwrap_or_default()
                .iter()
                .filter_map(|child| child.media.asset(child.media_type))
                .collect(),
            MediaKind::Unknown(_) => Vec::new(),
        };

        Ok(RemoteItem {
            id: self.pk.into(),
            account_id: account_id.to_string(),
            taken_at,
            kind,
            caption: self.caption.map(|c| c.text).unwrap_or_default(),
            assets,
        })
    }
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    user: ProfileUser,
}

#[derive(Debug, Deserialize)]
struct WebProfileResponse {
    data: WebProfileData,
}

#[derive(Debug, Deserialize)]
struct WebProfileData {
    user: ProfileUser,
}

#[derive(Debug, Deserialize)]
struct ProfileUser {
    #[serde(default)]
    pk: Option<FlexibleId>,
    #[serde(default)]
    id: Option<FlexibleId>,
    username: String,
    #[serde(default)]
    profile_pic_url: Option<String>,
}

impl ProfileUser {
    fn into_profile(self) -> SyncResult<AccountProfile> {
        let id = self
            .pk
            .or(self.id)
            .ok_or_else(|| serde_json::Error::custom(format!("user {} has no id", self.username)))?;

        Ok(AccountProfile {
            id: id.into(),
            username: self.username,
            profile_pic_url: self.profile_pic_url,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
