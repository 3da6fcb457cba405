//! Domain types shared by the feed, channel and sync layers

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Remote Feed Types
// =============================================================================

/// Kind of a remote post
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Single photo
    Photo,
    /// Single video (video, igtv, reel)
    Video,
    /// Ordered album of mixed photos and videos
    Album,
    /// Media type code this crate does not know how to deliver
    Unknown(i64),
}

impl MediaKind {
    /// Map an Instagram `media_type` code
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => MediaKind::Photo,
            2 => MediaKind::Video,
            8 => MediaKind::Album,
            other => MediaKind::Unknown(other),
        }
    }
}

/// Kind of a single downloadable asset
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Video,
}

impl AssetKind {
    /// Default file extension when the source URL carries none
    pub fn default_extension(self) -> &'static str {
        match self {
            AssetKind::Image => "jpg",
            AssetKind::Video => "mp4",
        }
    }
}

/// Reference to a downloadable asset of a remote item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetRef {
    pub url: String,
    pub kind: AssetKind,
}

/// A post as seen on the remote feed (read-only)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteItem {
    /// Stable post identifier
    pub id: String,
    /// Identifier of the owning account
    pub account_id: String,
    /// When the post was created
    pub taken_at: DateTime<Utc>,
    pub kind: MediaKind,
    /// Caption text (empty when the post has none)
    pub caption: String,
    /// Assets in album order
    pub assets: Vec<AssetRef>,
}

/// Public profile of a remote account, used for presentation only
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountProfile {
    pub id: String,
    pub username: String,
    pub profile_pic_url: Option<String>,
}

// =============================================================================
// Notification Channel Types
// =============================================================================

/// Identifier of a sent notification, returned by the channel on success
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct DeliveryReference(pub String);

impl DeliveryReference {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A composed post ready to be sent through a notification channel
#[derive(Debug, Clone)]
pub struct OutgoingPost {
    pub author_name: String,
    pub author_icon_url: Option<String>,
    pub caption: String,
    pub timestamp: DateTime<Utc>,
    /// Page files in presentation order
    pub files: Vec<PathBuf>,
}

/// Result of a retraction request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetractOutcome {
    /// The notification was removed
    Retracted,
    /// The channel no longer knows the notification
    NotFound,
}
