//! Instagram to Discord mirror library
//!
//! Mirrors the posts of Instagram accounts into Discord webhooks: new posts are
//! delivered once, oldest first, and posts deleted on Instagram are retracted
//! from Discord.
//!
//! # Architecture
//!
//! ```text
//! Instagram feed ──walk──▶ Reconciler ──unsent──▶ Compositor ──▶ Discord webhook
//!                              │    └──missing──────────────────▶ (delete message)
//!                              └── Watermark Store (SQLite)
//! ```
//!
//! # Usage
//!
//! ```bash
//! # Set environment variables
//! export INSTAGRAM_SESSIONID=your_session_cookie
//! export OPTIONS_PATH=options.json       # optional
//! export DATABASE_PATH=database.db       # optional
//!
//! # Run one pass over every configured account
//! ig-discord-mirror
//! ```
//!
//! The options file lists the mirrored accounts:
//!
//! ```json
//! {
//!   "accounts": [{"igaccount": "natgeo", "webhook": "https://discord.com/api/webhooks/1/token"}],
//!   "grid_width": 2,
//!   "grid_padding": 20
//! }
//! ```

pub mod channel;
pub mod compositor;
pub mod config;
pub mod error;
pub mod feed;
pub mod media_cache;
pub mod storage;
pub mod sync;
pub mod types;

#[cfg(test)]
mod test_support;

pub use channel::{DiscordWebhook, NotificationChannel};
pub use compositor::{Compositor, GridLayout};
pub use config::MirrorConfig;
pub use error::{SyncError, SyncResult};
pub use feed::{FeedClient, InstagramClient};
pub use storage::WatermarkStore;
pub use sync::{MirrorTarget, Runner, SyncEngine};
pub use types::*;

/// Prelude for common imports
pub mod prelude {
    pub use crate::channel::{DiscordWebhook, NotificationChannel};
    pub use crate::compositor::{Compositor, GridLayout};
    pub use crate::config::MirrorConfig;
    pub use crate::error::{SyncError, SyncResult};
    pub use crate::feed::{FeedClient, InstagramClient};
    pub use crate::storage::WatermarkStore;
    pub use crate::sync::{MirrorTarget, RunReport, Runner, SyncEngine, resolve_targets};
    pub use crate::types::*;
}
