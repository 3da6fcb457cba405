//! Storage module for sync state
//!
//! Provides SQLite-based persistence for:
//! - Account records (one per mirrored account/channel pair, with its watermark)
//! - Item records (per-account seen set and delivery status)

mod models;
mod sqlite;

pub use models::{AccountRecord, ItemRecord};
pub use sqlite::{StorageError, StorageResult, WatermarkStore};
