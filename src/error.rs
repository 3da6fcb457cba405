//! Error taxonomy for a sync pass

use crate::compositor::CompositeError;
use crate::storage::StorageError;

/// Errors raised while walking, delivering or retracting items
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Composition error: {0}")]
    Composite(#[from] CompositeError),

    #[error("Unknown media kind {0}")]
    UnknownMediaKind(i64),

    #[error("A pass for {remote_account_id} -> {channel_id} is already running")]
    PassInProgress {
        remote_account_id: String,
        channel_id: String,
    },

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    /// Whether the failure is an I/O failure that the next pass retries
    ///
    /// A malformed response counts as one: it comes from the same fetch.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Http(_)
                | SyncError::Api { .. }
                | SyncError::Io(_)
                | SyncError::Decode(_)
                | SyncError::Other(_)
        )
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
