//! Database models for the watermark store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::DeliveryReference;

/// One mirrored (remote account, destination channel) pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountRecord {
    /// Unique database ID
    pub id: i64,
    /// Remote account identifier
    pub remote_account_id: String,
    /// Destination channel identifier
    pub destination_channel_id: String,
    /// Items created before this instant are never examined
    pub watermark: DateTime<Utc>,
    /// Last seen username, presentation only
    pub hint_username: Option<String>,
}

/// One remote item ever selected for delivery under an account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemRecord {
    /// Owning account ID
    pub account_id: i64,
    /// Remote item identifier (unique per account)
    pub remote_item_id: String,
    /// Sent notification; `None` while delivery is unconfirmed
    pub delivery_reference: Option<DeliveryReference>,
}

impl ItemRecord {
    /// Create a record for an item whose delivery has not been confirmed yet
    pub fn pending(account_id: i64, remote_item_id: impl Into<String>) -> Self {
        Self {
            account_id,
            remote_item_id: remote_item_id.into(),
            delivery_reference: None,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.delivery_reference.is_some()
    }
}
