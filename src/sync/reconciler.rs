//! Unsent/missing computation for one account

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::storage::ItemRecord;
use crate::types::RemoteItem;

/// Outcome of comparing one full feed walk with the stored item records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Items to deliver, oldest first
    pub unsent: Vec<RemoteItem>,
    /// Delivered records whose remote item is gone
    pub missing: Vec<ItemRecord>,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.unsent.is_empty() && self.missing.is_empty()
    }
}

/// Compare the complete fetched item list with the account's item records
///
/// Items already delivered are skipped. Records without a delivery reference
/// are never reported missing; their items stay unsent until a send succeeds.
pub fn reconcile(
    fetched: &[RemoteItem],
    records: &[ItemRecord],
    watermark: DateTime<Utc>,
) -> Reconciliation {
    let delivered: HashSet<&str> = records
        .iter()
        .filter(|r| r.is_delivered())
        .map(|r| r.remote_item_id.as_str())
        .collect();
    let fetched_ids: HashSet<&str> = fetched.iter().map(|i| i.id.as_str()).collect();

    let mut seen = HashSet::new();
    let mut unsent: Vec<RemoteItem> = fetched
        .iter()
        .rev()
        .filter(|item| item.taken_at >= watermark)
        .filter(|item| !delivered.contains(item.id.as_str()))
        .filter(|item| seen.insert(item.id.as_str()))
        .cloned()
        .collect();
    unsent.sort_by_key(|item| item.taken_at);

    let missing = records
        .iter()
        .filter(|r| r.is_delivered() && !fetched_ids.contains(r.remote_item_id.as_str()))
        .cloned()
        .collect();

    Reconciliation { unsent, missing }
}
