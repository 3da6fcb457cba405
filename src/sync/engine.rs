//! Delivery orchestrator
//!
//! One pass for one account runs WALK -> RECONCILE -> DELIVER* -> RETRACT*.
//! Delivery of an item is strictly ordered:
//!
//! ```text
//! pending record -> download -> compose -> send -> record reference
//! ```
//!
//! so an interrupted pass leaves the item unrecorded, pending (retried by the
//! next pass) or delivered. A crash between a successful send and recording
//! its reference re-sends the item on the next pass.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::reconciler::{Reconciliation, reconcile};
use crate::channel::NotificationChannel;
use crate::compositor::{Compositor, Page};
use crate::error::{SyncError, SyncResult};
use crate::feed::{FeedClient, FeedWalker};
use crate::media_cache::MediaCache;
use crate::storage::{AccountRecord, WatermarkStore};
use crate::types::{
    AccountProfile, DeliveryReference, MediaKind, OutgoingPost, RemoteItem, RetractOutcome,
};

/// A remote account mirrored into one channel
#[derive(Clone)]
pub struct MirrorTarget {
    pub remote_account_id: String,
    pub channel: Arc<dyn NotificationChannel>,
}

impl MirrorTarget {
    pub fn new(remote_account_id: impl Into<String>, channel: Arc<dyn NotificationChannel>) -> Self {
        Self {
            remote_account_id: remote_account_id.into(),
            channel,
        }
    }

    fn key(&self) -> (String, String) {
        (
            self.remote_account_id.clone(),
            self.channel.channel_id().to_string(),
        )
    }
}

/// Everything learned about one account before delivery starts
pub struct AccountPlan {
    pub target: MirrorTarget,
    pub account: AccountRecord,
    pub author: AccountProfile,
    pub reconciliation: Reconciliation,
}

/// Outcome counters of one account's pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub remote_account_id: String,
    pub channel_id: String,
    pub delivered: usize,
    pub failed: usize,
    pub retracted: usize,
    pub retract_failed: usize,
    /// Set when the pass could not run at all
    pub error: Option<String>,
}

impl PassReport {
    pub fn new(target: &MirrorTarget) -> Self {
        Self {
            remote_account_id: target.remote_account_id.clone(),
            channel_id: target.channel.channel_id().to_string(),
            ..Default::default()
        }
    }

    pub fn aborted(target: &MirrorTarget, error: &SyncError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(target)
        }
    }

    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.failed == 0 && self.retract_failed == 0
    }
}

/// Marks an account/channel pair as having a pass in flight
pub struct PassGuard {
    active: Arc<Mutex<HashSet<(String, String)>>>,
    key: (String, String),
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.active.lock().remove(&self.key);
    }
}

/// Sync engine shared by all accounts of a run
pub struct SyncEngine {
    feed: Arc<dyn FeedClient>,
    store: Arc<WatermarkStore>,
    compositor: Compositor,
    scratch_root: Option<PathBuf>,
    active: Arc<Mutex<HashSet<(String, String)>>>,
}

impl SyncEngine {
    pub fn new(feed: Arc<dyn FeedClient>, store: Arc<WatermarkStore>, compositor: Compositor) -> Self {
        Self {
            feed,
            store,
            compositor,
            scratch_root: None,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Create per-item scratch directories under `root` instead of the system temp dir
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn store(&self) -> &WatermarkStore {
        &self.store
    }

    /// Claim the target for one pass; fails if another pass holds it
    pub fn begin_pass(&self, target: &MirrorTarget) -> SyncResult<PassGuard> {
        let key = target.key();
        if !self.active.lock().insert(key.clone()) {
            return Err(SyncError::PassInProgress {
                remote_account_id: key.0,
                channel_id: key.1,
            });
        }
        Ok(PassGuard {
            active: self.active.clone(),
            key,
        })
    }

    /// Run one complete pass for a single account
    pub async fn sync_account(&self, target: &MirrorTarget) -> SyncResult<PassReport> {
        let _guard = self.begin_pass(target)?;

        let mut plan = self.plan(target).await?;
        let mut report = PassReport::new(target);

        let unsent = std::mem::take(&mut plan.reconciliation.unsent);
        for item in &unsent {
            self.deliver_and_report(&plan, item, &mut report).await;
        }
        self.retract_missing(&plan, &mut report).await;

        log_report(&report);
        Ok(report)
    }

    /// Load the account record, walk the feed and reconcile
    ///
    /// A failure while walking aborts the plan: without the complete item
    /// list neither unsent nor missing items can be decided.
    pub async fn plan(&self, target: &MirrorTarget) -> SyncResult<AccountPlan> {
        let account = self.store.get_or_create_account(
            &target.remote_account_id,
            target.channel.channel_id(),
            Utc::now(),
        )?;
        let author = self.author(&account).await?;

        let fetched = FeedWalker::new(self.feed.as_ref(), &account.remote_account_id, account.watermark)
            .collect_all()
            .await?;
        let records = self.store.items_for_account(account.id)?;
        let reconciliation = reconcile(&fetched, &records, account.watermark);

        info!(
            "Account {} -> {}: {} items since {}, {} unsent, {} missing",
            account.remote_account_id,
            account.destination_channel_id,
            fetched.len(),
            account.watermark,
            reconciliation.unsent.len(),
            reconciliation.missing.len()
        );

        Ok(AccountPlan {
            target: target.clone(),
            account,
            author,
            reconciliation,
        })
    }

    /// Author profile, refreshing the username hint; falls back to the hint
    async fn author(&self, account: &AccountRecord) -> SyncResult<AccountProfile> {
        match self.feed.account_profile(&account.remote_account_id).await {
            Ok(profile) => {
                if account.hint_username.as_deref() != Some(profile.username.as_str()) {
                    self.store.update_hint_username(account.id, &profile.username)?;
                }
                Ok(profile)
            }
            Err(e) => {
                warn!(
                    "Failed to fetch profile of {}, using cached name: {}",
                    account.remote_account_id, e
                );
                Ok(AccountProfile {
                    id: account.remote_account_id.clone(),
                    username: account
                        .hint_username
                        .clone()
                        .unwrap_or_else(|| account.remote_account_id.clone()),
                    profile_pic_url: None,
                })
            }
        }
    }

    /// Deliver one item and record the outcome
    pub async fn deliver(&self, plan: &AccountPlan, item: &RemoteItem) -> SyncResult<DeliveryReference> {
        if let MediaKind::Unknown(code) = item.kind {
            return Err(SyncError::UnknownMediaKind(code));
        }

        let account_id = plan.account.id;
        self.store.begin_delivery(account_id, &item.id)?;

        // Dropped on every return path below, removing all scratch files
        let cache = MediaCache::new(self.scratch_root.as_deref())?;

        let assets = self.feed.download_assets(item, &cache).await?;
        debug!("Item {}: {} assets downloaded", item.id, assets.len());

        let compositor = self.compositor;
        let out_dir = cache.path().to_path_buf();
        let pages = tokio::task::spawn_blocking(move || compositor.compose(&assets, &out_dir)).await??;

        let post = OutgoingPost {
            author_name: plan.author.username.clone(),
            author_icon_url: plan.author.profile_pic_url.clone(),
            caption: item.caption.clone(),
            timestamp: item.taken_at,
            files: pages.into_iter().map(Page::into_path).collect(),
        };
        let reference = plan.target.channel.send(&post).await?;

        self.store.mark_delivered(account_id, &item.id, &reference)?;
        Ok(reference)
    }

    /// Deliver one item, logging and counting instead of failing
    pub async fn deliver_and_report(&self, plan: &AccountPlan, item: &RemoteItem, report: &mut PassReport) {
        match self.deliver(plan, item).await {
            Ok(reference) => {
                info!(
                    "Delivered item {} of {} as {}",
                    item.id, plan.account.remote_account_id, reference
                );
                report.delivered += 1;
            }
            Err(e) if e.is_transient() => {
                warn!(
                    "Delivery of item {} of {} failed, retrying next pass: {}",
                    item.id, plan.account.remote_account_id, e
                );
                report.failed += 1;
            }
            Err(e) => {
                error!(
                    "Delivery of item {} of {} failed: {}",
                    item.id, plan.account.remote_account_id, e
                );
                report.failed += 1;
            }
        }
    }

    /// Retract every missing item; records are kept when retraction fails
    pub async fn retract_missing(&self, plan: &AccountPlan, report: &mut PassReport) {
        for record in &plan.reconciliation.missing {
            let Some(reference) = &record.delivery_reference else {
                continue;
            };

            let outcome = match plan.target.channel.retract(reference).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        "Failed to retract {} for missing item {}: {}",
                        reference, record.remote_item_id, e
                    );
                    report.retract_failed += 1;
                    continue;
                }
            };
            if outcome == RetractOutcome::NotFound {
                debug!("Message {} was already removed", reference);
            }

            match self.store.delete_item(record.account_id, &record.remote_item_id) {
                Ok(_) => {
                    info!(
                        "Retracted item {} of {} ({})",
                        record.remote_item_id, plan.account.remote_account_id, reference
                    );
                    report.retracted += 1;
                }
                Err(e) => {
                    error!(
                        "Retracted {} but failed to delete record {}: {}",
                        reference, record.remote_item_id, e
                    );
                    report.retract_failed += 1;
                }
            }
        }
    }
}

/// Log the summary of a pass
pub fn log_report(report: &PassReport) {
    if let Some(e) = &report.error {
        error!(
            "Pass for {} -> {} aborted: {}",
            report.remote_account_id, report.channel_id, e
        );
    } else {
        info!(
            "Pass for {} -> {}: {} delivered, {} failed, {} retracted, {} retractions failed",
            report.remote_account_id,
            report.channel_id,
            report.delivered,
            report.failed,
            report.retracted,
            report.retract_failed
        );
    }
}
