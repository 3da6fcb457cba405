//! One sync run over every configured target
//!
//! Accounts are walked, reconciled and cleaned up in parallel. Unsent items of
//! all accounts are then delivered one by one, oldest first across accounts, so
//! the channels see posts in the order they were taken.

use std::sync::Arc;

use futures_util::{StreamExt, stream};
use tracing::info;

use super::engine::{AccountPlan, MirrorTarget, PassGuard, PassReport, SyncEngine, log_report};
use crate::error::SyncResult;

/// Default number of accounts planned at the same time
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Outcome of one run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// One report per target, in target order
    pub passes: Vec<PassReport>,
}

impl RunReport {
    pub fn delivered(&self) -> usize {
        self.passes.iter().map(|p| p.delivered).sum()
    }

    pub fn retracted(&self) -> usize {
        self.passes.iter().map(|p| p.retracted).sum()
    }

    pub fn failed(&self) -> usize {
        self.passes.iter().map(|p| p.failed + p.retract_failed).sum()
    }

    pub fn aborted(&self) -> usize {
        self.passes.iter().filter(|p| p.error.is_some()).count()
    }

    pub fn is_clean(&self) -> bool {
        self.passes.iter().all(PassReport::is_clean)
    }
}

/// A target whose plan succeeded and whose missing items were handled
struct Prepared {
    _guard: PassGuard,
    plan: AccountPlan,
}

/// Runs passes for many targets over one shared engine
pub struct Runner {
    engine: Arc<SyncEngine>,
    concurrency: usize,
}

impl Runner {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Run one pass for every target
    ///
    /// A target that fails to plan is reported as aborted and does not stop
    /// the others.
    pub async fn run_once(&self, targets: &[MirrorTarget]) -> RunReport {
        info!("Starting run over {} targets", targets.len());

        let mut results: Vec<(usize, SyncResult<Prepared>, PassReport)> =
            stream::iter(targets.iter().enumerate())
                .map(|(index, target)| async move {
                    let mut report = PassReport::new(target);
                    let prepared = self.prepare(target, &mut report).await;
                    (index, prepared, report)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
        results.sort_by_key(|(index, _, _)| *index);

        let mut plans = Vec::with_capacity(results.len());
        let mut reports = Vec::with_capacity(results.len());
        for (index, prepared, report) in results {
            match prepared {
                Ok(prepared) => plans.push(Some(prepared)),
                Err(e) => {
                    reports.push(PassReport::aborted(&targets[index], &e));
                    plans.push(None);
                    continue;
                }
            }
            reports.push(report);
        }

        // Global delivery queue, oldest first; ties keep target order
        let mut queue = Vec::new();
        for (index, prepared) in plans.iter_mut().enumerate() {
            if let Some(prepared) = prepared {
                let unsent = std::mem::take(&mut prepared.plan.reconciliation.unsent);
                queue.extend(unsent.into_iter().map(|item| (index, item)));
            }
        }
        queue.sort_by_key(|(index, item)| (item.taken_at, *index));

        for (index, item) in &queue {
            if let Some(prepared) = &plans[*index] {
                self.engine
                    .deliver_and_report(&prepared.plan, item, &mut reports[*index])
                    .await;
            }
        }

        for report in &reports {
            log_report(report);
        }
        let report = RunReport { passes: reports };
        info!(
            "Run finished: {} delivered, {} retracted, {} failed, {} aborted",
            report.delivered(),
            report.retracted(),
            report.failed(),
            report.aborted()
        );
        report
    }

    /// Claim, plan and retract missing items for one target
    async fn prepare(&self, target: &MirrorTarget, report: &mut PassReport) -> SyncResult<Prepared> {
        let guard = self.engine.begin_pass(target)?;
        let plan = self.engine.plan(target).await?;
        self.engine.retract_missing(&plan, report).await;
        Ok(Prepared {
            _guard: guard,
            plan,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::Compositor;
    use crate::error::SyncError;
    use crate::storage::WatermarkStore;
    use crate::test_support::{FakeChannel, FakeFeed, at, item};

    struct Setup {
        feed: Arc<FakeFeed>,
        channel: Arc<FakeChannel>,
        runner: Runner,
        engine: Arc<SyncEngine>,
    }

    fn setup(accounts: &[&str]) -> Setup {
        let feed = Arc::new(FakeFeed::default());
        let channel = Arc::new(FakeChannel::new("hook"));
        let store = Arc::new(WatermarkStore::open_in_memory().unwrap());
        for account in accounts {
            store.get_or_create_account(account, "hook", at(0)).unwrap();
        }
        let engine = Arc::new(SyncEngine::new(feed.clone(), store, Compositor::default()));
        let runner = Runner::new(engine.clone()).with_concurrency(2);
        Setup {
            feed,
            channel,
            runner,
            engine,
        }
    }

    fn targets(setup: &Setup, accounts: &[&str]) -> Vec<MirrorTarget> {
        accounts
            .iter()
            .map(|a| MirrorTarget::new(*a, setup.channel.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_delivery_ordered_across_accounts() {
        let s = setup(&["x", "y"]);
        s.feed
            .set_account_pages("x", vec![vec![item("x3", 300), item("x1", 100)]]);
        s.feed.set_account_pages("y", vec![vec![item("y2", 200)]]);

        let report = s.runner.run_once(&targets(&s, &["x", "y"])).await;

        assert_eq!(report.delivered(), 3);
        assert!(report.is_clean());
        assert_eq!(s.feed.downloads(), vec!["x1", "y2", "x3"]);
        assert_eq!(report.passes[0].delivered, 2);
        assert_eq!(report.passes[1].delivered, 1);
    }

    #[tokio::test]
    async fn test_failing_account_does_not_block_others() {
        let s = setup(&["x", "y"]);
        s.feed.set_account_pages("x", vec![vec![item("x1", 100)]]);
        s.feed.fail_account("y");

        let report = s.runner.run_once(&targets(&s, &["x", "y"])).await;

        assert_eq!(report.delivered(), 1);
        assert_eq!(report.aborted(), 1);
        assert!(report.passes[0].error.is_none());
        assert!(report.passes[1].error.is_some());
        assert_eq!(s.channel.sent_captions(), vec!["caption x1"]);
    }

    #[tokio::test]
    async fn test_missing_items_retracted_before_delivery() {
        let s = setup(&["x"]);
        s.feed.set_account_pages("x", vec![vec![item("old", 100)]]);
        s.runner.run_once(&targets(&s, &["x"])).await;

        s.feed.set_account_pages("x", vec![vec![item("new", 200)]]);
        let report = s.runner.run_once(&targets(&s, &["x"])).await;

        assert_eq!((report.retracted(), report.delivered()), (1, 1));
        assert_eq!(s.channel.retracted().len(), 1);
        assert_eq!(s.channel.sent_captions(), vec!["caption old", "caption new"]);
    }

    #[tokio::test]
    async fn test_duplicate_target_rejected_within_run() {
        let s = setup(&["x"]);
        s.feed.set_account_pages("x", vec![vec![item("x1", 100)]]);
        let guard = s
            .engine
            .begin_pass(&MirrorTarget::new("x", s.channel.clone()))
            .unwrap();

        let report = s.runner.run_once(&targets(&s, &["x"])).await;
        assert_eq!(report.aborted(), 1);
        assert!(s.channel.sent().is_empty());

        drop(guard);
        let report = s.runner.run_once(&targets(&s, &["x"])).await;
        assert_eq!(report.delivered(), 1);
    }

    #[test]
    fn test_run_report_totals() {
        let report = RunReport {
            passes: vec![
                PassReport {
                    delivered: 2,
                    failed: 1,
                    retracted: 1,
                    ..Default::default()
                },
                PassReport {
                    error: Some(SyncError::UnknownMediaKind(3).to_string()),
                    ..Default::default()
                },
            ],
        };
        assert_eq!(report.delivered(), 2);
        assert_eq!(report.retracted(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.aborted(), 1);
        assert!(!report.is_clean());
    }
}
