//! Per-account sync passes and multi-account runs

mod engine;
mod reconciler;
mod runner;
mod targets;

pub use engine::{AccountPlan, MirrorTarget, PassGuard, PassReport, SyncEngine, log_report};
pub use reconciler::{Reconciliation, reconcile};
pub use runner::{DEFAULT_CONCURRENCY, RunReport, Runner};
pub use targets::resolve_targets;
