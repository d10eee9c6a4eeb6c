//! Background loops driving the ledger: the daily settlement scheduler and
//! the low-balance watcher.
//!
//! Both are owned objects with a `start`/`stop` lifecycle. They run on the
//! tokio runtime of the caller and stop on their own cancellation token or
//! on the parent token they were derived from.

pub use scheduler::{
    DailyScheduler, DispatchReport, MAX_CONCURRENCY, SchedulerConfig, next_daily_run,
};
pub use watcher::{AlertDecision, AlertTracker, BalanceWatcher, WatcherConfig};

mod lifecycle;
mod scheduler;
mod watcher;
