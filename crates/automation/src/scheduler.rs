//! Daily settlement scheduler.
//!
//! Once per day, shortly after local midnight of the settler's time zone, the
//! scheduler settles the previous calendar day for every balance-bearing
//! group. Groups are processed concurrently up to a fixed limit, each with a
//! small attempt budget. A timeout cancels the remainder of the dispatch:
//! running attempts finish, nothing new is started.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use engine::{
    Directory, EngineError, Group, Notice, Notifier, SettlementResult, Settler,
    previous_billing_date,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::lifecycle::Lifecycle;

/// Upper bound of [`SchedulerConfig::concurrency`].
pub const MAX_CONCURRENCY: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Delay after local midnight before the run starts.
    pub offset: Duration,
    /// Settlements in flight at once, capped at [`MAX_CONCURRENCY`].
    pub concurrency: usize,
    /// Attempts per group and day.
    pub attempts: u32,
    pub settle_timeout: Duration,
    pub deliver_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            offset: Duration::from_secs(5),
            concurrency: MAX_CONCURRENCY,
            attempts: 3,
            settle_timeout: Duration::from_secs(20),
            deliver_timeout: Duration::from_secs(10),
        }
    }
}

/// Outcome of one dispatch. Group ids are sorted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchReport {
    pub target_date: NaiveDate,
    pub settled: Vec<i64>,
    pub failed: Vec<i64>,
    /// Not eligible, or never started because the dispatch was aborted.
    pub skipped: Vec<i64>,
    /// A timeout or cancellation stopped the dispatch early.
    pub aborted: bool,
}

impl DispatchReport {
    fn new(target_date: NaiveDate) -> Self {
        Self {
            target_date,
            settled: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            aborted: false,
        }
    }
}

enum Outcome {
    Settled,
    Failed(EngineError),
    Skipped,
}

pub struct DailyScheduler {
    worker: Arc<SettleWorker>,
    directory: Arc<dyn Directory>,
    config: SchedulerConfig,
    lifecycle: Lifecycle,
}

/// The part of the scheduler each settlement task needs.
struct SettleWorker {
    settler: Arc<Settler>,
    notifier: Arc<dyn Notifier>,
    config: SchedulerConfig,
}

impl DailyScheduler {
    /// The scheduler stops when `shutdown` is cancelled or on [`stop`].
    ///
    /// [`stop`]: DailyScheduler::stop
    pub fn new(
        settler: Arc<Settler>,
        directory: Arc<dyn Directory>,
        notifier: Arc<dyn Notifier>,
        config: SchedulerConfig,
        shutdown: &CancellationToken,
    ) -> Self {
        Self {
            worker: Arc::new(SettleWorker {
                settler,
                notifier,
                config,
            }),
            directory,
            config,
            lifecycle: Lifecycle::new("daily scheduler", shutdown.child_token()),
        }
    }

    /// Spawns the scheduling loop on the current runtime.
    pub fn start(self: &Arc<Self>) {
        let scheduler = Arc::clone(self);
        self.lifecycle.spawn(async move { scheduler.run().await });
    }

    /// Cancels the loop and any dispatch in progress, then waits for it.
    pub async fn stop(&self) {
        self.lifecycle.stop().await;
    }

    async fn run(self: Arc<Self>) {
        let token = self.lifecycle.token().clone();
        let tz = self.worker.settler.timezone();
        tracing::info!("daily scheduler started, time zone {tz}");

        loop {
            let now = Utc::now().with_timezone(&tz);
            let next = next_daily_run(now, self.config.offset);
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::debug!("next settlement at {next}, in {}s", wait.as_secs());

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
            self.dispatch(previous_billing_date(next)).await;
        }

        tracing::info!("daily scheduler stopped");
    }

    /// Settles `target_date` for every eligible group of the directory.
    pub async fn dispatch(&self, target_date: NaiveDate) -> DispatchReport {
        let mut report = DispatchReport::new(target_date);
        let groups = match self.directory.list_active_groups().await {
            Ok(groups) => groups,
            Err(err) => {
                tracing::error!("settlement {target_date}: failed to list groups: {err}");
                return report;
            }
        };

        let token = self.lifecycle.token().child_token();
        let permits = Arc::new(Semaphore::new(
            self.config.concurrency.clamp(1, MAX_CONCURRENCY),
        ));
        let mut tasks = JoinSet::new();

        for group in groups {
            if !group.is_settleable() {
                report.skipped.push(group.id);
                continue;
            }
            let worker = Arc::clone(&self.worker);
            let permits = Arc::clone(&permits);
            let token = token.clone();
            tasks.spawn(async move {
                let entity_id = group.id;
                let permit = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    permit = permits.acquire_owned() => permit.ok(),
                };
                let Some(_permit) = permit else {
                    return (entity_id, Outcome::Skipped);
                };
                if token.is_cancelled() {
                    return (entity_id, Outcome::Skipped);
                }

                match worker.settle(&group, target_date, &token).await {
                    Ok(_) => (entity_id, Outcome::Settled),
                    Err(err) => {
                        if err.is_cancellation() {
                            token.cancel();
                        }
                        (entity_id, Outcome::Failed(err))
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((entity_id, Outcome::Settled)) => report.settled.push(entity_id),
                Ok((entity_id, Outcome::Skipped)) => report.skipped.push(entity_id),
                Ok((entity_id, Outcome::Failed(err))) => {
                    tracing::error!(
                        "group {entity_id}: settlement for {target_date} abandoned: {err}"
                    );
                    report.failed.push(entity_id);
                }
                Err(err) => tracing::error!("settlement task failed: {err}"),
            }
        }

        report.aborted = token.is_cancelled();
        report.settled.sort_unstable();
        report.failed.sort_unstable();
        report.skipped.sort_unstable();
        tracing::info!(
            "settlement {target_date}: {} settled, {} failed, {} skipped{}",
            report.settled.len(),
            report.failed.len(),
            report.skipped.len(),
            if report.aborted { ", aborted" } else { "" }
        );
        report
    }
}

impl SettleWorker {
    async fn settle(
        &self,
        group: &Group,
        target_date: NaiveDate,
        token: &CancellationToken,
    ) -> Result<SettlementResult, EngineError> {
        let attempts = self.config.attempts.max(1);
        let mut attempt = 1;
        loop {
            if token.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            match self.attempt(group, target_date).await {
                Ok(result) => return Ok(result),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    tracing::warn!(
                        "group {}: settlement attempt {attempt}/{attempts} failed: {err}",
                        group.id
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Settles and reports to the group. A retry after a failed report
    /// replays the settlement and reports again.
    async fn attempt(
        &self,
        group: &Group,
        target_date: NaiveDate,
    ) -> Result<SettlementResult, EngineError> {
        let result = timeout(
            self.config.settle_timeout,
            self.settler.settle_daily(group, target_date),
        )
        .await
        .map_err(|_| EngineError::Timeout(format!("settlement of group {}", group.id)))??;

        let notice = Notice::Settlement(result.clone());
        timeout(
            self.config.deliver_timeout,
            self.notifier.deliver(group.id, &notice),
        )
        .await
        .map_err(|_| EngineError::Timeout(format!("settlement report to group {}", group.id)))?
        .map_err(|err| EngineError::Delivery(err.to_string()))?;

        Ok(result)
    }
}

/// First local midnight plus `offset` strictly after `now`.
pub fn next_daily_run(now: DateTime<Tz>, offset: Duration) -> DateTime<Tz> {
    let tz = now.timezone();
    let offset = TimeDelta::from_std(offset).unwrap_or_default();
    let run_on = |date: NaiveDate| local_midnight(tz, date).map(|midnight| midnight + offset);

    let today = now.date_naive();
    if let Some(run) = run_on(today)
        && run > now
    {
        return run;
    }
    today
        .succ_opt()
        .and_then(run_on)
        .unwrap_or_else(|| now + TimeDelta::days(1))
}

fn local_midnight(tz: Tz, date: NaiveDate) -> Option<DateTime<Tz>> {
    let midnight = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight).earliest().or_else(|| {
        tz.from_local_datetime(&(midnight + TimeDelta::hours(1)))
            .earliest()
    })
}
