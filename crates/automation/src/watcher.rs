//! Low-balance watcher.
//!
//! Records come from the engine's change feed and from a periodic full scan
//! that repairs whatever the feed dropped. Per group, only the transition
//! into the low state raises an alert, and alerts are capped per rolling hour.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use engine::{BalanceRecord, BalanceSubscription, Engine, Notice, Notifier};
use tokio::time::{Instant, MissedTickBehavior, timeout};
use tokio_util::sync::CancellationToken;

use crate::lifecycle::Lifecycle;

const WINDOW: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatcherConfig {
    pub scan_interval: Duration,
    /// Hourly cap for groups without their own limit.
    pub default_limit: u32,
    pub deliver_timeout: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(10 * 60),
            default_limit: engine::DEFAULT_ALERT_LIMIT_PER_HOUR,
            deliver_timeout: Duration::from_secs(10),
        }
    }
}

/// What to do with an observed record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertDecision {
    /// Monitoring is off for the group.
    Ignore,
    /// At or above the threshold.
    Clear,
    /// Still low since the last transition.
    Suppress,
    /// New transition into the low state: deliver an alert.
    Alert,
    /// New transition, but the hourly cap is reached.
    RateLimited,
}

#[derive(Debug, Default)]
struct AlertState {
    low: bool,
    window_start: Option<Instant>,
    sent_in_window: u32,
}

/// Alert state of every observed group.
#[derive(Debug)]
pub struct AlertTracker {
    default_limit: u32,
    states: HashMap<i64, AlertState>,
}

impl AlertTracker {
    pub fn new(default_limit: u32) -> Self {
        Self {
            default_limit: default_limit.max(1),
            states: HashMap::new(),
        }
    }

    pub fn evaluate(&mut self, record: &BalanceRecord, now: Instant) -> AlertDecision {
        if !record.is_monitored() {
            return AlertDecision::Ignore;
        }

        let state = self.states.entry(record.entity_id).or_default();
        let expired = state
            .window_start
            .is_none_or(|start| now.saturating_duration_since(start) >= WINDOW);
        if expired {
            state.window_start = Some(now);
            state.sent_in_window = 0;
        }

        if !record.is_below_threshold() {
            state.low = false;
            return AlertDecision::Clear;
        }
        if state.low {
            return AlertDecision::Suppress;
        }

        state.low = true;
        let limit = match record.alert_limit_per_hour {
            0 => self.default_limit,
            limit => limit,
        };
        if state.sent_in_window >= limit {
            return AlertDecision::RateLimited;
        }
        state.sent_in_window += 1;
        AlertDecision::Alert
    }
}

pub struct BalanceWatcher {
    engine: Arc<Engine>,
    notifier: Arc<dyn Notifier>,
    config: WatcherConfig,
    lifecycle: Lifecycle,
}

impl BalanceWatcher {
    /// The watcher stops when `shutdown` is cancelled or on [`stop`].
    ///
    /// [`stop`]: BalanceWatcher::stop
    pub fn new(
        engine: Arc<Engine>,
        notifier: Arc<dyn Notifier>,
        config: WatcherConfig,
        shutdown: &CancellationToken,
    ) -> Self {
        Self {
            engine,
            notifier,
            config,
            lifecycle: Lifecycle::new("balance watcher", shutdown.child_token()),
        }
    }

    /// Subscribes to the change feed and spawns the event loop. The first
    /// full scan runs right away.
    pub fn start(&self) {
        let watch = WatchLoop {
            engine: Arc::clone(&self.engine),
            notifier: Arc::clone(&self.notifier),
            config: self.config,
            token: self.lifecycle.token().clone(),
            tracker: AlertTracker::new(self.config.default_limit),
        };
        let changes = self.engine.subscribe();
        self.lifecycle.spawn(watch.run(changes));
    }

    pub async fn stop(&self) {
        self.lifecycle.stop().await;
    }
}

struct WatchLoop {
    engine: Arc<Engine>,
    notifier: Arc<dyn Notifier>,
    config: WatcherConfig,
    token: CancellationToken,
    tracker: AlertTracker,
}

impl WatchLoop {
    async fn run(mut self, mut changes: BalanceSubscription) {
        tracing::info!("balance watcher started");
        let mut scan = tokio::time::interval(self.config.scan_interval);
        scan.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let flow = tokio::select! {
                _ = self.token.cancelled() => ControlFlow::Break(()),
                change = changes.recv() => match change {
                    Some(record) => self.observe(&record).await,
                    None => {
                        tracing::warn!("balance change feed closed");
                        ControlFlow::Break(())
                    }
                },
                _ = scan.tick() => self.scan().await,
            };
            if flow.is_break() {
                break;
            }
        }

        tracing::info!("balance watcher stopped");
    }

    async fn scan(&mut self) -> ControlFlow<()> {
        let records = match self.engine.list_balances().await {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!("balance scan failed: {err}");
                return ControlFlow::Continue(());
            }
        };
        tracing::debug!("scanning {} balances", records.len());
        for record in &records {
            self.observe(record).await?;
        }
        ControlFlow::Continue(())
    }

    async fn observe(&mut self, record: &BalanceRecord) -> ControlFlow<()> {
        let entity_id = record.entity_id;
        match self.tracker.evaluate(record, Instant::now()) {
            AlertDecision::Alert => {}
            AlertDecision::RateLimited => {
                tracing::debug!("group {entity_id}: low balance alert dropped, hourly limit reached");
                return ControlFlow::Continue(());
            }
            AlertDecision::Ignore | AlertDecision::Clear | AlertDecision::Suppress => {
                return ControlFlow::Continue(());
            }
        }

        let notice = Notice::LowBalance {
            balance: record.balance,
            min_balance: record.min_balance,
        };
        let delivery = timeout(
            self.config.deliver_timeout,
            self.notifier.deliver(entity_id, &notice),
        );
        tokio::select! {
            _ = self.token.cancelled() => return ControlFlow::Break(()),
            delivered = delivery => match delivered {
                Ok(Ok(())) => tracing::info!(
                    "group {entity_id}: low balance alert sent ({} < {})",
                    record.balance,
                    record.min_balance
                ),
                Ok(Err(err)) => tracing::warn!("group {entity_id}: low balance alert failed: {err}"),
                Err(_) => tracing::warn!("group {entity_id}: low balance alert timed out"),
            },
        }
        ControlFlow::Continue(())
    }
}
