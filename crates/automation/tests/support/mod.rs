#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use sea_orm::Database;
use tokio::sync::mpsc;

use engine::{
    Billing, CollaboratorError, DailySummary, Directory, Engine, Group, GroupTier,
    InterfaceBinding, Notice, Notifier, SummaryItem,
};
use migration::MigratorTrait;

pub async fn engine_with_db() -> Arc<Engine> {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    Arc::new(Engine::builder().database(db).build().await.unwrap())
}

pub fn group(id: i64, tier: GroupTier, interfaces: &[&str]) -> Group {
    Group {
        id,
        title: format!("group {id}"),
        tier,
        bindings: interfaces
            .iter()
            .map(|interface_id| InterfaceBinding {
                interface_id: interface_id.to_string(),
                display_name: String::new(),
                rate: "2%".to_string(),
            })
            .collect(),
    }
}

pub struct StaticDirectory(pub Vec<Group>);

#[async_trait]
impl Directory for StaticDirectory {
    async fn list_active_groups(&self) -> Result<Vec<Group>, CollaboratorError> {
        Ok(self.0.clone())
    }

    async fn group(&self, id: i64) -> Result<Option<Group>, CollaboratorError> {
        Ok(self.0.iter().find(|group| group.id == id).cloned())
    }
}

/// Reports `gross` for `date` after failing `failures` times with `error`.
pub struct ScriptedBilling {
    pub date: String,
    pub gross: String,
    pub error: CollaboratorError,
    pub failures: AtomicU32,
    pub calls: AtomicU32,
}

impl ScriptedBilling {
    pub fn new(date: &str, gross: &str) -> Self {
        Self {
            date: date.to_string(),
            gross: gross.to_string(),
            error: CollaboratorError::Failed("upstream error".to_string()),
            failures: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(mut self, times: u32, error: CollaboratorError) -> Self {
        self.error = error;
        self.failures = AtomicU32::new(times);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Billing for ScriptedBilling {
    async fn daily_summary(
        &self,
        _interface_id: &str,
        _start: DateTime<Tz>,
        _end: DateTime<Tz>,
    ) -> Result<DailySummary, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(self.error.clone());
        }
        Ok(DailySummary {
            items: vec![SummaryItem {
                date: self.date.clone(),
                gross_amount: self.gross.clone(),
            }],
        })
    }
}

/// Never answers.
#[derive(Default)]
pub struct HangingBilling {
    pub calls: AtomicU32,
}

#[async_trait]
impl Billing for HangingBilling {
    async fn daily_summary(
        &self,
        _interface_id: &str,
        _start: DateTime<Tz>,
        _end: DateTime<Tz>,
    ) -> Result<DailySummary, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// Answers after `delay`, recording the highest number of queries in flight.
pub struct SlowBilling {
    pub delay: Duration,
    in_flight: AtomicU32,
    pub peak: AtomicU32,
}

impl SlowBilling {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            in_flight: AtomicU32::new(0),
            peak: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Billing for SlowBilling {
    async fn daily_summary(
        &self,
        _interface_id: &str,
        _start: DateTime<Tz>,
        _end: DateTime<Tz>,
    ) -> Result<DailySummary, CollaboratorError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(DailySummary::default())
    }
}

/// Forwards delivered notices to a channel, after failing `failures` times.
pub struct RecordingNotifier {
    sender: mpsc::UnboundedSender<(i64, Notice)>,
    failures: AtomicU32,
    pub calls: AtomicU32,
}

impl RecordingNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(i64, Notice)>) {
        Self::failing(0)
    }

    pub fn failing(times: u32) -> (Self, mpsc::UnboundedReceiver<(i64, Notice)>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let notifier = Self {
            sender,
            failures: AtomicU32::new(times),
            calls: AtomicU32::new(0),
        };
        (notifier, receiver)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, entity_id: i64, notice: &Notice) -> Result<(), CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(CollaboratorError::Failed("chat unreachable".to_string()));
        }
        self.sender
            .send((entity_id, notice.clone()))
            .map_err(|err| CollaboratorError::Failed(err.to_string()))
    }
}
