//! Per-group ledger.
//!
//! The engine owns the persisted balance of every group together with its
//! append-only log of adjustments, and exposes the operations built on top
//! of it: manual credits/debits, threshold configuration and the daily
//! usage settlement. Every applied write is announced on a change feed that
//! the balance watcher subscribes to.

use sea_orm::DatabaseConnection;

pub use balances::BalanceRecord;
pub use commands::Adjustment;
pub use error::EngineError;
pub use events::{BalanceEvents, BalanceSubscription};
pub use ledger_entries::{EntryKind, LedgerEntry};
pub use money::MoneyCents;
pub use ops::Adjusted;
pub use ports::{
    Authorizer, Billing, CollaboratorError, DailySummary, Directory, Group, GroupTier,
    InterfaceBinding, Notice, Notifier, SummaryItem,
};
pub use settlement::{
    SettlementItem, SettlementResult, Settler, normalize_summary_date, parse_rate_percent,
    previous_billing_date, settlement_operation_id,
};

mod balances;
mod commands;
mod error;
mod events;
mod ledger_entries;
mod money;
mod ops;
mod ports;
mod settlement;

type ResultEngine<T> = Result<T, EngineError>;

/// Alerts per hour used when a group has no explicit limit.
pub const DEFAULT_ALERT_LIMIT_PER_HOUR: u32 = 3;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    events: BalanceEvents,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Subscribe to the records produced by every applied write.
    pub fn subscribe(&self) -> BalanceSubscription {
        self.events.subscribe()
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    event_capacity: Option<usize>,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Size of the change feed buffer. Slow subscribers lose the oldest
    /// events once it is full.
    pub fn event_capacity(mut self, capacity: usize) -> EngineBuilder {
        self.event_capacity = Some(capacity);
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        let events = match self.event_capacity {
            Some(capacity) => BalanceEvents::with_capacity(capacity),
            None => BalanceEvents::default(),
        };
        Ok(Engine {
            database: self.database,
            events,
        })
    }
}
