//! Balance records: one row per group.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{EngineError, MoneyCents};

/// Current ledger value and monitoring configuration of a group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub entity_id: i64,
    /// Can go negative: no floor is enforced by the ledger.
    pub balance: MoneyCents,
    /// `0` disables low-balance monitoring.
    pub min_balance: MoneyCents,
    /// `0` means the watcher's default limit.
    pub alert_limit_per_hour: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BalanceRecord {
    /// The record a group without any ledger activity is treated as.
    pub fn empty(entity_id: i64) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            balance: MoneyCents::ZERO,
            min_balance: MoneyCents::ZERO,
            alert_limit_per_hour: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a low-balance threshold is configured.
    pub fn is_monitored(&self) -> bool {
        self.min_balance.is_positive()
    }

    /// `true` when monitoring is on and the balance sits under the threshold.
    pub fn is_below_threshold(&self) -> bool {
        self.is_monitored() && self.balance < self.min_balance
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "balances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub entity_id: i64,
    pub balance: i64,
    pub min_balance: i64,
    pub alert_limit_per_hour: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for BalanceRecord {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let alert_limit_per_hour = u32::try_from(model.alert_limit_per_hour).map_err(|_| {
            EngineError::InvalidRecord(format!(
                "negative alert limit for group {}",
                model.entity_id
            ))
        })?;
        Ok(Self {
            entity_id: model.entity_id,
            balance: MoneyCents::new(model.balance),
            min_balance: MoneyCents::new(model.min_balance),
            alert_limit_per_hour,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
