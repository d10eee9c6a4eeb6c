//! Ledger entries.
//!
//! An entry is the immutable audit record of one accepted balance mutation.
//! `balance_after` is a snapshot taken inside the writing transaction and is
//! never recomputed.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    ManualCredit,
    ManualDebit,
    DailySettlement,
    ThresholdChange,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManualCredit => "manual_credit",
            Self::ManualDebit => "manual_debit",
            Self::DailySettlement => "daily_settlement",
            Self::ThresholdChange => "threshold_change",
        }
    }
}

impl TryFrom<&str> for EntryKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "manual_credit" => Ok(Self::ManualCredit),
            "manual_debit" => Ok(Self::ManualDebit),
            "daily_settlement" => Ok(Self::DailySettlement),
            "threshold_change" => Ok(Self::ThresholdChange),
            other => Err(EngineError::InvalidRecord(format!(
                "invalid entry kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub entity_id: i64,
    /// `0` for system-initiated entries.
    pub actor_id: i64,
    pub delta: MoneyCents,
    pub balance_after: MoneyCents,
    pub kind: EntryKind,
    pub remark: Option<String>,
    pub operation_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ledger_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub entity_id: i64,
    pub actor_id: i64,
    pub delta: i64,
    pub balance_after: i64,
    pub kind: String,
    pub remark: Option<String>,
    pub operation_id: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&LedgerEntry> for ActiveModel {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            id: ActiveValue::Set(entry.id.to_string()),
            entity_id: ActiveValue::Set(entry.entity_id),
            actor_id: ActiveValue::Set(entry.actor_id),
            delta: ActiveValue::Set(entry.delta.cents()),
            balance_after: ActiveValue::Set(entry.balance_after.cents()),
            kind: ActiveValue::Set(entry.kind.as_str().to_string()),
            remark: ActiveValue::Set(entry.remark.clone()),
            operation_id: ActiveValue::Set(entry.operation_id.clone()),
            created_at: ActiveValue::Set(entry.created_at),
        }
    }
}

impl TryFrom<Model> for LedgerEntry {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::InvalidRecord("invalid entry id".to_string()))?,
            entity_id: model.entity_id,
            actor_id: model.actor_id,
            delta: MoneyCents::new(model.delta),
            balance_after: MoneyCents::new(model.balance_after),
            kind: EntryKind::try_from(model.kind.as_str())?,
            remark: model.remark,
            operation_id: model.operation_id,
            created_at: model.created_at,
        })
    }
}
