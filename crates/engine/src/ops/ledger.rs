use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
    prelude::*,
    sea_query::{Expr, OnConflict},
};
use uuid::Uuid;

use crate::{
    Adjustment, BalanceRecord, Engine, EngineError, EntryKind, LedgerEntry, MoneyCents,
    ResultEngine, balances, ledger_entries, with_tx,
};

/// Outcome of [`Engine::adjust`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Adjusted {
    pub record: BalanceRecord,
    /// The operation id had already been applied: nothing was written and
    /// `record` is the current state.
    pub replayed: bool,
}

impl Adjusted {
    /// The balance sits under a configured threshold.
    pub fn should_warn(&self) -> bool {
        self.record.is_below_threshold()
    }
}

impl Engine {
    /// Current record of a group, `None` if it never had ledger activity.
    pub async fn balance(&self, entity_id: i64) -> ResultEngine<Option<BalanceRecord>> {
        balances::Entity::find_by_id(entity_id)
            .one(&self.database)
            .await?
            .map(BalanceRecord::try_from)
            .transpose()
    }

    /// Every balance record, ordered by group id.
    pub async fn list_balances(&self) -> ResultEngine<Vec<BalanceRecord>> {
        balances::Entity::find()
            .order_by_asc(balances::Column::EntityId)
            .all(&self.database)
            .await?
            .into_iter()
            .map(BalanceRecord::try_from)
            .collect()
    }

    /// Most recent ledger entries of a group, newest first.
    pub async fn entries(&self, entity_id: i64, limit: u64) -> ResultEngine<Vec<LedgerEntry>> {
        ledger_entries::Entity::find()
            .filter(ledger_entries::Column::EntityId.eq(entity_id))
            .order_by_desc(ledger_entries::Column::CreatedAt)
            .limit(limit)
            .all(&self.database)
            .await?
            .into_iter()
            .map(LedgerEntry::try_from)
            .collect()
    }

    /// Applies a balance change and appends its ledger entry atomically.
    ///
    /// - The balance row is created with zero balance when missing.
    /// - With an operation id already present for the group, the write is
    ///   rolled back and the current record is returned as a replay.
    /// - A zero delta without operation id writes nothing.
    ///
    /// Applied writes are published on the change feed after commit.
    pub async fn adjust(&self, adjustment: Adjustment) -> ResultEngine<Adjusted> {
        let entity_id = adjustment.entity_id;
        if adjustment.delta.is_zero() && adjustment.operation_id.is_none() {
            let record = self
                .balance(entity_id)
                .await?
                .unwrap_or_else(|| BalanceRecord::empty(entity_id));
            return Ok(Adjusted {
                record,
                replayed: false,
            });
        }

        let db_tx = self.database.begin().await?;
        let now = Utc::now();

        // Increment first so the write lock is held before the idempotency
        // lookup.
        increment_balance(&db_tx, entity_id, adjustment.delta, now).await?;

        if let Some(key) = adjustment.operation_id.as_deref()
            && operation_applied(&db_tx, entity_id, key).await?
        {
            db_tx.rollback().await?;
            let record = self.balance(entity_id).await?.ok_or_else(|| {
                EngineError::InvalidRecord(format!(
                    "missing balance for applied operation {key} of group {entity_id}"
                ))
            })?;
            tracing::debug!("operation {key} already applied for group {entity_id}");
            return Ok(Adjusted {
                record,
                replayed: true,
            });
        }

        let record = require_balance(&db_tx, entity_id).await?;
        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            entity_id,
            actor_id: adjustment.actor_id,
            delta: adjustment.delta,
            balance_after: record.balance,
            kind: adjustment.kind,
            remark: adjustment.remark,
            operation_id: adjustment.operation_id,
            created_at: now,
        };
        ledger_entries::ActiveModel::from(&entry)
            .insert(&db_tx)
            .await?;
        db_tx.commit().await?;

        tracing::info!(
            "group {entity_id}: {} {} by {}, balance {}",
            entry.kind.as_str(),
            entry.delta,
            entry.actor_id,
            record.balance
        );
        self.events.publish(record.clone());
        Ok(Adjusted {
            record,
            replayed: false,
        })
    }

    /// Sets the low-balance threshold. `0` disables monitoring.
    ///
    /// Leaves the balance untouched and records a zero-delta
    /// [`EntryKind::ThresholdChange`] entry.
    pub async fn set_min_balance(
        &self,
        entity_id: i64,
        actor_id: i64,
        value: MoneyCents,
    ) -> ResultEngine<BalanceRecord> {
        if value.is_negative() {
            return Err(EngineError::InvalidThreshold(
                "min balance must be >= 0".to_string(),
            ));
        }

        let record = with_tx!(self, |db_tx| {
            let now = Utc::now();
            let model = balances::ActiveModel {
                min_balance: ActiveValue::Set(value.cents()),
                ..new_balance_row(entity_id, now)
            };
            upsert_columns(
                &db_tx,
                model,
                [balances::Column::MinBalance, balances::Column::UpdatedAt],
            )
            .await?;
            append_threshold_entry(
                &db_tx,
                entity_id,
                actor_id,
                format!("min_balance={value}"),
                now,
            )
            .await
        })?;

        self.events.publish(record.clone());
        Ok(record)
    }

    /// Sets the hourly alert cap. Must be > 0.
    pub async fn set_alert_limit(
        &self,
        entity_id: i64,
        actor_id: i64,
        limit: u32,
    ) -> ResultEngine<BalanceRecord> {
        let stored = i32::try_from(limit)
            .ok()
            .filter(|limit| *limit > 0)
            .ok_or_else(|| {
                EngineError::InvalidThreshold("alert limit must be a positive integer".to_string())
            })?;

        let record = with_tx!(self, |db_tx| {
            let now = Utc::now();
            let model = balances::ActiveModel {
                alert_limit_per_hour: ActiveValue::Set(stored),
                ..new_balance_row(entity_id, now)
            };
            upsert_columns(
                &db_tx,
                model,
                [
                    balances::Column::AlertLimitPerHour,
                    balances::Column::UpdatedAt,
                ],
            )
            .await?;
            append_threshold_entry(
                &db_tx,
                entity_id,
                actor_id,
                format!("alert_limit_per_hour={limit}"),
                now,
            )
            .await
        })?;

        self.events.publish(record.clone());
        Ok(record)
    }
}

fn new_balance_row(entity_id: i64, now: DateTime<Utc>) -> balances::ActiveModel {
    balances::ActiveModel {
        entity_id: ActiveValue::Set(entity_id),
        balance: ActiveValue::Set(0),
        min_balance: ActiveValue::Set(0),
        alert_limit_per_hour: ActiveValue::Set(0),
        created_at: ActiveValue::Set(now),
        updated_at: ActiveValue::Set(now),
    }
}

async fn increment_balance(
    db_tx: &DatabaseTransaction,
    entity_id: i64,
    delta: MoneyCents,
    now: DateTime<Utc>,
) -> ResultEngine<()> {
    let model = balances::ActiveModel {
        balance: ActiveValue::Set(delta.cents()),
        ..new_balance_row(entity_id, now)
    };
    balances::Entity::insert(model)
        .on_conflict(
            OnConflict::column(balances::Column::EntityId)
                .value(
                    balances::Column::Balance,
                    Expr::col(balances::Column::Balance).add(delta.cents()),
                )
                .update_column(balances::Column::UpdatedAt)
                .to_owned(),
        )
        .exec_without_returning(db_tx)
        .await?;
    Ok(())
}

async fn upsert_columns<const N: usize>(
    db_tx: &DatabaseTransaction,
    model: balances::ActiveModel,
    columns: [balances::Column; N],
) -> ResultEngine<()> {
    balances::Entity::insert(model)
        .on_conflict(
            OnConflict::column(balances::Column::EntityId)
                .update_columns(columns)
                .to_owned(),
        )
        .exec_without_returning(db_tx)
        .await?;
    Ok(())
}

async fn operation_applied(
    db_tx: &DatabaseTransaction,
    entity_id: i64,
    key: &str,
) -> ResultEngine<bool> {
    let existing = ledger_entries::Entity::find()
        .filter(ledger_entries::Column::EntityId.eq(entity_id))
        .filter(ledger_entries::Column::OperationId.eq(key.to_string()))
        .one(db_tx)
        .await?;
    Ok(existing.is_some())
}

async fn require_balance(
    db_tx: &DatabaseTransaction,
    entity_id: i64,
) -> ResultEngine<BalanceRecord> {
    let model = balances::Entity::find_by_id(entity_id)
        .one(db_tx)
        .await?
        .ok_or_else(|| EngineError::InvalidRecord(format!("balance of group {entity_id} vanished")))?;
    BalanceRecord::try_from(model)
}

async fn append_threshold_entry(
    db_tx: &DatabaseTransaction,
    entity_id: i64,
    actor_id: i64,
    remark: String,
    now: DateTime<Utc>,
) -> ResultEngine<BalanceRecord> {
    let record = require_balance(db_tx, entity_id).await?;
    let entry = LedgerEntry {
        id: Uuid::new_v4(),
        entity_id,
        actor_id,
        delta: MoneyCents::ZERO,
        balance_after: record.balance,
        kind: EntryKind::ThresholdChange,
        remark: Some(remark),
        operation_id: None,
        created_at: now,
    };
    ledger_entries::ActiveModel::from(&entry).insert(db_tx).await?;
    tracing::info!(
        "group {entity_id}: threshold change by {actor_id} ({})",
        entry.remark.as_deref().unwrap_or_default()
    );
    Ok(record)
}
