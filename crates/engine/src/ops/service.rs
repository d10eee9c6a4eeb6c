//! Manual adjustments issued by admins.

use crate::{Adjusted, Adjustment, Engine, EngineError, EntryKind, MoneyCents, ResultEngine};

impl Engine {
    /// Adds `amount` to the group balance.
    pub async fn credit(
        &self,
        entity_id: i64,
        actor_id: i64,
        amount: MoneyCents,
        operation_id: Option<&str>,
    ) -> ResultEngine<Adjusted> {
        ensure_positive(amount)?;
        let adjustment = with_operation(
            Adjustment::new(entity_id, amount, EntryKind::ManualCredit).actor(actor_id),
            operation_id,
        );
        self.adjust(adjustment).await
    }

    /// Subtracts `amount` from the group balance. The balance may go negative.
    pub async fn debit(
        &self,
        entity_id: i64,
        actor_id: i64,
        amount: MoneyCents,
        operation_id: Option<&str>,
    ) -> ResultEngine<Adjusted> {
        ensure_positive(amount)?;
        let adjustment = with_operation(
            Adjustment::new(entity_id, -amount, EntryKind::ManualDebit).actor(actor_id),
            operation_id,
        );
        self.adjust(adjustment).await
    }
}

fn ensure_positive(amount: MoneyCents) -> ResultEngine<()> {
    if !amount.is_positive() {
        return Err(EngineError::InvalidAmount(
            "amount must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

fn with_operation(adjustment: Adjustment, operation_id: Option<&str>) -> Adjustment {
    match operation_id {
        Some(key) => adjustment.operation_id(key),
        None => adjustment,
    }
}
