//! Command struct for ledger writes.
//!
//! Groups the parameters of an adjustment, keeping call sites readable and
//! avoiding long argument lists.

use crate::{EntryKind, MoneyCents};

/// A signed balance change to apply to one group.
#[derive(Clone, Debug)]
pub struct Adjustment {
    pub entity_id: i64,
    pub actor_id: i64,
    pub delta: MoneyCents,
    pub kind: EntryKind,
    pub remark: Option<String>,
    pub operation_id: Option<String>,
}

impl Adjustment {
    /// A system-initiated adjustment (`actor_id == 0`).
    #[must_use]
    pub fn new(entity_id: i64, delta: MoneyCents, kind: EntryKind) -> Self {
        Self {
            entity_id,
            actor_id: 0,
            delta,
            kind,
            remark: None,
            operation_id: None,
        }
    }

    #[must_use]
    pub fn actor(mut self, actor_id: i64) -> Self {
        self.actor_id = actor_id;
        self
    }

    #[must_use]
    pub fn remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    /// Idempotency key. Blank keys are ignored.
    #[must_use]
    pub fn operation_id(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        let key = key.trim();
        self.operation_id = (!key.is_empty()).then(|| key.to_string());
        self
    }
}
