//! Contracts of the collaborators the engine and the automation loops depend
//! on. Implementations live in the binary (directory, billing, admins) and in
//! the Telegram front-end (notifier).

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{MoneyCents, SettlementResult};

/// Failure reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("not configured")]
    Unavailable,
    #[error("timed out")]
    Timeout,
    #[error("{0}")]
    Failed(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupTier {
    #[default]
    Basic,
    Upstream,
    Downstream,
}

impl GroupTier {
    /// Unknown or empty tiers fall back to [`GroupTier::Basic`].
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "upstream" => Self::Upstream,
            "downstream" => Self::Downstream,
            _ => Self::Basic,
        }
    }

    /// Only upstream groups carry a ledger balance.
    pub fn is_balance_bearing(self) -> bool {
        matches!(self, Self::Upstream)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceBinding {
    pub interface_id: String,
    #[serde(default)]
    pub display_name: String,
    /// Percentage as configured, e.g. `"1.5%"`.
    #[serde(default)]
    pub rate: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tier: GroupTier,
    #[serde(default)]
    pub bindings: Vec<InterfaceBinding>,
}

impl Group {
    /// Balance-bearing and bound to at least one interface.
    pub fn is_settleable(&self) -> bool {
        self.tier.is_balance_bearing() && !self.bindings.is_empty()
    }
}

/// One day of usage for an interface, as reported by the billing source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryItem {
    pub date: String,
    pub gross_amount: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummary {
    #[serde(default)]
    pub items: Vec<SummaryItem>,
}

/// What a notifier is asked to deliver. Rendering belongs to the notifier.
#[derive(Clone, Debug, PartialEq)]
pub enum Notice {
    LowBalance {
        balance: MoneyCents,
        min_balance: MoneyCents,
    },
    Settlement(SettlementResult),
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn is_admin(&self, actor_id: i64) -> Result<bool, CollaboratorError>;
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn list_active_groups(&self) -> Result<Vec<Group>, CollaboratorError>;

    async fn group(&self, id: i64) -> Result<Option<Group>, CollaboratorError>;
}

#[async_trait]
pub trait Billing: Send + Sync {
    /// Per-day usage of `interface_id` between `start` (inclusive) and `end`
    /// (exclusive).
    async fn daily_summary(
        &self,
        interface_id: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> Result<DailySummary, CollaboratorError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, entity_id: i64, notice: &Notice) -> Result<(), CollaboratorError>;
}
