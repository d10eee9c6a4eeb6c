//! The module contains the errors the engine can throw.
//!
//! Errors fall in four groups, which drive the retry policy of the
//! automation loops:
//!
//! - validation: [`InvalidAmount`], [`InvalidThreshold`]. Rejected before any
//!   store access.
//! - configuration: [`NoBindings`], [`BillingUnavailable`]. Never retried.
//! - transient: [`Database`], [`Billing`], [`Directory`], [`Delivery`].
//!   Retried within the caller's attempt budget.
//! - cancellation: [`Timeout`], [`Cancelled`]. Always propagated.
//!
//!  [`InvalidAmount`]: EngineError::InvalidAmount
//!  [`InvalidThreshold`]: EngineError::InvalidThreshold
//!  [`NoBindings`]: EngineError::NoBindings
//!  [`BillingUnavailable`]: EngineError::BillingUnavailable
//!  [`Database`]: EngineError::Database
//!  [`Billing`]: EngineError::Billing
//!  [`Directory`]: EngineError::Directory
//!  [`Delivery`]: EngineError::Delivery
//!  [`Timeout`]: EngineError::Timeout
//!  [`Cancelled`]: EngineError::Cancelled
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("group {0} has no interface bindings")]
    NoBindings(i64),
    #[error("billing source is not configured")]
    BillingUnavailable,
    #[error("billing query for interface {interface_id} failed: {message}")]
    Billing {
        interface_id: String,
        message: String,
    },
    #[error("group directory failed: {0}")]
    Directory(String),
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("{0} timed out")]
    Timeout(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl EngineError {
    /// `true` for deadline and cancellation errors: the caller is shutting
    /// down and nothing should be retried.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Cancelled)
    }

    /// `true` when another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Billing { .. } | Self::Directory(_) | Self::Delivery(_)
        )
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidThreshold(a), Self::InvalidThreshold(b)) => a == b,
            (Self::InvalidRecord(a), Self::InvalidRecord(b)) => a == b,
            (Self::NoBindings(a), Self::NoBindings(b)) => a == b,
            (Self::BillingUnavailable, Self::BillingUnavailable) => true,
            (
                Self::Billing {
                    interface_id: a,
                    message: m,
                },
                Self::Billing {
                    interface_id: b,
                    message: n,
                },
            ) => a == b && m == n,
            (Self::Directory(a), Self::Directory(b)) => a == b,
            (Self::Delivery(a), Self::Delivery(b)) => a == b,
            (Self::Timeout(a), Self::Timeout(b)) => a == b,
            (Self::Cancelled, Self::Cancelled) => true,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
