use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use chrono_tz::{Asia::Shanghai, Tz};
use sea_orm::Database;

use engine::{
    Billing, CollaboratorError, DailySummary, Engine, EngineError, EntryKind, Group, GroupTier,
    InterfaceBinding, MoneyCents, Settler, SummaryItem, settlement_operation_id,
};
use migration::MigratorTrait;

/// Billing source serving canned summaries per interface.
#[derive(Default)]
struct FakeBilling {
    summaries: HashMap<String, Result<DailySummary, CollaboratorError>>,
    calls: Mutex<Vec<(String, DateTime<Tz>, DateTime<Tz>)>>,
}

impl FakeBilling {
    fn gross(mut self, interface_id: &str, date: &str, gross: &str) -> Self {
        self.summaries.insert(
            interface_id.to_string(),
            Ok(DailySummary {
                items: vec![SummaryItem {
                    date: date.to_string(),
                    gross_amount: gross.to_string(),
                }],
            }),
        );
        self
    }

    fn failing(mut self, interface_id: &str, err: CollaboratorError) -> Self {
        self.summaries.insert(interface_id.to_string(), Err(err));
        self
    }
}

#[async_trait]
impl Billing for FakeBilling {
    async fn daily_summary(
        &self,
        interface_id: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> Result<DailySummary, CollaboratorError> {
        self.calls
            .lock()
            .unwrap()
            .push((interface_id.to_string(), start, end));
        self.summaries
            .get(interface_id)
            .cloned()
            .unwrap_or_else(|| Ok(DailySummary::default()))
    }
}

async fn engine() -> Arc<Engine> {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    Arc::new(Engine::builder().database(db).build().await.unwrap())
}

fn binding(interface_id: &str, rate: &str) -> InterfaceBinding {
    InterfaceBinding {
        interface_id: interface_id.to_string(),
        display_name: format!("{interface_id} name"),
        rate: rate.to_string(),
    }
}

fn group(id: i64, bindings: Vec<InterfaceBinding>) -> Group {
    Group {
        id,
        title: format!("group {id}"),
        tier: GroupTier::Upstream,
        bindings,
    }
}

fn may_first() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
}

#[tokio::test]
async fn deducts_each_binding_at_its_rate() {
    let engine = engine().await;
    engine.credit(7, 1, MoneyCents::new(100_00), None).await.unwrap();
    let billing = Arc::new(
        FakeBilling::default()
            .gross("A", "2024-05-01", "1000")
            .gross("B", "2024-05-01 00:00:00", "2000"),
    );
    let settler = Settler::new(engine.clone(), Some(billing.clone()), Shanghai);
    let group = group(7, vec![binding("A", "2%"), binding("B", "1.5%")]);

    let result = settler.settle_daily(&group, may_first()).await.unwrap();

    assert!(!result.replayed);
    assert_eq!(result.items.len(), 2);
    assert_eq!(result.items[0].deduction, MoneyCents::new(20_00));
    assert_eq!(result.items[1].deduction, MoneyCents::new(30_00));
    assert_eq!(result.total_deduction, MoneyCents::new(50_00));
    assert_eq!(result.balance.balance, MoneyCents::new(50_00));

    let entries = engine.entries(7, 10).await.unwrap();
    let settlement = entries
        .iter()
        .find(|entry| entry.kind == EntryKind::DailySettlement)
        .unwrap();
    assert_eq!(settlement.delta, MoneyCents::new(-50_00));
    assert_eq!(settlement.remark.as_deref(), Some("2024-05-01"));
    assert_eq!(
        settlement.operation_id.as_deref(),
        Some("settlement:2024-05-01")
    );
}

#[tokio::test]
async fn queries_the_local_calendar_day() {
    let engine = engine().await;
    let billing = Arc::new(FakeBilling::default());
    let settler = Settler::new(engine, Some(billing.clone()), Shanghai);

    settler
        .settle_daily(&group(7, vec![binding("A", "1%")]), may_first())
        .await
        .unwrap();

    let calls = billing.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (interface_id, start, end) = &calls[0];
    assert_eq!(interface_id, "A");
    assert_eq!(start.to_rfc3339(), "2024-05-01T00:00:00+08:00");
    assert_eq!(end.to_rfc3339(), "2024-05-02T00:00:00+08:00");
}

#[tokio::test]
async fn no_usage_still_records_a_zero_entry() {
    let engine = engine().await;
    let billing = Arc::new(FakeBilling::default().gross("A", "2024-04-30", "1000"));
    let settler = Settler::new(engine.clone(), Some(billing), Shanghai);

    let result = settler
        .settle_daily(&group(7, vec![binding("A", "2%")]), may_first())
        .await
        .unwrap();

    assert_eq!(result.total_deduction, MoneyCents::ZERO);
    assert_eq!(result.balance.balance, MoneyCents::ZERO);
    let entries = engine.entries(7, 10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].delta, MoneyCents::ZERO);
    assert_eq!(entries[0].kind, EntryKind::DailySettlement);
}

#[tokio::test]
async fn settling_the_same_day_twice_is_a_replay() {
    let engine = engine().await;
    let billing = Arc::new(FakeBilling::default().gross("A", "2024-05-01", "1000"));
    let settler = Settler::new(engine.clone(), Some(billing), Shanghai);
    let group = group(7, vec![binding("A", "2%")]);

    let first = settler.settle_daily(&group, may_first()).await.unwrap();
    let second = settler.settle_daily(&group, may_first()).await.unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(second.balance.balance, MoneyCents::new(-20_00));
    assert_eq!(engine.entries(7, 10).await.unwrap().len(), 1);

    let next_day = may_first().succ_opt().unwrap();
    let third = settler.settle_daily(&group, next_day).await.unwrap();
    assert!(!third.replayed);
    assert_eq!(engine.entries(7, 10).await.unwrap().len(), 2);
    assert_ne!(
        settlement_operation_id(may_first()),
        settlement_operation_id(next_day)
    );
}

#[tokio::test]
async fn group_without_bindings_is_rejected() {
    let engine = engine().await;
    let settler = Settler::new(engine, Some(Arc::new(FakeBilling::default())), Shanghai);

    let err = settler
        .settle_daily(&group(7, Vec::new()), may_first())
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::NoBindings(7));
}

#[tokio::test]
async fn missing_billing_source_is_rejected() {
    let engine = engine().await;
    let settler = Settler::new(engine.clone(), None, Shanghai);

    let err = settler
        .settle_daily(&group(7, vec![binding("A", "2%")]), may_first())
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::BillingUnavailable);
    assert!(!err.is_retryable());
    assert_eq!(engine.balance(7).await.unwrap(), None);
}

#[tokio::test]
async fn one_failing_binding_writes_nothing() {
    let engine = engine().await;
    engine.credit(7, 1, MoneyCents::new(10_00), None).await.unwrap();
    let billing = Arc::new(
        FakeBilling::default()
            .gross("A", "2024-05-01", "1000")
            .failing("B", CollaboratorError::Failed("bad gateway".to_string())),
    );
    let settler = Settler::new(engine.clone(), Some(billing), Shanghai);

    let err = settler
        .settle_daily(
            &group(7, vec![binding("A", "2%"), binding("B", "1%")]),
            may_first(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Billing { ref interface_id, .. } if interface_id == "B"));
    assert!(err.is_retryable());
    let record = engine.balance(7).await.unwrap().unwrap();
    assert_eq!(record.balance, MoneyCents::new(10_00));
    assert_eq!(engine.entries(7, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unconfigured_billing_response_is_not_retryable() {
    let engine = engine().await;
    let billing = Arc::new(FakeBilling::default().failing("A", CollaboratorError::Unavailable));
    let settler = Settler::new(engine, Some(billing), Shanghai);

    let err = settler
        .settle_daily(&group(7, vec![binding("A", "2%")]), may_first())
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::BillingUnavailable);
}

#[tokio::test]
async fn malformed_rate_deducts_nothing() {
    let engine = engine().await;
    let billing = Arc::new(FakeBilling::default().gross("A", "2024-05-01", "1000"));
    let settler = Settler::new(engine, Some(billing), Shanghai);

    let result = settler
        .settle_daily(&group(7, vec![binding("A", "two%")]), may_first())
        .await
        .unwrap();
    assert_eq!(result.items[0].rate_percent, 0.0);
    assert_eq!(result.total_deduction, MoneyCents::ZERO);
}

#[tokio::test]
async fn overflowing_total_writes_nothing() {
    let engine = engine().await;
    engine.credit(7, 1, MoneyCents::new(100_00), None).await.unwrap();
    let billing = Arc::new(
        FakeBilling::default()
            .gross("A", "2024-05-01", "90000000000000000")
            .gross("B", "2024-05-01", "90000000000000000"),
    );
    let settler = Settler::new(engine.clone(), Some(billing), Shanghai);
    let group = group(7, vec![binding("A", "100%"), binding("B", "100%")]);

    let err = settler.settle_daily(&group, may_first()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)));
    assert!(!err.is_retryable());

    let record = engine.balance(7).await.unwrap().unwrap();
    assert_eq!(record.balance, MoneyCents::new(100_00));
    let entries = engine.entries(7, 10).await.unwrap();
    assert!(
        entries
            .iter()
            .all(|entry| entry.kind != EntryKind::DailySettlement)
    );
}

#[tokio::test]
async fn negative_rate_never_credits() {
    let engine = engine().await;
    engine.credit(7, 1, MoneyCents::new(100_00), None).await.unwrap();
    let billing = Arc::new(
        FakeBilling::default()
            .gross("A", "2024-05-01", "1000")
            .gross("B", "2024-05-01", "2000"),
    );
    let settler = Settler::new(engine.clone(), Some(billing), Shanghai);
    let group = group(7, vec![binding("A", "-2%"), binding("B", "1.5%")]);

    let result = settler.settle_daily(&group, may_first()).await.unwrap();
    assert_eq!(result.items[0].deduction, MoneyCents::ZERO);
    assert_eq!(result.total_deduction, MoneyCents::new(30_00));
    assert_eq!(result.balance.balance, MoneyCents::new(70_00));
}
