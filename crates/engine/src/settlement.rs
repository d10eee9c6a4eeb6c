//! Daily usage settlement.
//!
//! A settlement pulls the previous day's gross usage of every interface a
//! group is bound to, applies each binding's rate and debits the sum from the
//! group balance as a single ledger entry. The debit carries a deterministic
//! operation id derived from the target date, so running the settlement again
//! for the same day is a replay and never a second debit.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone};
use chrono_tz::Tz;

use crate::{
    Adjustment, BalanceRecord, Billing, CollaboratorError, DailySummary, Engine, EngineError,
    EntryKind, Group, InterfaceBinding, MoneyCents, ResultEngine,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Deduction computed for one interface binding.
#[derive(Clone, Debug, PartialEq)]
pub struct SettlementItem {
    pub interface_id: String,
    pub display_name: String,
    pub rate_percent: f64,
    pub gross_amount: MoneyCents,
    pub deduction: MoneyCents,
}

impl SettlementItem {
    /// Display name, falling back to the interface id.
    pub fn label(&self) -> &str {
        let name = self.display_name.trim();
        if name.is_empty() {
            &self.interface_id
        } else {
            name
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SettlementResult {
    pub entity_id: i64,
    pub target_date: NaiveDate,
    pub items: Vec<SettlementItem>,
    pub total_deduction: MoneyCents,
    pub balance: BalanceRecord,
    /// The debit for `target_date` had already been applied earlier.
    pub replayed: bool,
}

/// Runs settlements against the ledger.
pub struct Settler {
    engine: Arc<Engine>,
    billing: Option<Arc<dyn Billing>>,
    timezone: Tz,
}

impl Settler {
    /// `billing` is `None` when no billing source is configured; every
    /// settlement then fails with [`EngineError::BillingUnavailable`].
    pub fn new(engine: Arc<Engine>, billing: Option<Arc<dyn Billing>>, timezone: Tz) -> Self {
        Self {
            engine,
            billing,
            timezone,
        }
    }

    /// Reference time zone of the groups' calendar days.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Settles `target_date` for `group`.
    ///
    /// All bindings are queried before anything is written: one failed query
    /// fails the whole settlement.
    pub async fn settle_daily(
        &self,
        group: &Group,
        target_date: NaiveDate,
    ) -> ResultEngine<SettlementResult> {
        if group.bindings.is_empty() {
            return Err(EngineError::NoBindings(group.id));
        }
        let billing = self
            .billing
            .as_ref()
            .ok_or(EngineError::BillingUnavailable)?;

        let start = local_midnight(self.timezone, target_date)?;
        let next_day = target_date.succ_opt().ok_or_else(|| {
            EngineError::InvalidRecord(format!("no calendar day after {target_date}"))
        })?;
        let end = local_midnight(self.timezone, next_day)?;

        let mut items = Vec::with_capacity(group.bindings.len());
        for binding in &group.bindings {
            let item = settle_binding(&**billing, binding, start, end, target_date).await?;
            items.push(item);
        }
        let day = target_date.format(DATE_FORMAT).to_string();
        let total_deduction = items
            .iter()
            .try_fold(MoneyCents::ZERO, |total, item| {
                total.checked_add(item.deduction)
            })
            .ok_or_else(|| {
                EngineError::InvalidAmount(format!(
                    "settlement total of group {} for {day} overflows",
                    group.id
                ))
            })?;

        let adjustment = Adjustment::new(group.id, -total_deduction, EntryKind::DailySettlement)
            .remark(day.clone())
            .operation_id(settlement_operation_id(target_date));
        let adjusted = self.engine.adjust(adjustment).await?;

        if adjusted.replayed {
            tracing::info!("group {}: settlement for {day} already applied", group.id);
        } else {
            tracing::info!(
                "group {}: settled {day}, {} interfaces, deduction {}, balance {}",
                group.id,
                items.len(),
                total_deduction,
                adjusted.record.balance
            );
        }

        Ok(SettlementResult {
            entity_id: group.id,
            target_date,
            items,
            total_deduction,
            balance: adjusted.record,
            replayed: adjusted.replayed,
        })
    }
}

async fn settle_binding(
    billing: &dyn Billing,
    binding: &InterfaceBinding,
    start: DateTime<Tz>,
    end: DateTime<Tz>,
    target_date: NaiveDate,
) -> ResultEngine<SettlementItem> {
    let summary = billing
        .daily_summary(&binding.interface_id, start, end)
        .await
        .map_err(|err| match err {
            CollaboratorError::Unavailable => EngineError::BillingUnavailable,
            other => EngineError::Billing {
                interface_id: binding.interface_id.clone(),
                message: other.to_string(),
            },
        })?;

    let gross_amount = gross_for_date(&summary, target_date);
    let rate_percent = parse_rate_percent(&binding.rate);
    Ok(SettlementItem {
        interface_id: binding.interface_id.clone(),
        display_name: binding.display_name.clone(),
        rate_percent,
        gross_amount,
        deduction: gross_amount.percent(rate_percent),
    })
}

/// Idempotency key of the settlement debit for `date`.
pub fn settlement_operation_id(date: NaiveDate) -> String {
    format!("settlement:{}", date.format(DATE_FORMAT))
}

/// The calendar day a run at `now` settles: the day before.
pub fn previous_billing_date(now: DateTime<Tz>) -> NaiveDate {
    let today = now.date_naive();
    today.pred_opt().unwrap_or(today)
}

/// Parses a percentage such as `"1.5%"` or `" 2 "`.
///
/// Empty, malformed or negative rates count as `0` and are logged.
pub fn parse_rate_percent(rate: &str) -> f64 {
    let clean = rate.trim();
    let clean = clean.strip_suffix('%').unwrap_or(clean).trim();
    if clean.is_empty() {
        return 0.0;
    }
    match clean.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => value,
        Ok(value) if value.is_finite() => {
            tracing::warn!("ignoring negative interface rate {rate:?}");
            0.0
        }
        _ => {
            tracing::warn!("failed to parse interface rate {rate:?}");
            0.0
        }
    }
}

/// Normalizes the textual dates billing sources report to a calendar day.
///
/// Accepted: `2024-05-01`, `2024-05-01 13:00:00`, `2024/05/01`,
/// `2024/05/01 13:00:00`, RFC 3339, or any of the date forms followed by
/// extra text.
pub fn normalize_summary_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(datetime.date());
        }
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(datetime.date_naive());
    }

    let prefix = trimmed.get(..10)?;
    ["%Y-%m-%d", "%Y/%m/%d"]
        .into_iter()
        .find_map(|format| NaiveDate::parse_from_str(prefix, format).ok())
}

fn gross_for_date(summary: &DailySummary, target_date: NaiveDate) -> MoneyCents {
    let Some(item) = summary
        .items
        .iter()
        .find(|item| normalize_summary_date(&item.date) == Some(target_date))
    else {
        return MoneyCents::ZERO;
    };

    match item
        .gross_amount
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(MoneyCents::from_major_f64)
    {
        Some(amount) if !amount.is_negative() => amount,
        Some(amount) => {
            tracing::warn!("ignoring negative gross amount {amount} for {target_date}");
            MoneyCents::ZERO
        }
        None => {
            tracing::warn!(
                "failed to parse gross amount {:?} for {target_date}",
                item.gross_amount
            );
            MoneyCents::ZERO
        }
    }
}

fn local_midnight(tz: Tz, date: NaiveDate) -> ResultEngine<DateTime<Tz>> {
    let midnight = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        // Midnight falls in a DST gap: the day starts an hour later.
        .or_else(|| {
            tz.from_local_datetime(&(midnight + TimeDelta::hours(1)))
                .earliest()
        })
        .ok_or_else(|| EngineError::InvalidRecord(format!("no local midnight for {date} in {tz}")))
}

#[cfg(test)]
mod tests {
    use chrono_tz::Asia::Shanghai;

    use super::*;
    use crate::SummaryItem;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn normalizes_supported_date_formats() {
        let expected = Some(day(2024, 5, 1));
        for raw in [
            "2024-05-01",
            " 2024-05-01 ",
            "2024-05-01 23:59:59",
            "2024/05/01",
            "2024/05/01 08:00:00",
            "2024-05-01T10:00:00+08:00",
            "2024-05-01T10:00:00.123456Z",
            "2024-05-01 (Wed)",
        ] {
            assert_eq!(normalize_summary_date(raw), expected, "{raw}");
        }
    }

    #[test]
    fn rejects_unparsable_dates() {
        assert_eq!(normalize_summary_date(""), None);
        assert_eq!(normalize_summary_date("yesterday"), None);
        assert_eq!(normalize_summary_date("05/01/2024"), None);
    }

    #[test]
    fn parses_rate_percentages() {
        assert_eq!(parse_rate_percent("1.5%"), 1.5);
        assert_eq!(parse_rate_percent(" 2 % "), 2.0);
        assert_eq!(parse_rate_percent("0.35"), 0.35);
        assert_eq!(parse_rate_percent(""), 0.0);
        assert_eq!(parse_rate_percent("abc%"), 0.0);
    }

    #[test]
    fn negative_rates_count_as_zero() {
        assert_eq!(parse_rate_percent("-2%"), 0.0);
        assert_eq!(parse_rate_percent(" -0.5 "), 0.0);
        assert_eq!(parse_rate_percent("0%"), 0.0);
    }

    #[test]
    fn negative_gross_counts_as_zero() {
        let summary = DailySummary {
            items: vec![SummaryItem {
                date: "2024-05-01".to_string(),
                gross_amount: "-1500".to_string(),
            }],
        };
        assert_eq!(gross_for_date(&summary, day(2024, 5, 1)), MoneyCents::ZERO);
    }

    #[test]
    fn gross_uses_matching_day_only() {
        let summary = DailySummary {
            items: vec![
                SummaryItem {
                    date: "2024-04-30".to_string(),
                    gross_amount: "999".to_string(),
                },
                SummaryItem {
                    date: "2024/05/01 00:00:00".to_string(),
                    gross_amount: " 1234.5 ".to_string(),
                },
            ],
        };
        assert_eq!(
            gross_for_date(&summary, day(2024, 5, 1)),
            MoneyCents::new(1234_50)
        );
        assert_eq!(gross_for_date(&summary, day(2024, 5, 2)), MoneyCents::ZERO);
    }

    #[test]
    fn malformed_gross_counts_as_zero() {
        let summary = DailySummary {
            items: vec![SummaryItem {
                date: "2024-05-01".to_string(),
                gross_amount: "n/a".to_string(),
            }],
        };
        assert_eq!(gross_for_date(&summary, day(2024, 5, 1)), MoneyCents::ZERO);
    }

    #[test]
    fn previous_billing_date_is_the_local_day_before() {
        let now = Shanghai.with_ymd_and_hms(2024, 3, 1, 0, 0, 5).unwrap();
        assert_eq!(previous_billing_date(now), day(2024, 2, 29));
    }

    #[test]
    fn local_day_spans_its_midnights() {
        let start = local_midnight(Shanghai, day(2024, 5, 1)).unwrap();
        let end = local_midnight(Shanghai, day(2024, 5, 2)).unwrap();
        assert_eq!(start.to_rfc3339(), "2024-05-01T00:00:00+08:00");
        assert_eq!(end - start, TimeDelta::hours(24));
    }

    #[test]
    fn operation_id_is_derived_from_the_date() {
        assert_eq!(
            settlement_operation_id(day(2024, 5, 1)),
            "settlement:2024-05-01"
        );
    }
}
