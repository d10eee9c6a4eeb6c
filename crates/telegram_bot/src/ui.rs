use std::fmt::Write;

use engine::{Adjusted, BalanceRecord, EntryKind, LedgerEntry, MoneyCents, Notice, SettlementResult};

pub(crate) fn help_text() -> &'static str {
    "Group balance commands (admins only):\n\n\
     +1000 / -250.50 - credit or debit the balance\n\
     /balance - show the balance\n\
     /ledger - latest balance changes\n\
     /settle - settle yesterday's usage\n\
     /set_min_balance <amount> - low balance threshold, 0 disables alerts\n\
     /set_balance_alert_limit <n> - alerts per hour"
}

pub(crate) fn render_adjusted(adjusted: &Adjusted) -> String {
    let mut text = format!("✅ Done, balance: {}", adjusted.record.balance);
    if adjusted.replayed {
        text.push_str("\n(already applied)");
    }
    if adjusted.should_warn() {
        let _ = write!(
            text,
            "\n⚠️ The balance is below the minimum ({})",
            adjusted.record.min_balance
        );
    }
    text
}

pub(crate) fn render_balance(record: &BalanceRecord) -> String {
    let mut text = format!("Balance: {}", record.balance);
    if record.is_monitored() {
        let _ = write!(text, "\nMinimum balance: {}", record.min_balance);
        if record.is_below_threshold() {
            text.push_str("\n⚠️ Below the minimum balance, please top up.");
        }
    }
    text
}

pub(crate) fn render_min_balance_set(record: &BalanceRecord) -> String {
    let mut text = format!(
        "✅ Minimum balance set to {}\nBalance: {}",
        record.min_balance, record.balance
    );
    if record.is_below_threshold() {
        text.push_str("\n⚠️ The balance is already below the threshold.");
    }
    text
}

pub(crate) fn render_alert_limit_set(record: &BalanceRecord) -> String {
    let mut text = format!(
        "✅ At most {} alerts per hour\nBalance: {}\nMinimum balance: {}",
        record.alert_limit_per_hour, record.balance, record.min_balance
    );
    if !record.is_monitored() {
        text.push_str("\nTip: set a threshold first with /set_min_balance.");
    }
    text
}

pub(crate) fn render_low_balance(balance: MoneyCents, min_balance: MoneyCents) -> String {
    format!(
        "⚠️ Low balance\nBalance: {balance}\nMinimum balance: {min_balance}\n\
         Top up (e.g. +1000) or change the threshold with /set_min_balance <amount>."
    )
}

pub(crate) fn render_settlement(result: &SettlementResult) -> String {
    let mut text = format!("📊 Daily settlement - {}\n", result.target_date.format("%Y-%m-%d"));
    if result.items.is_empty() {
        text.push_str("No bound interfaces\n");
    }
    for item in &result.items {
        let _ = writeln!(
            text,
            "• {}: volume {} × rate {:.2}% = {}",
            item.label(),
            item.gross_amount,
            item.rate_percent,
            item.deduction
        );
    }
    let _ = writeln!(text, "Total deduction: {}", result.total_deduction);
    let _ = write!(text, "Balance: {}", result.balance.balance);
    if result.balance.is_monitored() {
        let _ = write!(text, "\nMinimum balance: {}", result.balance.min_balance);
        if result.balance.is_below_threshold() {
            text.push_str("\n⚠️ Below the minimum balance, please top up.");
        }
    }
    if result.replayed {
        text.push_str("\n(already settled)");
    }
    text
}

pub(crate) fn render_notice(notice: &Notice) -> String {
    match notice {
        Notice::LowBalance {
            balance,
            min_balance,
        } => render_low_balance(*balance, *min_balance),
        Notice::Settlement(result) => render_settlement(result),
    }
}

pub(crate) fn render_ledger(entries: &[LedgerEntry]) -> String {
    if entries.is_empty() {
        return "No balance changes yet.".to_string();
    }
    let mut text = String::from("Latest balance changes:\n");
    for entry in entries {
        let delta = if entry.delta.is_negative() {
            entry.delta.to_string()
        } else {
            format!("+{}", entry.delta)
        };
        let _ = write!(
            text,
            "\n{} • {} • {delta} → {}",
            entry.created_at.format("%Y-%m-%d %H:%M"),
            kind_label(entry.kind),
            entry.balance_after
        );
        if let Some(remark) = entry.remark.as_deref() {
            let _ = write!(text, " • {remark}");
        }
    }
    text
}

fn kind_label(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::ManualCredit => "credit",
        EntryKind::ManualDebit => "debit",
        EntryKind::DailySettlement => "settlement",
        EntryKind::ThresholdChange => "settings",
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use engine::SettlementItem;
    use uuid::Uuid;

    use super::*;

    fn record(balance: i64, min_balance: i64) -> BalanceRecord {
        let mut record = BalanceRecord::empty(7);
        record.balance = MoneyCents::new(balance);
        record.min_balance = MoneyCents::new(min_balance);
        record
    }

    #[test]
    fn adjusted_warns_below_threshold() {
        let adjusted = Adjusted {
            record: record(150_00, 200_00),
            replayed: false,
        };
        assert_eq!(
            render_adjusted(&adjusted),
            "✅ Done, balance: 150.00\n⚠️ The balance is below the minimum (200.00)"
        );
    }

    #[test]
    fn balance_hides_disabled_threshold() {
        assert_eq!(render_balance(&record(-5_00, 0)), "Balance: -5.00");
        assert_eq!(
            render_balance(&record(50_00, 100_00)),
            "Balance: 50.00\nMinimum balance: 100.00\n⚠️ Below the minimum balance, please top up."
        );
    }

    #[test]
    fn settlement_lists_every_interface() {
        let result = SettlementResult {
            entity_id: 7,
            target_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            items: vec![
                SettlementItem {
                    interface_id: "A".to_string(),
                    display_name: "Alpha".to_string(),
                    rate_percent: 2.0,
                    gross_amount: MoneyCents::new(1000_00),
                    deduction: MoneyCents::new(20_00),
                },
                SettlementItem {
                    interface_id: "B".to_string(),
                    display_name: " ".to_string(),
                    rate_percent: 1.5,
                    gross_amount: MoneyCents::new(2000_00),
                    deduction: MoneyCents::new(30_00),
                },
            ],
            total_deduction: MoneyCents::new(50_00),
            balance: record(50_00, 0),
            replayed: false,
        };
        assert_eq!(
            render_settlement(&result),
            "📊 Daily settlement - 2024-05-01\n\
             • Alpha: volume 1000.00 × rate 2.00% = 20.00\n\
             • B: volume 2000.00 × rate 1.50% = 30.00\n\
             Total deduction: 50.00\n\
             Balance: 50.00"
        );
    }

    #[test]
    fn low_balance_notice_shows_both_amounts() {
        let text = render_notice(&Notice::LowBalance {
            balance: MoneyCents::new(80_00),
            min_balance: MoneyCents::new(100_00),
        });
        assert!(text.contains("Balance: 80.00"));
        assert!(text.contains("Minimum balance: 100.00"));
    }

    #[test]
    fn ledger_shows_signed_deltas() {
        let entry = LedgerEntry {
            id: Uuid::nil(),
            entity_id: 7,
            actor_id: 1,
            delta: MoneyCents::new(-20_00),
            balance_after: MoneyCents::new(80_00),
            kind: EntryKind::DailySettlement,
            remark: Some("2024-05-01".to_string()),
            operation_id: Some("settlement:2024-05-01".to_string()),
            created_at: Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 5).unwrap(),
        };
        assert_eq!(
            render_ledger(&[entry]),
            "Latest balance changes:\n\n2024-05-02 00:00 • settlement • -20.00 → 80.00 • 2024-05-01"
        );
        assert_eq!(render_ledger(&[]), "No balance changes yet.");
    }
}
