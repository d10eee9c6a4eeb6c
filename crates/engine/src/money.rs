use std::{
    fmt,
    ops::Neg,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Signed money amount represented as **integer cents**.
///
/// Balances, thresholds and deltas are all stored as cents so the ledger
/// never accumulates floating-point drift. Balances may go negative.
///
/// # Examples
///
/// ```rust
/// use engine::MoneyCents;
///
/// let amount = MoneyCents::new(12_34);
/// assert_eq!(amount.cents(), 1234);
/// assert_eq!(amount.to_string(), "12.34");
/// ```
///
/// Parsing from user input (accepts `.` or `,` as decimal separator; rejects >
/// 2 decimals):
///
/// ```rust
/// use engine::MoneyCents;
///
/// assert_eq!("10".parse::<MoneyCents>().unwrap().cents(), 1000);
/// assert_eq!("10,5".parse::<MoneyCents>().unwrap().cents(), 1050);
/// assert!("12.345".parse::<MoneyCents>().is_err());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct MoneyCents(i64);

impl MoneyCents {
    pub const ZERO: MoneyCents = MoneyCents(0);

    /// Creates a new amount from integer cents.
    #[must_use]
    pub const fn new(cents: i64) -> Self {
        Self(cents)
    }

    /// Returns the raw value in cents.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Returns `true` if the amount is 0.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if the amount is positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Returns `true` if the amount is negative.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Checked addition (returns `None` on overflow).
    #[must_use]
    pub fn checked_add(self, rhs: MoneyCents) -> Option<MoneyCents> {
        self.0.checked_add(rhs.0).map(MoneyCents)
    }

    /// Converts a major-unit amount reported by an external source (e.g.
    /// `1234.5678`) to cents, rounding half away from zero.
    ///
    /// Returns `None` for non-finite or out of range values.
    #[must_use]
    pub fn from_major_f64(value: f64) -> Option<MoneyCents> {
        let cents = (value * 100.0).round();
        if !cents.is_finite() || cents.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(MoneyCents(cents as i64))
    }

    /// Applies a percentage rate, rounding the result to the cent.
    ///
    /// ```rust
    /// use engine::MoneyCents;
    ///
    /// assert_eq!(MoneyCents::new(2000_00).percent(1.5), MoneyCents::new(30_00));
    /// ```
    #[must_use]
    pub fn percent(self, rate: f64) -> MoneyCents {
        MoneyCents((self.0 as f64 * rate / 100.0).round() as i64)
    }
}

impl fmt::Display for MoneyCents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let units = abs / 100;
        let cents = abs % 100;
        write!(f, "{sign}{units}.{cents:02}")
    }
}

impl Neg for MoneyCents {
    type Output = MoneyCents;

    fn neg(self) -> Self::Output {
        MoneyCents(-self.0)
    }
}

impl FromStr for MoneyCents {
    type Err = EngineError;

    /// Parses `[+-]units[(.|,)cents]` with at most two decimals.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rejected = |reason: &str| EngineError::InvalidAmount(reason.to_string());

        let text = s.trim();
        let (negative, digits) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            Some(_) => (false, text),
            None => return Err(rejected("empty amount")),
        };
        let digits = digits.trim();
        let (units, fraction) = match digits.split_once(['.', ',']) {
            Some((units, fraction)) => (units, fraction),
            None => (digits, ""),
        };

        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if units.is_empty() || !all_digits(units) || !all_digits(fraction) {
            return Err(rejected("invalid amount"));
        }
        if fraction.len() > 2 {
            return Err(rejected("too many decimals"));
        }

        // "5" is 50 cents, "05" is 5.
        let cents = format!("{fraction:0<2}")
            .parse::<i64>()
            .map_err(|_| rejected("invalid amount"))?;
        let magnitude = units
            .parse::<i64>()
            .ok()
            .and_then(|units| units.checked_mul(100))
            .and_then(|units| units.checked_add(cents))
            .ok_or_else(|| rejected("amount too large"))?;

        Ok(MoneyCents(if negative { -magnitude } else { magnitude }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_two_decimals() {
        assert_eq!(MoneyCents::new(0).to_string(), "0.00");
        assert_eq!(MoneyCents::new(1).to_string(), "0.01");
        assert_eq!(MoneyCents::new(1050).to_string(), "10.50");
        assert_eq!(MoneyCents::new(-1050).to_string(), "-10.50");
    }

    #[test]
    fn parse_accepts_dot_or_comma() {
        assert_eq!("10".parse::<MoneyCents>().unwrap().cents(), 1000);
        assert_eq!("10.5".parse::<MoneyCents>().unwrap().cents(), 1050);
        assert_eq!("10,50".parse::<MoneyCents>().unwrap().cents(), 1050);
        assert_eq!("-0.01".parse::<MoneyCents>().unwrap().cents(), -1);
        assert_eq!("+1.00".parse::<MoneyCents>().unwrap().cents(), 100);
        assert_eq!("  2.30 ".parse::<MoneyCents>().unwrap().cents(), 230);
    }

    #[test]
    fn percent_rounds_to_the_cent() {
        assert_eq!(MoneyCents::new(1000_00).percent(2.0).cents(), 20_00);
        assert_eq!(MoneyCents::new(1).percent(50.0).cents(), 1);
        assert_eq!(MoneyCents::new(333).percent(1.5).cents(), 5);
        assert_eq!(MoneyCents::new(1000_00).percent(0.0), MoneyCents::ZERO);
    }

    #[test]
    fn from_major_f64_rounds_and_rejects_nan() {
        assert_eq!(MoneyCents::from_major_f64(1234.5678), Some(MoneyCents::new(1234_57)));
        assert_eq!(MoneyCents::from_major_f64(-0.005), Some(MoneyCents::new(-1)));
        assert_eq!(MoneyCents::from_major_f64(f64::NAN), None);
        assert_eq!(MoneyCents::from_major_f64(f64::INFINITY), None);
    }

    #[test]
    fn parse_rejects_more_than_two_decimals() {
        assert!("12.345".parse::<MoneyCents>().is_err());
        assert!("0.001".parse::<MoneyCents>().is_err());
    }

    #[test]
    fn parse_rejects_malformed_input() {
        for raw in ["", " ", "-", "+.5", "1.2.3", "1,2.3", "12a", "1 000", "--1"] {
            assert!(raw.parse::<MoneyCents>().is_err(), "{raw:?}");
        }
        assert_eq!("10.".parse::<MoneyCents>().unwrap().cents(), 1000);
        assert!("92233720368547758.08".parse::<MoneyCents>().is_err());
    }

    #[test]
    fn checked_add_reports_overflow() {
        let max = MoneyCents::new(i64::MAX);
        assert_eq!(max.checked_add(MoneyCents::new(1)), None);
        assert_eq!(
            MoneyCents::new(20_00).checked_add(MoneyCents::new(30_00)),
            Some(MoneyCents::new(50_00))
        );
    }
}
