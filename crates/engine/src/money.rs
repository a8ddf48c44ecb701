use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Amount in integer centavos.
///
/// Every ledger amount (declared expense value, commitment, payment, totals)
/// uses this type, so comparisons are exact. Arithmetic is checked only:
/// ceilings are validated on sums, and a silent wrap would defeat them.
///
/// ```rust
/// use engine::MoneyCents;
///
/// let amount: MoneyCents = "1.234,5".parse().unwrap_or(MoneyCents::ZERO);
/// assert_eq!(amount, MoneyCents::ZERO);
///
/// let amount: MoneyCents = "1234,5".parse().unwrap();
/// assert_eq!(amount.cents(), 123_450);
/// assert_eq!(amount.to_string(), "R$ 1234.50");
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MoneyCents(i64);

impl MoneyCents {
    pub const ZERO: MoneyCents = MoneyCents(0);

    #[must_use]
    pub const fn new(cents: i64) -> Self {
        Self(cents)
    }

    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[must_use]
    pub fn checked_add(self, rhs: MoneyCents) -> Option<MoneyCents> {
        self.0.checked_add(rhs.0).map(MoneyCents)
    }

    #[must_use]
    pub fn checked_sub(self, rhs: MoneyCents) -> Option<MoneyCents> {
        self.0.checked_sub(rhs.0).map(MoneyCents)
    }

    /// Sum of `amounts`, `None` on overflow.
    #[must_use]
    pub fn checked_sum<I>(amounts: I) -> Option<MoneyCents>
    where
        I: IntoIterator<Item = MoneyCents>,
    {
        amounts
            .into_iter()
            .try_fold(MoneyCents::ZERO, MoneyCents::checked_add)
    }
}

impl fmt::Display for MoneyCents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let abs = self.0.unsigned_abs();
        if self.0 < 0 {
            f.write_str("-")?;
        }
        write!(f, "R$ {}.{:02}", abs / 100, abs % 100)
    }
}

fn digits(value: &str) -> Option<i64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

impl FromStr for MoneyCents {
    type Err = EngineError;

    /// Parse `1234`, `1234.5`, `1234,56`, optionally signed and prefixed by
    /// `R$`. Thousands separators are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::InvalidAmount(format!("invalid amount: {s:?}"));

        let body = s.trim();
        let (negative, body) = match body.as_bytes().first() {
            Some(b'-') => (true, &body[1..]),
            Some(b'+') => (false, &body[1..]),
            _ => (false, body),
        };
        let body = body.trim_start();
        let body = body.strip_prefix("R$").unwrap_or(body).trim_start();

        let (whole, fraction) = match body.split_once(['.', ',']) {
            Some((whole, fraction)) => (whole, fraction),
            None => (body, ""),
        };
        let whole = digits(whole).ok_or_else(invalid)?;
        let fraction = match fraction.len() {
            0 => 0,
            1 => digits(fraction).ok_or_else(invalid)? * 10,
            2 => digits(fraction).ok_or_else(invalid)?,
            _ => {
                return Err(EngineError::InvalidAmount(format!(
                    "at most two decimal places: {s:?}"
                )));
            }
        };

        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(fraction))
            .ok_or_else(|| EngineError::InvalidAmount(format!("amount too large: {s:?}")))?;
        Ok(MoneyCents(if negative { -cents } else { cents }))
    }
}
