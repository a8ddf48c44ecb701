//! Identifier formats.
//!
//! - Expense protocol: `NNNNN.SSSSSS/YYYY-DD` (organization, yearly sequence,
//!   year, modulo-11 check digit).
//! - Commitment number: `YYYYNEssss`.
//! - Payment number: `YYYYNPssss`.
//!
//! Everything here is pure. Storage-backed allocation lives in the engine ops.

use std::{fmt, str::FromStr};

use crate::{EngineError, ResultEngine};

/// Highest sequence representable in a commitment/payment number.
pub const MAX_SEQUENCE: u32 = 9_999;
/// Highest sequence representable in a protocol number.
pub const MAX_PROTOCOL_SEQUENCE: u32 = 999_999;

/// A numbered series, each with its own yearly counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NumberSeries {
    Protocol,
    Commitment,
    Payment,
}

impl NumberSeries {
    /// Key of the series in the `number_sequences` table.
    pub fn key(self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::Commitment => "commitment",
            Self::Payment => "payment",
        }
    }

    /// Tag embedded in the number, `None` for protocols.
    pub fn tag(self) -> Option<&'static str> {
        match self {
            Self::Protocol => None,
            Self::Commitment => Some("NE"),
            Self::Payment => Some("NP"),
        }
    }

    fn max_sequence(self) -> u32 {
        match self {
            Self::Protocol => MAX_PROTOCOL_SEQUENCE,
            Self::Commitment | Self::Payment => MAX_SEQUENCE,
        }
    }
}

/// Five digit code of the filing organization.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OrganizationCode(String);

impl OrganizationCode {
    pub fn new(code: &str) -> ResultEngine<Self> {
        let code = code.trim();
        if code.len() != 5 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(EngineError::InvalidInput(format!(
                "organization code must be 5 digits, got {code:?}"
            )));
        }
        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OrganizationCode {
    fn default() -> Self {
        Self("43022".to_string())
    }
}

impl FromStr for OrganizationCode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for OrganizationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Components of a well-formed protocol number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolParts {
    pub organization: String,
    pub sequence: u32,
    pub year: i32,
    pub check_digit: u8,
}

fn ensure_year(year: i32) -> ResultEngine<()> {
    if !(0..=9_999).contains(&year) {
        return Err(EngineError::InvalidInput(format!(
            "year out of range: {year}"
        )));
    }
    Ok(())
}

fn ensure_sequence(series: NumberSeries, sequence: u32) -> ResultEngine<()> {
    if sequence == 0 || sequence > series.max_sequence() {
        return Err(EngineError::InvalidInput(format!(
            "{} sequence out of range: {sequence}",
            series.key()
        )));
    }
    Ok(())
}

/// Modulo-11 check digit over `organization + sequence + year`.
///
/// Weights cycle 2..=9 starting from the rightmost digit. A result of 10 or
/// 11 becomes 0.
#[must_use]
pub fn protocol_check_digit(organization: &str, sequence: u32, year: i32) -> u8 {
    let digits = format!("{organization}{sequence:06}{year:04}");
    let sum: u32 = digits
        .bytes()
        .rev()
        .filter(u8::is_ascii_digit)
        .zip((2u32..=9).cycle())
        .map(|(digit, weight)| u32::from(digit - b'0') * weight)
        .sum();
    let check = 11 - (sum % 11);
    if check >= 10 { 0 } else { check as u8 }
}

/// Format a protocol number.
pub fn format_protocol(
    organization: &OrganizationCode,
    sequence: u32,
    year: i32,
) -> ResultEngine<String> {
    ensure_year(year)?;
    ensure_sequence(NumberSeries::Protocol, sequence)?;
    let check = protocol_check_digit(organization.as_str(), sequence, year);
    Ok(format!(
        "{}.{sequence:06}/{year:04}-{check:02}",
        organization.as_str()
    ))
}

/// Split a protocol into its parts without checking the check digit.
#[must_use]
pub fn parse_protocol(value: &str) -> Option<ProtocolParts> {
    let bytes = value.as_bytes();
    if !value.is_ascii()
        || bytes.len() != 20
        || bytes[5] != b'.'
        || bytes[12] != b'/'
        || bytes[17] != b'-'
    {
        return None;
    }
    let digits_at = |range: std::ops::Range<usize>| {
        let part = &value[range];
        part.bytes().all(|b| b.is_ascii_digit()).then_some(part)
    };
    let organization = digits_at(0..5)?;
    let sequence = digits_at(6..12)?.parse().ok()?;
    let year = digits_at(13..17)?.parse().ok()?;
    let check_digit = digits_at(18..20)?.parse().ok()?;
    Some(ProtocolParts {
        organization: organization.to_string(),
        sequence,
        year,
        check_digit,
    })
}

/// Well-formed and carrying the right check digit.
#[must_use]
pub fn is_valid_protocol(value: &str) -> bool {
    parse_protocol(value).is_some_and(|parts| {
        protocol_check_digit(&parts.organization, parts.sequence, parts.year) == parts.check_digit
    })
}

/// `YYYY` + tag, the common prefix of every number of a series in a year.
pub fn sequence_prefix(series: NumberSeries, year: i32) -> ResultEngine<String> {
    ensure_year(year)?;
    let tag = series.tag().ok_or_else(|| {
        EngineError::InvalidInput("protocols do not use a tagged prefix".to_string())
    })?;
    Ok(format!("{year:04}{tag}"))
}

/// Format a commitment or payment number, e.g. `2025NE0001`.
pub fn format_sequence_number(
    series: NumberSeries,
    year: i32,
    sequence: u32,
) -> ResultEngine<String> {
    let prefix = sequence_prefix(series, year)?;
    ensure_sequence(series, sequence)?;
    Ok(format!("{prefix}{sequence:04}"))
}

/// Parse `YYYY<tag>ssss` into `(year, sequence)`.
#[must_use]
pub fn parse_sequence_number(series: NumberSeries, value: &str) -> Option<(i32, u32)> {
    let tag = series.tag()?;
    if value.len() != 10 || !value.is_ascii() || &value[4..6] != tag {
        return None;
    }
    let year = &value[0..4];
    let sequence = &value[6..10];
    if !year.bytes().chain(sequence.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((year.parse().ok()?, sequence.parse().ok()?))
}

#[must_use]
pub fn is_valid_commitment_number(value: &str) -> bool {
    parse_sequence_number(NumberSeries::Commitment, value).is_some()
}

#[must_use]
pub fn is_valid_payment_number(value: &str) -> bool {
    parse_sequence_number(NumberSeries::Payment, value).is_some()
}

/// Year of a commitment or payment number.
#[must_use]
pub fn extract_year(value: &str) -> Option<i32> {
    parse_sequence_number(NumberSeries::Commitment, value)
        .or_else(|| parse_sequence_number(NumberSeries::Payment, value))
        .map(|(year, _)| year)
}

/// Sequence of a commitment or payment number.
#[must_use]
pub fn extract_sequence(value: &str) -> Option<u32> {
    parse_sequence_number(NumberSeries::Commitment, value)
        .or_else(|| parse_sequence_number(NumberSeries::Payment, value))
        .map(|(_, sequence)| sequence)
}
