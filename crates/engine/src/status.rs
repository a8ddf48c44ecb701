//! Lifecycle states.
//!
//! An expense status is never set by hand: it is derived from the declared
//! amount and the committed/paid totals of its children. Payment status only
//! moves from `Active` to one of the two terminal states.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{EngineError, MoneyCents, ResultEngine};

/// Kind of public expense.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseKind {
    BuildingWorks,
    RoadWorks,
    Other,
}

impl ExpenseKind {
    /// Two-letter code stored in the database.
    pub fn code(self) -> &'static str {
        match self {
            Self::BuildingWorks => "OE",
            Self::RoadWorks => "OR",
            Self::Other => "OU",
        }
    }
}

impl TryFrom<&str> for ExpenseKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "OE" => Ok(Self::BuildingWorks),
            "OR" => Ok(Self::RoadWorks),
            "OU" => Ok(Self::Other),
            other => Err(EngineError::InvalidInput(format!(
                "invalid expense kind: {other}"
            ))),
        }
    }
}

impl FromStr for ExpenseKind {
    type Err = EngineError;

    /// Accepts the stored code (`OE`) or the snake case name (`building_works`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oe" | "building_works" => Ok(Self::BuildingWorks),
            "or" | "road_works" => Ok(Self::RoadWorks),
            "ou" | "other" => Ok(Self::Other),
            _ => Err(EngineError::InvalidInput(format!("invalid expense kind: {s}"))),
        }
    }
}

impl fmt::Display for ExpenseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Status of an expense, derived from its commitment and payment totals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    AwaitingCommitment,
    PartiallyCommitted,
    AwaitingPayment,
    PartiallyPaid,
    Paid,
}

impl ExpenseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingCommitment => "awaiting_commitment",
            Self::PartiallyCommitted => "partially_committed",
            Self::AwaitingPayment => "awaiting_payment",
            Self::PartiallyPaid => "partially_paid",
            Self::Paid => "paid",
        }
    }

    /// Derive the status from the declared amount and the children totals.
    ///
    /// The function is pure: the same inputs always give the same status.
    #[must_use]
    pub fn derive(
        has_commitments: bool,
        amount: MoneyCents,
        total_committed: MoneyCents,
        total_paid: MoneyCents,
    ) -> Self {
        if !has_commitments {
            return Self::AwaitingCommitment;
        }
        if total_paid == amount {
            return Self::Paid;
        }
        if total_committed < amount {
            return Self::PartiallyCommitted;
        }
        if total_committed == amount {
            if total_paid.is_zero() {
                return Self::AwaitingPayment;
            }
            if total_paid < amount {
                return Self::PartiallyPaid;
            }
        }
        Self::AwaitingCommitment
    }

    /// The expense can still be edited or deleted.
    pub fn allows_changes(self) -> bool {
        self != Self::Paid
    }
}

impl TryFrom<&str> for ExpenseStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "awaiting_commitment" => Ok(Self::AwaitingCommitment),
            "partially_committed" => Ok(Self::PartiallyCommitted),
            "awaiting_payment" => Ok(Self::AwaitingPayment),
            "partially_paid" => Ok(Self::PartiallyPaid),
            "paid" => Ok(Self::Paid),
            other => Err(EngineError::InvalidInput(format!(
                "invalid expense status: {other}"
            ))),
        }
    }
}

impl FromStr for ExpenseStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.trim().to_ascii_lowercase().replace('-', "_").as_str())
    }
}

impl fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a payment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Active,
    Cancelled,
    Reversed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Reversed => "reversed",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != Self::Active
    }

    /// `Active → Cancelled`.
    pub fn cancel(self) -> ResultEngine<Self> {
        match self {
            Self::Active => Ok(Self::Cancelled),
            Self::Cancelled => Err(EngineError::BusinessRule(
                "payment is already cancelled".to_string(),
            )),
            Self::Reversed => Err(EngineError::BusinessRule(
                "a reversed payment cannot be cancelled".to_string(),
            )),
        }
    }

    /// `Active → Reversed`.
    pub fn reverse(self) -> ResultEngine<Self> {
        match self {
            Self::Active => Ok(Self::Reversed),
            Self::Reversed => Err(EngineError::BusinessRule(
                "payment is already reversed".to_string(),
            )),
            Self::Cancelled => Err(EngineError::BusinessRule(
                "a cancelled payment cannot be reversed".to_string(),
            )),
        }
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "active" => Ok(Self::Active),
            "cancelled" => Ok(Self::Cancelled),
            "reversed" => Ok(Self::Reversed),
            other => Err(EngineError::InvalidInput(format!(
                "invalid payment status: {other}"
            ))),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.trim().to_ascii_lowercase().as_str())
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
