//! Ledger invariants.
//!
//! Pure checks over a loaded expense tree:
//!
//! - Σ commitment.amount ≤ expense.amount
//! - Σ payment.amount ≤ commitment.amount
//!
//! Totals are always recomputed from the children. Which payments count
//! towards "paid" is decided by [`PaidTotalPolicy`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    Commitment, EngineError, Expense, ExpenseStatus, MoneyCents, Payment, PaymentStatus,
    ResultEngine, util::ensure_positive,
};

/// Which payments count towards the paid total.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaidTotalPolicy {
    /// Cancelled and reversed payments are ignored.
    #[default]
    ActiveOnly,
    /// Every recorded payment counts, whatever its status.
    AllRecorded,
}

impl PaidTotalPolicy {
    pub fn counts(self, status: PaymentStatus) -> bool {
        match self {
            Self::ActiveOnly => status == PaymentStatus::Active,
            Self::AllRecorded => true,
        }
    }
}

impl FromStr for PaidTotalPolicy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "active_only" => Ok(Self::ActiveOnly),
            "all_recorded" => Ok(Self::AllRecorded),
            other => Err(EngineError::InvalidInput(format!(
                "invalid paid total policy: {other}"
            ))),
        }
    }
}

/// Outcome of a non-failing availability check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub valid: bool,
    pub available: MoneyCents,
    pub requested: MoneyCents,
    pub message: String,
}

fn overflow() -> EngineError {
    EngineError::InvalidAmount("amount overflow".to_string())
}

fn sum(amounts: impl IntoIterator<Item = MoneyCents>) -> ResultEngine<MoneyCents> {
    MoneyCents::checked_sum(amounts).ok_or_else(overflow)
}

fn add(a: MoneyCents, b: MoneyCents) -> ResultEngine<MoneyCents> {
    a.checked_add(b).ok_or_else(overflow)
}

fn sub(a: MoneyCents, b: MoneyCents) -> ResultEngine<MoneyCents> {
    a.checked_sub(b).ok_or_else(overflow)
}

/// Ledger rules under a given paid-total policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Ledger {
    policy: PaidTotalPolicy,
}

impl Ledger {
    pub fn new(policy: PaidTotalPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> PaidTotalPolicy {
        self.policy
    }

    /// Amount a single payment contributes to the paid total.
    pub fn counted_amount(&self, payment: &Payment) -> MoneyCents {
        if self.policy.counts(payment.status) {
            payment.amount
        } else {
            MoneyCents::ZERO
        }
    }

    pub fn total_committed(&self, expense: &Expense) -> ResultEngine<MoneyCents> {
        sum(expense.commitments.iter().map(|c| c.amount))
    }

    pub fn total_paid_for_commitment(&self, commitment: &Commitment) -> ResultEngine<MoneyCents> {
        sum(commitment.payments.iter().map(|p| self.counted_amount(p)))
    }

    pub fn total_paid(&self, expense: &Expense) -> ResultEngine<MoneyCents> {
        let per_commitment = expense
            .commitments
            .iter()
            .map(|c| self.total_paid_for_commitment(c))
            .collect::<ResultEngine<Vec<_>>>()?;
        sum(per_commitment)
    }

    /// Status of the expense given its current children.
    pub fn derive_status(&self, expense: &Expense) -> ResultEngine<ExpenseStatus> {
        Ok(ExpenseStatus::derive(
            !expense.commitments.is_empty(),
            expense.amount,
            self.total_committed(expense)?,
            self.total_paid(expense)?,
        ))
    }

    /// Check that a new commitment of `proposed` fits the expense.
    pub fn validate_new_commitment(
        &self,
        expense: &Expense,
        proposed: MoneyCents,
    ) -> ResultEngine<()> {
        ensure_positive(proposed, "commitment amount")?;
        if self.derive_status(expense)? == ExpenseStatus::Paid {
            return Err(EngineError::BusinessRule(format!(
                "expense {} is fully paid and accepts no new commitments",
                expense.protocol
            )));
        }
        let committed = self.total_committed(expense)?;
        let after = add(committed, proposed)?;
        if after > expense.amount {
            let excess = sub(after, expense.amount)?;
            let available = sub(expense.amount, committed)?;
            return Err(EngineError::BusinessRule(format!(
                "commitment of {proposed} exceeds the expense by {excess} \
                 (available: {available}, already committed: {committed})"
            )));
        }
        Ok(())
    }

    /// Check a new amount for an existing commitment of `expense`.
    pub fn validate_commitment_amount_change(
        &self,
        expense: &Expense,
        commitment: &Commitment,
        new_amount: MoneyCents,
    ) -> ResultEngine<()> {
        ensure_positive(new_amount, "commitment amount")?;
        let paid = self.total_paid_for_commitment(commitment)?;
        if new_amount < paid {
            return Err(EngineError::BusinessRule(format!(
                "commitment {} cannot go below its paid total: requested {new_amount}, \
                 already paid {paid}",
                commitment.number
            )));
        }
        let committed = self.total_committed(expense)?;
        let others = sub(committed, commitment.amount)?;
        let after = add(others, new_amount)?;
        if after > expense.amount {
            let available = sub(expense.amount, others)?;
            return Err(EngineError::BusinessRule(format!(
                "commitment {} of {new_amount} exceeds the expense \
                 (available: {available}, other commitments: {others})",
                commitment.number
            )));
        }
        Ok(())
    }

    /// Check that a new payment of `proposed` fits the commitment.
    pub fn validate_new_payment(
        &self,
        commitment: &Commitment,
        proposed: MoneyCents,
    ) -> ResultEngine<()> {
        ensure_positive(proposed, "payment amount")?;
        let paid = self.total_paid_for_commitment(commitment)?;
        let after = add(paid, proposed)?;
        if after > commitment.amount {
            let available = sub(commitment.amount, paid)?;
            return Err(EngineError::BusinessRule(format!(
                "payment of {proposed} exceeds commitment {} \
                 (available: {available}, already paid: {paid})",
                commitment.number
            )));
        }
        Ok(())
    }

    /// Check a new amount for an existing payment of `commitment`.
    pub fn validate_payment_amount_change(
        &self,
        commitment: &Commitment,
        payment: &Payment,
        new_amount: MoneyCents,
    ) -> ResultEngine<()> {
        ensure_positive(new_amount, "payment amount")?;
        let paid = self.total_paid_for_commitment(commitment)?;
        let others = sub(paid, self.counted_amount(payment))?;
        let after = add(others, new_amount)?;
        if after > commitment.amount {
            let available = sub(commitment.amount, others)?;
            return Err(EngineError::BusinessRule(format!(
                "payment {} of {new_amount} exceeds commitment {} \
                 (available: {available}, other payments: {others})",
                payment.number, commitment.number
            )));
        }
        Ok(())
    }

    /// The declared amount cannot drop below what is already committed.
    pub fn validate_expense_amount_change(
        &self,
        expense: &Expense,
        new_amount: MoneyCents,
    ) -> ResultEngine<()> {
        ensure_positive(new_amount, "expense amount")?;
        let committed = self.total_committed(expense)?;
        if new_amount < committed {
            return Err(EngineError::BusinessRule(format!(
                "expense {} cannot go below its committed total: requested {new_amount}, \
                 already committed {committed}",
                expense.protocol
            )));
        }
        Ok(())
    }

    pub fn commitment_availability(
        &self,
        expense: &Expense,
        requested: MoneyCents,
    ) -> ResultEngine<Availability> {
        let available = sub(expense.amount, self.total_committed(expense)?)?;
        Ok(availability(
            self.validate_new_commitment(expense, requested),
            available,
            requested,
        ))
    }

    pub fn payment_availability(
        &self,
        commitment: &Commitment,
        requested: MoneyCents,
    ) -> ResultEngine<Availability> {
        let available = sub(
            commitment.amount,
            self.total_paid_for_commitment(commitment)?,
        )?;
        Ok(availability(
            self.validate_new_payment(commitment, requested),
            available,
            requested,
        ))
    }
}

fn availability(
    check: ResultEngine<()>,
    available: MoneyCents,
    requested: MoneyCents,
) -> Availability {
    match check {
        Ok(()) => Availability {
            valid: true,
            available,
            requested,
            message: format!("{requested} available (remaining {available})"),
        },
        Err(err) => Availability {
            valid: false,
            available,
            requested,
            message: err.to_string(),
        },
    }
}
