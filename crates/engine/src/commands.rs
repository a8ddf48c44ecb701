//! Command structs for engine operations.
//!
//! These types group parameters for write operations (create/update of
//! expenses, commitments and payments), keeping call sites readable and
//! avoiding long argument lists.
//!
//! Every command carries `recorded_at`: the instant of the operation. It
//! stamps `created_at`/`updated_at` and selects the year of generated
//! numbers.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{ExpenseKind, MoneyCents};

/// File a new expense. The protocol number is generated.
#[derive(Clone, Debug)]
pub struct CreateExpenseCmd {
    pub kind: ExpenseKind,
    pub due_date: NaiveDate,
    pub creditor: String,
    pub description: Option<String>,
    pub amount: MoneyCents,
    pub created_by: String,
    pub recorded_at: DateTime<Utc>,
}

impl CreateExpenseCmd {
    #[must_use]
    pub fn new(
        kind: ExpenseKind,
        creditor: impl Into<String>,
        amount: MoneyCents,
        due_date: NaiveDate,
        created_by: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            due_date,
            creditor: creditor.into(),
            description: None,
            amount,
            created_by: created_by.into(),
            recorded_at,
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Update an expense. Unset fields are left untouched.
#[derive(Clone, Debug)]
pub struct UpdateExpenseCmd {
    pub expense_id: Uuid,
    pub kind: Option<ExpenseKind>,
    pub due_date: Option<NaiveDate>,
    pub creditor: Option<String>,
    pub description: Option<String>,
    pub amount: Option<MoneyCents>,
    pub recorded_at: DateTime<Utc>,
}

impl UpdateExpenseCmd {
    #[must_use]
    pub fn new(expense_id: Uuid, recorded_at: DateTime<Utc>) -> Self {
        Self {
            expense_id,
            kind: None,
            due_date: None,
            creditor: None,
            description: None,
            amount: None,
            recorded_at,
        }
    }

    #[must_use]
    pub fn kind(mut self, kind: ExpenseKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    #[must_use]
    pub fn creditor(mut self, creditor: impl Into<String>) -> Self {
        self.creditor = Some(creditor.into());
        self
    }

    /// Replace the description. An empty string clears it.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn amount(mut self, amount: MoneyCents) -> Self {
        self.amount = Some(amount);
        self
    }
}

/// Commit part of an expense. The commitment number is generated.
#[derive(Clone, Debug)]
pub struct CreateCommitmentCmd {
    pub expense_id: Uuid,
    pub amount: MoneyCents,
    pub committed_on: NaiveDate,
    pub note: Option<String>,
    pub created_by: String,
    pub recorded_at: DateTime<Utc>,
}

impl CreateCommitmentCmd {
    #[must_use]
    pub fn new(
        expense_id: Uuid,
        amount: MoneyCents,
        committed_on: NaiveDate,
        created_by: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            expense_id,
            amount,
            committed_on,
            note: None,
            created_by: created_by.into(),
            recorded_at,
        }
    }

    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Update a commitment. The parent expense cannot be changed.
#[derive(Clone, Debug)]
pub struct UpdateCommitmentCmd {
    pub commitment_id: Uuid,
    pub amount: Option<MoneyCents>,
    pub committed_on: Option<NaiveDate>,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl UpdateCommitmentCmd {
    #[must_use]
    pub fn new(commitment_id: Uuid, recorded_at: DateTime<Utc>) -> Self {
        Self {
            commitment_id,
            amount: None,
            committed_on: None,
            note: None,
            recorded_at,
        }
    }

    #[must_use]
    pub fn amount(mut self, amount: MoneyCents) -> Self {
        self.amount = Some(amount);
        self
    }

    #[must_use]
    pub fn committed_on(mut self, committed_on: NaiveDate) -> Self {
        self.committed_on = Some(committed_on);
        self
    }

    /// Replace the note. An empty string clears it.
    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Pay part of a commitment. The payment number is generated.
#[derive(Clone, Debug)]
pub struct CreatePaymentCmd {
    pub commitment_id: Uuid,
    pub amount: MoneyCents,
    pub paid_on: NaiveDate,
    pub note: Option<String>,
    pub created_by: String,
    pub recorded_at: DateTime<Utc>,
}

impl CreatePaymentCmd {
    #[must_use]
    pub fn new(
        commitment_id: Uuid,
        amount: MoneyCents,
        paid_on: NaiveDate,
        created_by: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            commitment_id,
            amount,
            paid_on,
            note: None,
            created_by: created_by.into(),
            recorded_at,
        }
    }

    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Update an active payment.
#[derive(Clone, Debug)]
pub struct UpdatePaymentCmd {
    pub payment_id: Uuid,
    pub amount: Option<MoneyCents>,
    pub paid_on: Option<NaiveDate>,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl UpdatePaymentCmd {
    #[must_use]
    pub fn new(payment_id: Uuid, recorded_at: DateTime<Utc>) -> Self {
        Self {
            payment_id,
            amount: None,
            paid_on: None,
            note: None,
            recorded_at,
        }
    }

    #[must_use]
    pub fn amount(mut self, amount: MoneyCents) -> Self {
        self.amount = Some(amount);
        self
    }

    #[must_use]
    pub fn paid_on(mut self, paid_on: NaiveDate) -> Self {
        self.paid_on = Some(paid_on);
        self
    }

    /// Replace the note. An empty string clears it.
    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}
