//! Expenditure ledger engine.
//!
//! Tracks the Expense → Commitment → Payment lifecycle on top of a relational
//! store, keeping committed and paid totals within their parent ceilings and
//! deriving every expense status from the sums of its children.

pub use commands::{
    CreateCommitmentCmd, CreateExpenseCmd, CreatePaymentCmd, UpdateCommitmentCmd,
    UpdateExpenseCmd, UpdatePaymentCmd,
};
pub use commitments::Commitment;
pub use error::EngineError;
pub use expenses::Expense;
pub use ledger::{Availability, Ledger, PaidTotalPolicy};
pub use money::MoneyCents;
pub use numbering::{NumberSeries, OrganizationCode, ProtocolParts};
pub use ops::{
    CommitmentFilter, CommitmentStatistics, Engine, EngineBuilder, EngineOptions, ExpenseFilter,
    ExpenseStatistics, MonthlyTotal, PaymentFilter,
};
pub use payments::Payment;
pub use status::{ExpenseKind, ExpenseStatus, PaymentStatus};

mod commands;
mod commitments;
mod error;
mod expenses;
mod ledger;
mod money;
pub mod numbering;
mod number_sequences;
mod ops;
mod payments;
mod status;
mod util;

pub type ResultEngine<T> = Result<T, EngineError>;
