//! Aggregated views over the whole ledger.
//!
//! Totals are recomputed from child rows with the engine's paid-total
//! policy, never read from cached columns.

use chrono::{Datelike, NaiveDate};
use sea_orm::{QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use serde::Serialize;

use crate::{EngineError, MoneyCents, ResultEngine, commitments, expenses};

use super::{Engine, tree::with_payments, with_tx};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExpenseStatistics {
    pub count: u64,
    pub total_declared: MoneyCents,
    pub total_committed: MoneyCents,
    pub total_paid: MoneyCents,
    /// Declared minus paid.
    pub total_remaining: MoneyCents,
    /// Unpaid expenses past their due date.
    pub overdue_count: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CommitmentStatistics {
    pub count: u64,
    pub total_committed: MoneyCents,
    pub total_paid: MoneyCents,
    /// Committed minus paid.
    pub total_remaining: MoneyCents,
    pub without_payments: u64,
}

/// Committed amount for one calendar month.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MonthlyTotal {
    /// 1 to 12.
    pub month: u32,
    pub count: u64,
    pub total: MoneyCents,
}

fn overflow() -> EngineError {
    EngineError::InvalidAmount("amount overflow".to_string())
}

fn add(acc: MoneyCents, value: MoneyCents) -> ResultEngine<MoneyCents> {
    acc.checked_add(value).ok_or_else(overflow)
}

impl Engine {
    pub async fn expense_statistics(&self, today: NaiveDate) -> ResultEngine<ExpenseStatistics> {
        with_tx!(self, |db_tx| {
            let models = expenses::Entity::find()
                .order_by_asc(expenses::Column::Protocol)
                .all(&db_tx)
                .await?;
            let expenses = self.read_expenses(&db_tx, models).await?;

            let mut stats = ExpenseStatistics::default();
            for expense in &expenses {
                stats.count += 1;
                stats.total_declared = add(stats.total_declared, expense.amount)?;
                stats.total_committed =
                    add(stats.total_committed, self.ledger.total_committed(expense)?)?;
                stats.total_paid = add(stats.total_paid, self.ledger.total_paid(expense)?)?;
                if expense.is_overdue(today) {
                    stats.overdue_count += 1;
                }
            }
            stats.total_remaining = stats
                .total_declared
                .checked_sub(stats.total_paid)
                .ok_or_else(overflow)?;
            Ok(stats)
        })
    }

    pub async fn commitment_statistics(&self) -> ResultEngine<CommitmentStatistics> {
        with_tx!(self, |db_tx| {
            let models = commitments::Entity::find().all(&db_tx).await?;
            let commitments = with_payments(&db_tx, models).await?;

            let mut stats = CommitmentStatistics::default();
            for commitment in &commitments {
                stats.count += 1;
                stats.total_committed = add(stats.total_committed, commitment.amount)?;
                stats.total_paid = add(
                    stats.total_paid,
                    self.ledger.total_paid_for_commitment(commitment)?,
                )?;
                if !commitment.has_payments() {
                    stats.without_payments += 1;
                }
            }
            stats.total_remaining = stats
                .total_committed
                .checked_sub(stats.total_paid)
                .ok_or_else(overflow)?;
            Ok(stats)
        })
    }

    /// Committed totals per month of `year`, by commitment date. Months
    /// without commitments are omitted.
    pub async fn monthly_committed_totals(&self, year: i32) -> ResultEngine<Vec<MonthlyTotal>> {
        let first = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| EngineError::InvalidInput(format!("invalid year: {year}")))?;
        let last = NaiveDate::from_ymd_opt(year, 12, 31)
            .ok_or_else(|| EngineError::InvalidInput(format!("invalid year: {year}")))?;
        with_tx!(self, |db_tx| {
            let models = commitments::Entity::find()
                .filter(commitments::Column::CommittedOn.between(first, last))
                .order_by_asc(commitments::Column::CommittedOn)
                .all(&db_tx)
                .await?;

            let mut totals: Vec<MonthlyTotal> = Vec::new();
            for model in models {
                let month = model.committed_on.month();
                let amount = MoneyCents::new(model.amount_minor);
                match totals.last_mut() {
                    Some(current) if current.month == month => {
                        current.count += 1;
                        current.total = add(current.total, amount)?;
                    }
                    _ => totals.push(MonthlyTotal {
                        month,
                        count: 1,
                        total: amount,
                    }),
                }
            }
            Ok(totals)
        })
    }
}
