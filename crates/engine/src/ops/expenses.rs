use chrono::{Datelike, Days, NaiveDate};
use sea_orm::{QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use tracing::info;
use uuid::Uuid;

use crate::{
    CreateExpenseCmd, EngineError, Expense, ExpenseKind, ExpenseStatus, MoneyCents, NumberSeries,
    ResultEngine, UpdateExpenseCmd, expenses,
    util::{normalize_key, normalize_optional_text, normalize_required_text, unique_violation},
};

use super::{Engine, tree::load_expense, with_tx};

/// Filters for listing expenses.
///
/// Date and amount ranges are inclusive on both ends. `status` matches the
/// status derived from the loaded tree, never the stored column.
#[derive(Clone, Debug, Default)]
pub struct ExpenseFilter {
    /// Substring of the protocol number.
    pub protocol: Option<String>,
    pub kind: Option<ExpenseKind>,
    pub status: Option<ExpenseStatus>,
    /// Substring of the creditor name, ignoring case and accents.
    pub creditor: Option<String>,
    pub due_from: Option<NaiveDate>,
    pub due_to: Option<NaiveDate>,
    pub min_amount: Option<MoneyCents>,
    pub max_amount: Option<MoneyCents>,
}

fn validate_expense_filter(filter: &ExpenseFilter) -> ResultEngine<()> {
    if let (Some(from), Some(to)) = (filter.due_from, filter.due_to)
        && from > to
    {
        return Err(EngineError::InvalidInput(
            "invalid range: due_from must be <= due_to".to_string(),
        ));
    }
    if let (Some(min), Some(max)) = (filter.min_amount, filter.max_amount)
        && min > max
    {
        return Err(EngineError::InvalidInput(
            "invalid range: min_amount must be <= max_amount".to_string(),
        ));
    }
    Ok(())
}

trait ApplyExpenseFilters: QueryFilter + Sized {
    fn apply_expense_filters(self, filter: &ExpenseFilter) -> Self;
}

impl<T> ApplyExpenseFilters for T
where
    T: QueryFilter + Sized,
{
    fn apply_expense_filters(mut self, filter: &ExpenseFilter) -> Self {
        if let Some(protocol) = filter.protocol.as_deref().map(str::trim)
            && !protocol.is_empty()
        {
            self = self.filter(expenses::Column::Protocol.contains(protocol));
        }
        if let Some(kind) = filter.kind {
            self = self.filter(expenses::Column::Kind.eq(kind.code()));
        }
        if let Some(creditor) = filter.creditor.as_deref() {
            let key = normalize_key(creditor);
            if !key.is_empty() {
                self = self.filter(expenses::Column::CreditorNorm.contains(key));
            }
        }
        if let Some(from) = filter.due_from {
            self = self.filter(expenses::Column::DueDate.gte(from));
        }
        if let Some(to) = filter.due_to {
            self = self.filter(expenses::Column::DueDate.lte(to));
        }
        if let Some(min) = filter.min_amount {
            self = self.filter(expenses::Column::AmountMinor.gte(min.cents()));
        }
        if let Some(max) = filter.max_amount {
            self = self.filter(expenses::Column::AmountMinor.lte(max.cents()));
        }
        self
    }
}

impl Engine {
    /// File a new expense with a freshly generated protocol number.
    pub async fn create_expense(&self, cmd: CreateExpenseCmd) -> ResultEngine<Expense> {
        self.with_number_retry("create_expense", || self.create_expense_once(&cmd))
            .await
    }

    async fn create_expense_once(&self, cmd: &CreateExpenseCmd) -> ResultEngine<Expense> {
        with_tx!(self, |db_tx| {
            let mut expense = Expense::new(
                String::new(),
                cmd.kind,
                cmd.due_date,
                &cmd.creditor,
                cmd.description.as_deref(),
                cmd.amount,
                cmd.created_by.clone(),
                cmd.recorded_at,
            )?;
            expense.protocol = self
                .allocate_number(&db_tx, NumberSeries::Protocol, cmd.recorded_at.year())
                .await?;

            expenses::ActiveModel::from(&expense)
                .insert(&db_tx)
                .await
                .map_err(|err| unique_violation(err, &expense.protocol))?;

            info!(
                protocol = %expense.protocol,
                kind = %expense.kind,
                amount = %expense.amount,
                "expense created"
            );
            Ok(expense)
        })
    }

    /// Return an expense with its commitments and payments.
    pub async fn expense(&self, expense_id: Uuid) -> ResultEngine<Expense> {
        with_tx!(self, |db_tx| {
            let mut expense = load_expense(&db_tx, expense_id).await?;
            self.refresh_status(&mut expense)?;
            Ok(expense)
        })
    }

    pub async fn expense_by_protocol(&self, protocol: &str) -> ResultEngine<Expense> {
        with_tx!(self, |db_tx| {
            let model = expenses::Entity::find()
                .filter(expenses::Column::Protocol.eq(protocol.trim()))
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound(protocol.to_string()))?;
            let mut found = self.read_expenses(&db_tx, vec![model]).await?;
            found
                .pop()
                .ok_or_else(|| EngineError::KeyNotFound(protocol.to_string()))
        })
    }

    /// Update the editable fields of an expense.
    ///
    /// Paid expenses are frozen. The declared amount cannot drop below the
    /// committed total.
    pub async fn update_expense(&self, cmd: UpdateExpenseCmd) -> ResultEngine<Expense> {
        with_tx!(self, |db_tx| {
            let mut expense = load_expense(&db_tx, cmd.expense_id).await?;
            self.refresh_status(&mut expense)?;
            if !expense.status.allows_changes() {
                return Err(EngineError::BusinessRule(format!(
                    "expense {} is paid and cannot be changed",
                    expense.protocol
                )));
            }
            if let Some(amount) = cmd.amount {
                self.ledger.validate_expense_amount_change(&expense, amount)?;
                expense.amount = amount;
            }
            if let Some(kind) = cmd.kind {
                expense.kind = kind;
            }
            if let Some(due_date) = cmd.due_date {
                expense.due_date = due_date;
            }
            if let Some(creditor) = cmd.creditor.as_deref() {
                expense.creditor = normalize_required_text(creditor, "creditor")?;
            }
            if let Some(description) = cmd.description.as_deref() {
                expense.description = normalize_optional_text(Some(description));
            }
            self.refresh_status(&mut expense)?;
            expense.updated_at = cmd.recorded_at;

            expenses::ActiveModel::from(&expense).update(&db_tx).await?;

            info!(protocol = %expense.protocol, status = %expense.status, "expense updated");
            Ok(expense)
        })
    }

    /// Delete an expense that has no commitments and is not paid.
    pub async fn delete_expense(&self, expense_id: Uuid) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            let mut expense = load_expense(&db_tx, expense_id).await?;
            self.refresh_status(&mut expense)?;
            if !expense.status.allows_changes() {
                return Err(EngineError::BusinessRule(format!(
                    "expense {} is paid and cannot be deleted",
                    expense.protocol
                )));
            }
            if !expense.commitments.is_empty() {
                return Err(EngineError::BusinessRule(format!(
                    "expense {} has {} commitment(s) and cannot be deleted",
                    expense.protocol,
                    expense.commitments.len()
                )));
            }

            expenses::Entity::delete_by_id(expense_id.to_string())
                .exec(&db_tx)
                .await?;

            info!(protocol = %expense.protocol, "expense deleted");
            Ok(())
        })
    }

    /// List expenses matching `filter`, ordered by protocol.
    pub async fn list_expenses(&self, filter: &ExpenseFilter) -> ResultEngine<Vec<Expense>> {
        validate_expense_filter(filter)?;
        with_tx!(self, |db_tx| {
            let models = expenses::Entity::find()
                .apply_expense_filters(filter)
                .order_by_asc(expenses::Column::Protocol)
                .all(&db_tx)
                .await?;
            let expenses = self.read_expenses(&db_tx, models).await?;
            Ok(expenses
                .into_iter()
                .filter(|e| filter.status.is_none_or(|status| e.status == status))
                .collect())
        })
    }

    /// Unpaid expenses whose due date is before `today`, oldest first.
    pub async fn overdue_expenses(&self, today: NaiveDate) -> ResultEngine<Vec<Expense>> {
        with_tx!(self, |db_tx| {
            let models = expenses::Entity::find()
                .filter(expenses::Column::DueDate.lt(today))
                .order_by_asc(expenses::Column::DueDate)
                .all(&db_tx)
                .await?;
            let expenses = self.read_expenses(&db_tx, models).await?;
            Ok(expenses
                .into_iter()
                .filter(|e| e.is_overdue(today))
                .collect())
        })
    }

    /// Unpaid expenses due between `today` and `today + days`, inclusive.
    pub async fn expenses_due_within(
        &self,
        today: NaiveDate,
        days: u32,
    ) -> ResultEngine<Vec<Expense>> {
        let until = today
            .checked_add_days(Days::new(u64::from(days)))
            .ok_or_else(|| EngineError::InvalidInput(format!("invalid day range: {days}")))?;
        with_tx!(self, |db_tx| {
            let models = expenses::Entity::find()
                .filter(expenses::Column::DueDate.between(today, until))
                .order_by_asc(expenses::Column::DueDate)
                .all(&db_tx)
                .await?;
            let expenses = self.read_expenses(&db_tx, models).await?;
            Ok(expenses
                .into_iter()
                .filter(|e| e.status != ExpenseStatus::Paid)
                .collect())
        })
    }
}
