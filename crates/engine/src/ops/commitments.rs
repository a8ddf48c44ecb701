use chrono::{DateTime, Datelike, NaiveDate, Utc};
use sea_orm::{QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use tracing::info;
use uuid::Uuid;

use crate::{
    Availability, Commitment, CreateCommitmentCmd, EngineError, MoneyCents, NumberSeries,
    ResultEngine, UpdateCommitmentCmd, commitments, expenses,
    util::{normalize_optional_text, unique_violation},
};

use super::{
    Engine,
    tree::{
        commitment_index, commitment_model, expense_model, load_expense,
        load_expense_of_commitment, with_payments,
    },
    with_tx,
};

/// Filters for listing commitments.
///
/// Date and amount ranges are inclusive on both ends.
#[derive(Clone, Debug, Default)]
pub struct CommitmentFilter {
    /// Substring of the commitment number.
    pub number: Option<String>,
    pub expense_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub min_amount: Option<MoneyCents>,
    pub max_amount: Option<MoneyCents>,
    /// `Some(true)` keeps only commitments with payments, `Some(false)` only
    /// those without.
    pub has_payments: Option<bool>,
}

fn validate_commitment_filter(filter: &CommitmentFilter) -> ResultEngine<()> {
    if let (Some(from), Some(to)) = (filter.from, filter.to)
        && from > to
    {
        return Err(EngineError::InvalidInput(
            "invalid range: from must be <= to".to_string(),
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

trait ApplyCommitmentFilters: QueryFilter + Sized {
    fn apply_commitment_filters(self, filter: &CommitmentFilter) -> Self;
}

impl<T> ApplyCommitmentFilters for T
where
    T: QueryFilter + Sized,
{
    fn apply_commitment_filters(mut self, filter: &CommitmentFilter) -> Self {
        if let Some(number) = filter.number.as_deref().map(str::trim)
            && !number.is_empty()
        {
            self = self.filter(commitments::Column::Number.contains(number));
        }
        if let Some(expense_id) = filter.expense_id {
            self = self.filter(commitments::Column::ExpenseId.eq(expense_id.to_string()));
        }
        if let Some(from) = filter.from {
            self = self.filter(commitments::Column::CommittedOn.gte(from));
        }
        if let Some(to) = filter.to {
            self = self.filter(commitments::Column::CommittedOn.lte(to));
        }
        if let Some(min) = filter.min_amount {
            self = self.filter(commitments::Column::AmountMinor.gte(min.cents()));
        }
        if let Some(max) = filter.max_amount {
            self = self.filter(commitments::Column::AmountMinor.lte(max.cents()));
        }
        self
    }
}

impl Engine {
    /// Commit part of an expense.
    ///
    /// Fails when the expense is paid or when the new total would exceed the
    /// declared amount. The expense status is recomputed in the same
    /// transaction.
    pub async fn create_commitment(&self, cmd: CreateCommitmentCmd) -> ResultEngine<Commitment> {
        self.with_number_retry("create_commitment", || self.create_commitment_once(&cmd))
            .await
    }

    async fn create_commitment_once(
        &self,
        cmd: &CreateCommitmentCmd,
    ) -> ResultEngine<Commitment> {
        with_tx!(self, |db_tx| {
            let mut expense = load_expense(&db_tx, cmd.expense_id).await?;
            self.ledger.validate_new_commitment(&expense, cmd.amount)?;

            let number = self
                .allocate_number(&db_tx, NumberSeries::Commitment, cmd.recorded_at.year())
                .await?;
            let commitment = Commitment::new(
                number,
                expense.id,
                cmd.committed_on,
                cmd.amount,
                normalize_optional_text(cmd.note.as_deref()),
                cmd.created_by.clone(),
                cmd.recorded_at,
            )?;
            commitments::ActiveModel::from(&commitment)
                .insert(&db_tx)
                .await
                .map_err(|err| unique_violation(err, &commitment.number))?;

            expense.commitments.push(commitment.clone());
            self.store_status(&db_tx, &mut expense, cmd.recorded_at)
                .await?;

            info!(
                number = %commitment.number,
                protocol = %expense.protocol,
                amount = %commitment.amount,
                status = %expense.status,
                "commitment created"
            );
            Ok(commitment)
        })
    }

    /// Return a commitment with its payments.
    pub async fn commitment(&self, commitment_id: Uuid) -> ResultEngine<Commitment> {
        with_tx!(self, |db_tx| {
            let model = commitment_model(&db_tx, commitment_id).await?;
            let mut found = with_payments(&db_tx, vec![model]).await?;
            found
                .pop()
                .ok_or_else(|| EngineError::KeyNotFound(commitment_id.to_string()))
        })
    }

    pub async fn commitment_by_number(&self, number: &str) -> ResultEngine<Commitment> {
        with_tx!(self, |db_tx| {
            let model = commitments::Entity::find()
                .filter(commitments::Column::Number.eq(number.trim()))
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound(number.to_string()))?;
            let mut found = with_payments(&db_tx, vec![model]).await?;
            found
                .pop()
                .ok_or_else(|| EngineError::KeyNotFound(number.to_string()))
        })
    }

    /// Commitments of an expense, ordered by number.
    pub async fn commitments_for_expense(
        &self,
        expense_id: Uuid,
    ) -> ResultEngine<Vec<Commitment>> {
        with_tx!(self, |db_tx| {
            expense_model(&db_tx, expense_id).await?;
            let models = commitments::Entity::find()
                .filter(commitments::Column::ExpenseId.eq(expense_id.to_string()))
                .order_by_asc(commitments::Column::Number)
                .all(&db_tx)
                .await?;
            with_payments(&db_tx, models).await
        })
    }

    /// Commitments of the expense filed under `protocol`.
    pub async fn commitments_for_protocol(&self, protocol: &str) -> ResultEngine<Vec<Commitment>> {
        with_tx!(self, |db_tx| {
            let expense = expenses::Entity::find()
                .filter(expenses::Column::Protocol.eq(protocol.trim()))
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound(protocol.to_string()))?;
            let models = commitments::Entity::find()
                .filter(commitments::Column::ExpenseId.eq(expense.id))
                .order_by_asc(commitments::Column::Number)
                .all(&db_tx)
                .await?;
            with_payments(&db_tx, models).await
        })
    }

    /// Update a commitment without payments.
    ///
    /// A new amount must stay above the paid total and keep the expense
    /// within its declared amount.
    pub async fn update_commitment(&self, cmd: UpdateCommitmentCmd) -> ResultEngine<Commitment> {
        with_tx!(self, |db_tx| {
            let mut expense = load_expense_of_commitment(&db_tx, cmd.commitment_id).await?;
            let idx = commitment_index(&expense, cmd.commitment_id)?;

            if let Some(amount) = cmd.amount {
                self.ledger
                    .validate_commitment_amount_change(&expense, &expense.commitments[idx], amount)?;
            }
            let commitment = &mut expense.commitments[idx];
            if commitment.has_payments() {
                return Err(EngineError::BusinessRule(format!(
                    "commitment {} has payments and cannot be changed",
                    commitment.number
                )));
            }

            if let Some(amount) = cmd.amount {
                commitment.amount = amount;
            }
            if let Some(committed_on) = cmd.committed_on {
                commitment.committed_on = committed_on;
            }
            if let Some(note) = cmd.note.as_deref() {
                commitment.note = normalize_optional_text(Some(note));
            }
            commitment.updated_at = cmd.recorded_at;
            commitments::ActiveModel::from(&*commitment)
                .update(&db_tx)
                .await?;
            let updated = commitment.clone();

            self.store_status(&db_tx, &mut expense, cmd.recorded_at)
                .await?;

            info!(
                number = %updated.number,
                amount = %updated.amount,
                status = %expense.status,
                "commitment updated"
            );
            Ok(updated)
        })
    }

    /// Delete a commitment without payments.
    pub async fn delete_commitment(
        &self,
        commitment_id: Uuid,
        recorded_at: DateTime<Utc>,
    ) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            let mut expense = load_expense_of_commitment(&db_tx, commitment_id).await?;
            let idx = commitment_index(&expense, commitment_id)?;
            let commitment = &expense.commitments[idx];
            if commitment.has_payments() {
                return Err(EngineError::BusinessRule(format!(
                    "commitment {} has {} payment(s) and cannot be deleted",
                    commitment.number,
                    commitment.payments.len()
                )));
            }

            commitments::Entity::delete_by_id(commitment_id.to_string())
                .exec(&db_tx)
                .await?;
            let removed = expense.commitments.remove(idx);
            self.store_status(&db_tx, &mut expense, recorded_at).await?;

            info!(
                number = %removed.number,
                protocol = %expense.protocol,
                status = %expense.status,
                "commitment deleted"
            );
            Ok(())
        })
    }

    /// List commitments matching `filter`, ordered by number.
    pub async fn list_commitments(
        &self,
        filter: &CommitmentFilter,
    ) -> ResultEngine<Vec<Commitment>> {
        validate_commitment_filter(filter)?;
        with_tx!(self, |db_tx| {
            let models = commitments::Entity::find()
                .apply_commitment_filters(filter)
                .order_by_asc(commitments::Column::Number)
                .all(&db_tx)
                .await?;
            let found = with_payments(&db_tx, models).await?;
            Ok(match filter.has_payments {
                Some(wanted) => found
                    .into_iter()
                    .filter(|c| c.has_payments() == wanted)
                    .collect(),
                None => found,
            })
        })
    }

    /// Whether `requested` can still be committed against the expense.
    pub async fn commitment_availability(
        &self,
        expense_id: Uuid,
        requested: MoneyCents,
    ) -> ResultEngine<Availability> {
        with_tx!(self, |db_tx| {
            let expense = load_expense(&db_tx, expense_id).await?;
            self.ledger.commitment_availability(&expense, requested)
        })
    }
}
