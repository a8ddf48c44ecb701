use chrono::{DateTime, Datelike, NaiveDate, Utc};
use sea_orm::{DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use tracing::info;
use uuid::Uuid;

use crate::{
    Availability, CreatePaymentCmd, EngineError, Expense, MoneyCents, NumberSeries, Payment,
    PaymentStatus, ResultEngine, UpdatePaymentCmd, commitments, expenses, payments,
    util::{normalize_optional_text, parse_uuid, unique_violation},
};

use super::{
    Engine,
    tree::{
        commitment_index, commitment_model, expense_model, load_expense_of_commitment,
        payment_model,
    },
    with_tx,
};

/// Filters for listing payments.
///
/// Date and amount ranges are inclusive on both ends.
#[derive(Clone, Debug, Default)]
pub struct PaymentFilter {
    /// Substring of the payment number.
    pub number: Option<String>,
    pub commitment_id: Option<Uuid>,
    pub expense_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub min_amount: Option<MoneyCents>,
    pub max_amount: Option<MoneyCents>,
    pub status: Option<PaymentStatus>,
}

fn validate_payment_filter(filter: &PaymentFilter) -> ResultEngine<()> {
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

trait ApplyPaymentFilters: QueryFilter + Sized {
    fn apply_payment_filters(self, filter: &PaymentFilter) -> Self;
}

impl<T> ApplyPaymentFilters for T
where
    T: QueryFilter + Sized,
{
    fn apply_payment_filters(mut self, filter: &PaymentFilter) -> Self {
        if let Some(number) = filter.number.as_deref().map(str::trim)
            && !number.is_empty()
        {
            self = self.filter(payments::Column::Number.contains(number));
        }
        if let Some(commitment_id) = filter.commitment_id {
            self = self.filter(payments::Column::CommitmentId.eq(commitment_id.to_string()));
        }
        if let Some(from) = filter.from {
            self = self.filter(payments::Column::PaidOn.gte(from));
        }
        if let Some(to) = filter.to {
            self = self.filter(payments::Column::PaidOn.lte(to));
        }
        if let Some(min) = filter.min_amount {
            self = self.filter(payments::Column::AmountMinor.gte(min.cents()));
        }
        if let Some(max) = filter.max_amount {
            self = self.filter(payments::Column::AmountMinor.lte(max.cents()));
        }
        if let Some(status) = filter.status {
            self = self.filter(payments::Column::Status.eq(status.as_str()));
        }
        self
    }
}

/// Ids of the commitments of an expense.
async fn commitment_ids_of(db: &DatabaseTransaction, expense_id: &str) -> ResultEngine<Vec<String>> {
    Ok(commitments::Entity::find()
        .filter(commitments::Column::ExpenseId.eq(expense_id))
        .all(db)
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect())
}

async fn payments_of_commitments(
    db: &DatabaseTransaction,
    commitment_ids: Vec<String>,
) -> ResultEngine<Vec<Payment>> {
    if commitment_ids.is_empty() {
        return Ok(Vec::new());
    }
    payments::Entity::find()
        .filter(payments::Column::CommitmentId.is_in(commitment_ids))
        .order_by_asc(payments::Column::Number)
        .all(db)
        .await?
        .into_iter()
        .map(Payment::try_from)
        .collect()
}

/// Position of a payment inside its expense tree: `(commitment, payment)`.
fn payment_position(expense: &Expense, payment_id: Uuid) -> ResultEngine<(usize, usize)> {
    expense
        .commitments
        .iter()
        .enumerate()
        .find_map(|(ci, c)| {
            c.payments
                .iter()
                .position(|p| p.id == payment_id)
                .map(|pi| (ci, pi))
        })
        .ok_or_else(|| EngineError::KeyNotFound(payment_id.to_string()))
}

/// What happens to an active payment.
#[derive(Clone, Copy, Debug)]
enum Settlement {
    Cancel,
    Reverse,
}

impl Engine {
    /// Pay part of a commitment.
    ///
    /// Fails when the paid total would exceed the commitment amount. The
    /// expense status is recomputed in the same transaction.
    pub async fn create_payment(&self, cmd: CreatePaymentCmd) -> ResultEngine<Payment> {
        self.with_number_retry("create_payment", || self.create_payment_once(&cmd))
            .await
    }

    async fn create_payment_once(&self, cmd: &CreatePaymentCmd) -> ResultEngine<Payment> {
        with_tx!(self, |db_tx| {
            let mut expense = load_expense_of_commitment(&db_tx, cmd.commitment_id).await?;
            let idx = commitment_index(&expense, cmd.commitment_id)?;
            self.ledger
                .validate_new_payment(&expense.commitments[idx], cmd.amount)?;

            let number = self
                .allocate_number(&db_tx, NumberSeries::Payment, cmd.recorded_at.year())
                .await?;
            let payment = Payment::new(
                number,
                cmd.commitment_id,
                cmd.paid_on,
                cmd.amount,
                normalize_optional_text(cmd.note.as_deref()),
                cmd.created_by.clone(),
                cmd.recorded_at,
            )?;
            payments::ActiveModel::from(&payment)
                .insert(&db_tx)
                .await
                .map_err(|err| unique_violation(err, &payment.number))?;

            expense.commitments[idx].payments.push(payment.clone());
            self.store_status(&db_tx, &mut expense, cmd.recorded_at)
                .await?;

            info!(
                number = %payment.number,
                commitment = %expense.commitments[idx].number,
                amount = %payment.amount,
                status = %expense.status,
                "payment created"
            );
            Ok(payment)
        })
    }

    pub async fn payment(&self, payment_id: Uuid) -> ResultEngine<Payment> {
        with_tx!(self, |db_tx| {
            Payment::try_from(payment_model(&db_tx, payment_id).await?)
        })
    }

    pub async fn payment_by_number(&self, number: &str) -> ResultEngine<Payment> {
        with_tx!(self, |db_tx| {
            let model = payments::Entity::find()
                .filter(payments::Column::Number.eq(number.trim()))
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound(number.to_string()))?;
            Payment::try_from(model)
        })
    }

    /// Payments of a commitment, ordered by number.
    pub async fn payments_for_commitment(&self, commitment_id: Uuid) -> ResultEngine<Vec<Payment>> {
        with_tx!(self, |db_tx| {
            commitment_model(&db_tx, commitment_id).await?;
            payments_of_commitments(&db_tx, vec![commitment_id.to_string()]).await
        })
    }

    pub async fn payments_for_commitment_number(&self, number: &str) -> ResultEngine<Vec<Payment>> {
        with_tx!(self, |db_tx| {
            let commitment = commitments::Entity::find()
                .filter(commitments::Column::Number.eq(number.trim()))
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound(number.to_string()))?;
            payments_of_commitments(&db_tx, vec![commitment.id]).await
        })
    }

    /// Payments across every commitment of an expense, ordered by number.
    pub async fn payments_for_expense(&self, expense_id: Uuid) -> ResultEngine<Vec<Payment>> {
        with_tx!(self, |db_tx| {
            let expense = expense_model(&db_tx, expense_id).await?;
            let ids = commitment_ids_of(&db_tx, &expense.id).await?;
            payments_of_commitments(&db_tx, ids).await
        })
    }

    pub async fn payments_for_protocol(&self, protocol: &str) -> ResultEngine<Vec<Payment>> {
        with_tx!(self, |db_tx| {
            let expense = expenses::Entity::find()
                .filter(expenses::Column::Protocol.eq(protocol.trim()))
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound(protocol.to_string()))?;
            let ids = commitment_ids_of(&db_tx, &expense.id).await?;
            payments_of_commitments(&db_tx, ids).await
        })
    }

    /// Update an active payment.
    pub async fn update_payment(&self, cmd: UpdatePaymentCmd) -> ResultEngine<Payment> {
        with_tx!(self, |db_tx| {
            let model = payment_model(&db_tx, cmd.payment_id).await?;
            let commitment_id = parse_uuid(&model.commitment_id, "commitment")?;
            let mut expense = load_expense_of_commitment(&db_tx, commitment_id).await?;
            let (ci, pi) = payment_position(&expense, cmd.payment_id)?;

            let commitment = &expense.commitments[ci];
            let payment = &commitment.payments[pi];
            if payment.status.is_terminal() {
                return Err(EngineError::BusinessRule(format!(
                    "payment {} is {} and cannot be changed",
                    payment.number, payment.status
                )));
            }
            if let Some(amount) = cmd.amount {
                self.ledger
                    .validate_payment_amount_change(commitment, payment, amount)?;
            }

            let payment = &mut expense.commitments[ci].payments[pi];
            if let Some(amount) = cmd.amount {
                payment.amount = amount;
            }
            if let Some(paid_on) = cmd.paid_on {
                payment.paid_on = paid_on;
            }
            if let Some(note) = cmd.note.as_deref() {
                payment.note = normalize_optional_text(Some(note));
            }
            payment.updated_at = cmd.recorded_at;
            payments::ActiveModel::from(&*payment).update(&db_tx).await?;
            let updated = payment.clone();

            self.store_status(&db_tx, &mut expense, cmd.recorded_at)
                .await?;

            info!(
                number = %updated.number,
                amount = %updated.amount,
                status = %expense.status,
                "payment updated"
            );
            Ok(updated)
        })
    }

    /// Delete an active payment.
    pub async fn delete_payment(
        &self,
        payment_id: Uuid,
        recorded_at: DateTime<Utc>,
    ) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            let model = payment_model(&db_tx, payment_id).await?;
            let commitment_id = parse_uuid(&model.commitment_id, "commitment")?;
            let mut expense = load_expense_of_commitment(&db_tx, commitment_id).await?;
            let (ci, pi) = payment_position(&expense, payment_id)?;

            let payment = &expense.commitments[ci].payments[pi];
            if payment.status.is_terminal() {
                return Err(EngineError::BusinessRule(format!(
                    "payment {} is {} and cannot be deleted",
                    payment.number, payment.status
                )));
            }

            payments::Entity::delete_by_id(payment_id.to_string())
                .exec(&db_tx)
                .await?;
            let removed = expense.commitments[ci].payments.remove(pi);
            self.store_status(&db_tx, &mut expense, recorded_at).await?;

            info!(
                number = %removed.number,
                status = %expense.status,
                "payment deleted"
            );
            Ok(())
        })
    }

    /// Cancel an active payment, appending the reason to its note.
    pub async fn cancel_payment(
        &self,
        payment_id: Uuid,
        reason: &str,
        recorded_at: DateTime<Utc>,
    ) -> ResultEngine<Payment> {
        self.settle_payment(payment_id, Settlement::Cancel, reason, recorded_at)
            .await
    }

    /// Reverse an active payment, appending the reason to its note.
    pub async fn reverse_payment(
        &self,
        payment_id: Uuid,
        reason: &str,
        recorded_at: DateTime<Utc>,
    ) -> ResultEngine<Payment> {
        self.settle_payment(payment_id, Settlement::Reverse, reason, recorded_at)
            .await
    }

    async fn settle_payment(
        &self,
        payment_id: Uuid,
        settlement: Settlement,
        reason: &str,
        recorded_at: DateTime<Utc>,
    ) -> ResultEngine<Payment> {
        with_tx!(self, |db_tx| {
            let model = payment_model(&db_tx, payment_id).await?;
            let commitment_id = parse_uuid(&model.commitment_id, "commitment")?;
            let mut expense = load_expense_of_commitment(&db_tx, commitment_id).await?;
            let (ci, pi) = payment_position(&expense, payment_id)?;

            let payment = &mut expense.commitments[ci].payments[pi];
            match settlement {
                Settlement::Cancel => payment.cancel(reason, recorded_at)?,
                Settlement::Reverse => payment.reverse(reason, recorded_at)?,
            }
            payments::ActiveModel::from(&*payment).update(&db_tx).await?;
            let settled = payment.clone();

            self.store_status(&db_tx, &mut expense, recorded_at).await?;

            info!(
                number = %settled.number,
                payment_status = %settled.status,
                status = %expense.status,
                "payment settled"
            );
            Ok(settled)
        })
    }

    /// List payments matching `filter`, ordered by number.
    pub async fn list_payments(&self, filter: &PaymentFilter) -> ResultEngine<Vec<Payment>> {
        validate_payment_filter(filter)?;
        with_tx!(self, |db_tx| {
            let mut query = payments::Entity::find().apply_payment_filters(filter);
            if let Some(expense_id) = filter.expense_id {
                let ids = commitment_ids_of(&db_tx, &expense_id.to_string()).await?;
                query = query.filter(payments::Column::CommitmentId.is_in(ids));
            }
            let found = query
                .order_by_asc(payments::Column::Number)
                .all(&db_tx)
                .await?
                .into_iter()
                .map(Payment::try_from)
                .collect::<ResultEngine<Vec<Payment>>>()?;
            Ok(found)
        })
    }

    /// Whether `requested` can still be paid against the commitment.
    pub async fn payment_availability(
        &self,
        commitment_id: Uuid,
        requested: MoneyCents,
    ) -> ResultEngine<Availability> {
        with_tx!(self, |db_tx| {
            let expense = load_expense_of_commitment(&db_tx, commitment_id).await?;
            let idx = commitment_index(&expense, commitment_id)?;
            self.ledger
                .payment_availability(&expense.commitments[idx], requested)
        })
    }
}
