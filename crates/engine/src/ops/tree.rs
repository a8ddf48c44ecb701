//! Loading expense trees and keeping the cached status in sync.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseTransaction, QueryFilter, QueryOrder, prelude::*};
use tracing::debug;
use uuid::Uuid;

use crate::{
    Commitment, EngineError, Expense, Payment, ResultEngine, commitments, expenses, payments,
};

use super::Engine;

pub(super) async fn expense_model(
    db: &DatabaseTransaction,
    expense_id: Uuid,
) -> ResultEngine<expenses::Model> {
    expenses::Entity::find_by_id(expense_id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound(expense_id.to_string()))
}

pub(super) async fn commitment_model(
    db: &DatabaseTransaction,
    commitment_id: Uuid,
) -> ResultEngine<commitments::Model> {
    commitments::Entity::find_by_id(commitment_id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound(commitment_id.to_string()))
}

pub(super) async fn payment_model(
    db: &DatabaseTransaction,
    payment_id: Uuid,
) -> ResultEngine<payments::Model> {
    payments::Entity::find_by_id(payment_id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound(payment_id.to_string()))
}

/// Payments of the given commitments, grouped by commitment id and ordered by number.
pub(super) async fn payments_by_commitment(
    db: &DatabaseTransaction,
    commitment_ids: Vec<String>,
) -> ResultEngine<HashMap<Uuid, Vec<Payment>>> {
    let mut out: HashMap<Uuid, Vec<Payment>> = HashMap::new();
    if commitment_ids.is_empty() {
        return Ok(out);
    }
    let models = payments::Entity::find()
        .filter(payments::Column::CommitmentId.is_in(commitment_ids))
        .order_by_asc(payments::Column::Number)
        .all(db)
        .await?;
    for model in models {
        let payment = Payment::try_from(model)?;
        out.entry(payment.commitment_id).or_default().push(payment);
    }
    Ok(out)
}

/// Turn commitment rows into commitments with their payments attached.
pub(super) async fn with_payments(
    db: &DatabaseTransaction,
    models: Vec<commitments::Model>,
) -> ResultEngine<Vec<Commitment>> {
    let ids = models.iter().map(|m| m.id.clone()).collect();
    let mut payments = payments_by_commitment(db, ids).await?;
    models
        .into_iter()
        .map(|model| {
            let mut commitment = Commitment::try_from(model)?;
            commitment.payments = payments.remove(&commitment.id).unwrap_or_default();
            Ok(commitment)
        })
        .collect()
}

/// Turn expense rows into full trees (commitments and payments attached).
pub(super) async fn with_children(
    db: &DatabaseTransaction,
    models: Vec<expenses::Model>,
) -> ResultEngine<Vec<Expense>> {
    if models.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<String> = models.iter().map(|m| m.id.clone()).collect();
    let commitment_models = commitments::Entity::find()
        .filter(commitments::Column::ExpenseId.is_in(ids))
        .order_by_asc(commitments::Column::Number)
        .all(db)
        .await?;

    let mut by_expense: HashMap<Uuid, Vec<Commitment>> = HashMap::new();
    for commitment in with_payments(db, commitment_models).await? {
        by_expense
            .entry(commitment.expense_id)
            .or_default()
            .push(commitment);
    }

    models
        .into_iter()
        .map(|model| {
            let mut expense = Expense::try_from(model)?;
            expense.commitments = by_expense.remove(&expense.id).unwrap_or_default();
            Ok(expense)
        })
        .collect()
}

pub(super) async fn load_expense(db: &DatabaseTransaction, expense_id: Uuid) -> ResultEngine<Expense> {
    let model = expense_model(db, expense_id).await?;
    let mut trees = with_children(db, vec![model]).await?;
    trees
        .pop()
        .ok_or_else(|| EngineError::KeyNotFound(expense_id.to_string()))
}

/// Load the whole tree owning `commitment_id`.
pub(super) async fn load_expense_of_commitment(
    db: &DatabaseTransaction,
    commitment_id: Uuid,
) -> ResultEngine<Expense> {
    let model = commitment_model(db, commitment_id).await?;
    let expense_id = crate::util::parse_uuid(&model.expense_id, "expense")?;
    load_expense(db, expense_id).await
}

pub(super) fn commitment_index(expense: &Expense, commitment_id: Uuid) -> ResultEngine<usize> {
    expense
        .commitments
        .iter()
        .position(|c| c.id == commitment_id)
        .ok_or_else(|| EngineError::KeyNotFound(commitment_id.to_string()))
}

impl Engine {
    /// Recompute the cached status in memory. Returns `true` when it changed.
    pub(super) fn refresh_status(&self, expense: &mut Expense) -> ResultEngine<bool> {
        let derived = self.ledger.derive_status(expense)?;
        if derived == expense.status {
            return Ok(false);
        }
        debug!(
            protocol = %expense.protocol,
            from = %expense.status,
            to = %derived,
            "expense status recomputed"
        );
        expense.status = derived;
        Ok(true)
    }

    /// Recompute the status after a child mutation and persist it if it moved.
    pub(super) async fn store_status(
        &self,
        db: &DatabaseTransaction,
        expense: &mut Expense,
        recorded_at: DateTime<Utc>,
    ) -> ResultEngine<()> {
        if self.refresh_status(expense)? {
            expense.updated_at = recorded_at;
            expenses::ActiveModel::from(&*expense).update(db).await?;
        }
        Ok(())
    }

    /// Load full trees and refresh their status for reading.
    pub(super) async fn read_expenses(
        &self,
        db: &DatabaseTransaction,
        models: Vec<expenses::Model>,
    ) -> ResultEngine<Vec<Expense>> {
        let mut expenses = with_children(db, models).await?;
        for expense in &mut expenses {
            self.refresh_status(expense)?;
        }
        Ok(expenses)
    }
}
