//! The module contains `Expense` struct and its implementation.

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Commitment, EngineError, ExpenseKind, ExpenseStatus, MoneyCents, ResultEngine,
    util::{ensure_positive, normalize_key, normalize_optional_text, normalize_required_text},
};

/// An expense.
///
/// The top level obligation to pay a creditor. Its declared `amount` is the
/// ceiling for the sum of its commitments. Commitments are owned by value and
/// only point back through `expense_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    /// Filing protocol, assigned at creation and never changed.
    pub protocol: String,
    pub kind: ExpenseKind,
    pub filed_at: DateTime<Utc>,
    pub due_date: NaiveDate,
    pub creditor: String,
    pub description: Option<String>,
    pub amount: MoneyCents,
    /// Cached value, recomputed from the children on every load and mutation.
    pub status: ExpenseStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub commitments: Vec<Commitment>,
}

impl Expense {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        protocol: String,
        kind: ExpenseKind,
        due_date: NaiveDate,
        creditor: &str,
        description: Option<&str>,
        amount: MoneyCents,
        created_by: String,
        filed_at: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        ensure_positive(amount, "expense amount")?;
        Ok(Self {
            id: Uuid::new_v4(),
            protocol,
            kind,
            filed_at,
            due_date,
            creditor: normalize_required_text(creditor, "creditor")?,
            description: normalize_optional_text(description),
            amount,
            status: ExpenseStatus::AwaitingCommitment,
            created_by,
            created_at: filed_at,
            updated_at: filed_at,
            commitments: Vec::new(),
        })
    }

    /// Due before `today` and not yet paid.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.due_date < today && self.status != ExpenseStatus::Paid
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "expenses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub protocol: String,
    pub kind: String,
    pub filed_at: DateTimeUtc,
    pub due_date: Date,
    pub creditor: String,
    pub creditor_norm: String,
    pub description: Option<String>,
    pub amount_minor: i64,
    pub status: String,
    pub created_by: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::commitments::Entity")]
    Commitments,
}

impl Related<super::commitments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Commitments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Expense> for ActiveModel {
    fn from(value: &Expense) -> Self {
        Self {
            id: ActiveValue::Set(value.id.to_string()),
            protocol: ActiveValue::Set(value.protocol.clone()),
            kind: ActiveValue::Set(value.kind.code().to_string()),
            filed_at: ActiveValue::Set(value.filed_at),
            due_date: ActiveValue::Set(value.due_date),
            creditor: ActiveValue::Set(value.creditor.clone()),
            creditor_norm: ActiveValue::Set(normalize_key(&value.creditor)),
            description: ActiveValue::Set(value.description.clone()),
            amount_minor: ActiveValue::Set(value.amount.cents()),
            status: ActiveValue::Set(value.status.as_str().to_string()),
            created_by: ActiveValue::Set(value.created_by.clone()),
            created_at: ActiveValue::Set(value.created_at),
            updated_at: ActiveValue::Set(value.updated_at),
        }
    }
}

impl TryFrom<Model> for Expense {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::KeyNotFound("expense not exists".to_string()))?,
            protocol: model.protocol,
            kind: ExpenseKind::try_from(model.kind.as_str())?,
            filed_at: model.filed_at,
            due_date: model.due_date,
            creditor: model.creditor,
            description: model.description,
            amount: MoneyCents::new(model.amount_minor),
            status: ExpenseStatus::try_from(model.status.as_str())?,
            created_by: model.created_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
            commitments: Vec::new(),
        })
    }
}
