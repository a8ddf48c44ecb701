//! The module contains `Commitment` struct and its implementation.

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, MoneyCents, Payment, ResultEngine,
    util::{ensure_positive, parse_uuid},
};

/// A commitment (budget reservation) against an expense.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub id: Uuid,
    /// `YYYYNEssss`, unique.
    pub number: String,
    pub expense_id: Uuid,
    pub committed_on: NaiveDate,
    pub amount: MoneyCents,
    pub note: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payments: Vec<Payment>,
}

impl Commitment {
    pub fn new(
        number: String,
        expense_id: Uuid,
        committed_on: NaiveDate,
        amount: MoneyCents,
        note: Option<String>,
        created_by: String,
        recorded_at: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        ensure_positive(amount, "commitment amount")?;
        Ok(Self {
            id: Uuid::new_v4(),
            number,
            expense_id,
            committed_on,
            amount,
            note,
            created_by,
            created_at: recorded_at,
            updated_at: recorded_at,
            payments: Vec::new(),
        })
    }

    pub fn has_payments(&self) -> bool {
        !self.payments.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "commitments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub number: String,
    pub expense_id: String,
    pub committed_on: Date,
    pub amount_minor: i64,
    pub note: Option<String>,
    pub created_by: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::payments::Entity")]
    Payments,
    #[sea_orm(
        belongs_to = "super::expenses::Entity",
        from = "Column::ExpenseId",
        to = "super::expenses::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Expenses,
}

impl Related<super::payments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl Related<super::expenses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Expenses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Commitment> for ActiveModel {
    fn from(value: &Commitment) -> Self {
        Self {
            id: ActiveValue::Set(value.id.to_string()),
            number: ActiveValue::Set(value.number.clone()),
            expense_id: ActiveValue::Set(value.expense_id.to_string()),
            committed_on: ActiveValue::Set(value.committed_on),
            amount_minor: ActiveValue::Set(value.amount.cents()),
            note: ActiveValue::Set(value.note.clone()),
            created_by: ActiveValue::Set(value.created_by.clone()),
            created_at: ActiveValue::Set(value.created_at),
            updated_at: ActiveValue::Set(value.updated_at),
        }
    }
}

impl TryFrom<Model> for Commitment {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::KeyNotFound("commitment not exists".to_string()))?,
            number: model.number,
            expense_id: parse_uuid(&model.expense_id, "expense")?,
            committed_on: model.committed_on,
            amount: MoneyCents::new(model.amount_minor),
            note: model.note,
            created_by: model.created_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
            payments: Vec::new(),
        })
    }
}
