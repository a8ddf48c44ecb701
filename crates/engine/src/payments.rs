//! The module contains `Payment` struct and its implementation.

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, MoneyCents, PaymentStatus, ResultEngine,
    util::{ensure_positive, normalize_required_text, parse_uuid},
};

/// A payment (disbursement) against a commitment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    /// `YYYYNPssss`, unique.
    pub number: String,
    pub commitment_id: Uuid,
    pub paid_on: NaiveDate,
    pub amount: MoneyCents,
    pub note: Option<String>,
    pub status: PaymentStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        number: String,
        commitment_id: Uuid,
        paid_on: NaiveDate,
        amount: MoneyCents,
        note: Option<String>,
        created_by: String,
        recorded_at: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        ensure_positive(amount, "payment amount")?;
        Ok(Self {
            id: Uuid::new_v4(),
            number,
            commitment_id,
            paid_on,
            amount,
            note,
            status: PaymentStatus::Active,
            created_by,
            created_at: recorded_at,
            updated_at: recorded_at,
        })
    }

    /// Move to `Cancelled` and record the reason in the note.
    pub fn cancel(&mut self, reason: &str, recorded_at: DateTime<Utc>) -> ResultEngine<()> {
        let reason = normalize_required_text(reason, "cancellation reason")?;
        self.status = self.status.cancel()?;
        self.append_note("CANCELLED", &reason);
        self.updated_at = recorded_at;
        Ok(())
    }

    /// Move to `Reversed` and record the reason in the note.
    pub fn reverse(&mut self, reason: &str, recorded_at: DateTime<Utc>) -> ResultEngine<()> {
        let reason = normalize_required_text(reason, "reversal reason")?;
        self.status = self.status.reverse()?;
        self.append_note("REVERSED", &reason);
        self.updated_at = recorded_at;
        Ok(())
    }

    fn append_note(&mut self, label: &str, reason: &str) {
        self.note = Some(match self.note.take() {
            Some(note) => format!("{note} | {label}: {reason}"),
            None => format!("{label}: {reason}"),
        });
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub number: String,
    pub commitment_id: String,
    pub paid_on: Date,
    pub amount_minor: i64,
    pub note: Option<String>,
    pub status: String,
    pub created_by: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::commitments::Entity",
        from = "Column::CommitmentId",
        to = "super::commitments::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Commitments,
}

impl Related<super::commitments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Commitments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Payment> for ActiveModel {
    fn from(value: &Payment) -> Self {
        Self {
            id: ActiveValue::Set(value.id.to_string()),
            number: ActiveValue::Set(value.number.clone()),
            commitment_id: ActiveValue::Set(value.commitment_id.to_string()),
            paid_on: ActiveValue::Set(value.paid_on),
            amount_minor: ActiveValue::Set(value.amount.cents()),
            note: ActiveValue::Set(value.note.clone()),
            status: ActiveValue::Set(value.status.as_str().to_string()),
            created_by: ActiveValue::Set(value.created_by.clone()),
            created_at: ActiveValue::Set(value.created_at),
            updated_at: ActiveValue::Set(value.updated_at),
        }
    }
}

impl TryFrom<Model> for Payment {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::KeyNotFound("payment not exists".to_string()))?,
            number: model.number,
            commitment_id: parse_uuid(&model.commitment_id, "commitment")?,
            paid_on: model.paid_on,
            amount: MoneyCents::new(model.amount_minor),
            note: model.note,
            status: PaymentStatus::try_from(model.status.as_str())?,
            created_by: model.created_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
