//! Storage-backed number allocation.
//!
//! Candidate sequence = max(records already numbered for the series/year,
//! persisted counter) + 1. The candidate is checked against storage and bumped
//! until free, then written back to the counter in the caller's transaction.
//! Unique indexes catch the writers that still collide.

use chrono::{DateTime, Datelike, Utc};
use sea_orm::{
    ActiveValue, DatabaseTransaction, PaginatorTrait, QueryFilter, TransactionTrait, prelude::*,
};
use tracing::{debug, warn};

use crate::{
    EngineError, NumberSeries, ResultEngine, commitments, expenses, number_sequences,
    numbering::{format_protocol, format_sequence_number, sequence_prefix},
    payments,
    util::unique_violation,
};

use super::{Engine, with_tx};

fn overflow(series: NumberSeries) -> EngineError {
    EngineError::InvalidInput(format!("{} sequence exhausted", series.key()))
}

impl Engine {
    fn format_number(
        &self,
        series: NumberSeries,
        year: i32,
        sequence: u32,
    ) -> ResultEngine<String> {
        match series {
            NumberSeries::Protocol => {
                format_protocol(&self.options.organization_code, sequence, year)
            }
            NumberSeries::Commitment | NumberSeries::Payment => {
                format_sequence_number(series, year, sequence)
            }
        }
    }

    /// Records already numbered in the series for `year`.
    async fn count_numbered(
        &self,
        db: &DatabaseTransaction,
        series: NumberSeries,
        year: i32,
    ) -> ResultEngine<u64> {
        let count = match series {
            NumberSeries::Protocol => {
                let pattern = format!("{}.%/{year:04}-%", self.options.organization_code);
                expenses::Entity::find()
                    .filter(expenses::Column::Protocol.like(pattern))
                    .count(db)
                    .await?
            }
            NumberSeries::Commitment => {
                let prefix = sequence_prefix(series, year)?;
                commitments::Entity::find()
                    .filter(commitments::Column::Number.starts_with(prefix))
                    .count(db)
                    .await?
            }
            NumberSeries::Payment => {
                let prefix = sequence_prefix(series, year)?;
                payments::Entity::find()
                    .filter(payments::Column::Number.starts_with(prefix))
                    .count(db)
                    .await?
            }
        };
        Ok(count)
    }

    async fn number_taken(
        db: &DatabaseTransaction,
        series: NumberSeries,
        number: &str,
    ) -> ResultEngine<bool> {
        let count = match series {
            NumberSeries::Protocol => {
                expenses::Entity::find()
                    .filter(expenses::Column::Protocol.eq(number))
                    .count(db)
                    .await?
            }
            NumberSeries::Commitment => {
                commitments::Entity::find()
                    .filter(commitments::Column::Number.eq(number))
                    .count(db)
                    .await?
            }
            NumberSeries::Payment => {
                payments::Entity::find()
                    .filter(payments::Column::Number.eq(number))
                    .count(db)
                    .await?
            }
        };
        Ok(count > 0)
    }

    async fn counter(
        db: &DatabaseTransaction,
        series: NumberSeries,
        year: i32,
    ) -> ResultEngine<Option<number_sequences::Model>> {
        Ok(
            number_sequences::Entity::find_by_id((series.key().to_string(), year))
                .one(db)
                .await?,
        )
    }

    /// First free `(sequence, number)` for the series/year. Nothing is written.
    async fn next_free(
        &self,
        db: &DatabaseTransaction,
        series: NumberSeries,
        year: i32,
    ) -> ResultEngine<(u32, String)> {
        let counted = self.count_numbered(db, series, year).await?;
        let persisted = Self::counter(db, series, year)
            .await?
            .map_or(0, |row| u64::try_from(row.last_value).unwrap_or(0));

        let candidate = counted.max(persisted) + 1;
        let mut sequence = u32::try_from(candidate).map_err(|_| overflow(series))?;
        loop {
            let number = self.format_number(series, year, sequence)?;
            if !Self::number_taken(db, series, &number).await? {
                return Ok((sequence, number));
            }
            warn!(series = series.key(), %number, "number already taken, trying the next one");
            sequence = sequence.checked_add(1).ok_or_else(|| overflow(series))?;
        }
    }

    /// Allocate the next number and advance the persisted counter.
    pub(super) async fn allocate_number(
        &self,
        db: &DatabaseTransaction,
        series: NumberSeries,
        year: i32,
    ) -> ResultEngine<String> {
        let (sequence, number) = self.next_free(db, series, year).await?;
        let key = format!("{}/{year}", series.key());
        match Self::counter(db, series, year).await? {
            Some(row) => {
                let mut active: number_sequences::ActiveModel = row.into();
                active.last_value = ActiveValue::Set(i64::from(sequence));
                active.update(db).await?;
            }
            None => {
                number_sequences::ActiveModel {
                    series: ActiveValue::Set(series.key().to_string()),
                    year: ActiveValue::Set(year),
                    last_value: ActiveValue::Set(i64::from(sequence)),
                }
                .insert(db)
                .await
                .map_err(|err| unique_violation(err, &key))?;
            }
        }
        debug!(series = series.key(), year, sequence, %number, "number allocated");
        Ok(number)
    }

    async fn peek_next(&self, series: NumberSeries, year: i32) -> ResultEngine<String> {
        with_tx!(self, |db_tx| {
            let (_, number) = self.next_free(&db_tx, series, year).await?;
            Ok(number)
        })
    }

    async fn reserve_next(
        &self,
        series: NumberSeries,
        recorded_at: DateTime<Utc>,
    ) -> ResultEngine<String> {
        let year = recorded_at.year();
        self.with_number_retry("reserve_number", || self.reserve_once(series, year))
            .await
    }

    async fn reserve_once(&self, series: NumberSeries, year: i32) -> ResultEngine<String> {
        with_tx!(self, |db_tx| {
            self.allocate_number(&db_tx, series, year).await
        })
    }

    /// Preview the next protocol number for `year` without reserving it.
    pub async fn peek_next_protocol_number(&self, year: i32) -> ResultEngine<String> {
        self.peek_next(NumberSeries::Protocol, year).await
    }

    /// Preview the next commitment number for `year` without reserving it.
    pub async fn peek_next_commitment_number(&self, year: i32) -> ResultEngine<String> {
        self.peek_next(NumberSeries::Commitment, year).await
    }

    /// Preview the next payment number for `year` without reserving it.
    pub async fn peek_next_payment_number(&self, year: i32) -> ResultEngine<String> {
        self.peek_next(NumberSeries::Payment, year).await
    }

    /// Reserve the next protocol number of the `recorded_at` year.
    ///
    /// The counter advances, so the number will not be handed out again.
    pub async fn next_protocol_number(&self, recorded_at: DateTime<Utc>) -> ResultEngine<String> {
        self.reserve_next(NumberSeries::Protocol, recorded_at).await
    }

    /// Reserve the next commitment number of the `recorded_at` year.
    pub async fn next_commitment_number(
        &self,
        recorded_at: DateTime<Utc>,
    ) -> ResultEngine<String> {
        self.reserve_next(NumberSeries::Commitment, recorded_at).await
    }

    /// Reserve the next payment number of the `recorded_at` year.
    pub async fn next_payment_number(&self, recorded_at: DateTime<Utc>) -> ResultEngine<String> {
        self.reserve_next(NumberSeries::Payment, recorded_at).await
    }

    pub async fn protocol_exists(&self, protocol: &str) -> ResultEngine<bool> {
        with_tx!(self, |db_tx| {
            Self::number_taken(&db_tx, NumberSeries::Protocol, protocol.trim()).await
        })
    }

    pub async fn commitment_number_exists(&self, number: &str) -> ResultEngine<bool> {
        with_tx!(self, |db_tx| {
            Self::number_taken(&db_tx, NumberSeries::Commitment, number.trim()).await
        })
    }

    pub async fn payment_number_exists(&self, number: &str) -> ResultEngine<bool> {
        with_tx!(self, |db_tx| {
            Self::number_taken(&db_tx, NumberSeries::Payment, number.trim()).await
        })
    }
}
