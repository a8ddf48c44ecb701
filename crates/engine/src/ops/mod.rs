use std::future::Future;

use sea_orm::DatabaseConnection;
use tracing::warn;

use crate::{EngineError, Ledger, OrganizationCode, PaidTotalPolicy, ResultEngine};

mod commitments;
mod expenses;
mod numbering;
mod payments;
mod statistics;
mod tree;

pub use commitments::CommitmentFilter;
pub use expenses::ExpenseFilter;
pub use payments::PaymentFilter;
pub use statistics::{CommitmentStatistics, ExpenseStatistics, MonthlyTotal};

/// Run `$body` in a fresh transaction; commit on `Ok`, roll back on `Err`.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

/// Ledger settings applied by the engine.
#[derive(Clone, Debug)]
pub struct EngineOptions {
    /// Five digit code embedded in every protocol number.
    pub organization_code: OrganizationCode,
    pub paid_total_policy: PaidTotalPolicy,
    /// How many times a create operation is attempted when its generated
    /// number collides with a concurrent writer.
    pub max_number_attempts: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            organization_code: OrganizationCode::default(),
            paid_total_policy: PaidTotalPolicy::default(),
            max_number_attempts: 5,
        }
    }
}

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    options: EngineOptions,
    ledger: Ledger,
}

impl Engine {
    /// Start configuring a ledger engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn ledger(&self) -> Ledger {
        self.ledger
    }

    /// Run `op` again while it fails with a duplicate number, up to
    /// `max_number_attempts` times in total.
    async fn with_number_retry<T, F, Fut>(&self, operation: &str, mut op: F) -> ResultEngine<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ResultEngine<T>>,
    {
        let attempts = self.options.max_number_attempts;
        let mut attempt = 1;
        loop {
            match op().await {
                Err(err) if err.is_duplicate() && attempt < attempts => {
                    warn!(operation, attempt, attempts, error = %err, "number collision, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Collects the connection and ledger options before `build`.
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    options: EngineOptions,
}

impl EngineBuilder {
    /// Connection the ledger reads and writes through.
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    pub fn options(mut self, options: EngineOptions) -> EngineBuilder {
        self.options = options;
        self
    }

    /// Validate the options and return the engine.
    pub async fn build(self) -> ResultEngine<Engine> {
        if self.options.max_number_attempts == 0 {
            return Err(EngineError::InvalidInput(
                "max_number_attempts must be >= 1".to_string(),
            ));
        }
        Ok(Engine {
            ledger: Ledger::new(self.options.paid_total_policy),
            database: self.database,
            options: self.options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn engine(max_number_attempts: u32) -> Engine {
        Engine::builder()
            .options(EngineOptions {
                max_number_attempts,
                ..EngineOptions::default()
            })
            .build()
            .await
            .unwrap()
    }

    fn duplicate() -> EngineError {
        EngineError::ExistingKey("2025NE0001".to_string())
    }

    #[tokio::test]
    async fn duplicate_surfaces_once_attempts_run_out() {
        let engine = engine(3).await;
        let mut calls = 0;
        let result: ResultEngine<()> = engine
            .with_number_retry("create_commitment", || {
                calls += 1;
                async { Err(duplicate()) }
            })
            .await;

        assert!(matches!(result, Err(EngineError::ExistingKey(_))));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn duplicate_then_success_returns_the_later_value() {
        let engine = engine(5).await;
        let mut calls = 0;
        let result = engine
            .with_number_retry("create_payment", || {
                calls += 1;
                let attempt = calls;
                async move {
                    if attempt < 3 {
                        Err(duplicate())
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let engine = engine(5).await;
        let mut calls = 0;
        let result: ResultEngine<()> = engine
            .with_number_retry("create_expense", || {
                calls += 1;
                async { Err(EngineError::BusinessRule("over the ceiling".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(EngineError::BusinessRule(_))));
        assert_eq!(calls, 1);
    }
}
