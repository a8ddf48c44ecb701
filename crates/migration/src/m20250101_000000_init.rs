//! Initial schema migration.
//!
//! Creates the expenditure ledger tables:
//!
//! - `expenses`: filed obligations towards a creditor (protocol numbered)
//! - `commitments`: budget reservations against an expense (`YYYYNEssss`)
//! - `payments`: disbursements against a commitment (`YYYYNPssss`)
//! - `number_sequences`: last allocated sequence per (series, year)

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Expenses {
    Table,
    Id,
    Protocol,
    Kind,
    FiledAt,
    DueDate,
    Creditor,
    CreditorNorm,
    Description,
    AmountMinor,
    Status,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Commitments {
    Table,
    Id,
    Number,
    ExpenseId,
    CommittedOn,
    AmountMinor,
    Note,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Payments {
    Table,
    Id,
    Number,
    CommitmentId,
    PaidOn,
    AmountMinor,
    Note,
    Status,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum NumberSequences {
    Table,
    Series,
    Year,
    LastValue,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Expenses
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Expenses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Expenses::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Expenses::Protocol).string().not_null())
                    .col(ColumnDef::new(Expenses::Kind).string().not_null())
                    .col(ColumnDef::new(Expenses::FiledAt).timestamp().not_null())
                    .col(ColumnDef::new(Expenses::DueDate).date().not_null())
                    .col(ColumnDef::new(Expenses::Creditor).string().not_null())
                    .col(ColumnDef::new(Expenses::CreditorNorm).string().not_null())
                    .col(ColumnDef::new(Expenses::Description).string())
                    .col(
                        ColumnDef::new(Expenses::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Expenses::Status).string().not_null())
                    .col(ColumnDef::new(Expenses::CreatedBy).string().not_null())
                    .col(ColumnDef::new(Expenses::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Expenses::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-expenses-protocol-unique")
                    .table(Expenses::Table)
                    .col(Expenses::Protocol)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-expenses-due_date")
                    .table(Expenses::Table)
                    .col(Expenses::DueDate)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Commitments
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Commitments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Commitments::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Commitments::Number).string().not_null())
                    .col(ColumnDef::new(Commitments::ExpenseId).string().not_null())
                    .col(ColumnDef::new(Commitments::CommittedOn).date().not_null())
                    .col(
                        ColumnDef::new(Commitments::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Commitments::Note).string())
                    .col(ColumnDef::new(Commitments::CreatedBy).string().not_null())
                    .col(
                        ColumnDef::new(Commitments::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Commitments::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-commitments-expense_id")
                            .from(Commitments::Table, Commitments::ExpenseId)
                            .to(Expenses::Table, Expenses::Id)
                            .on_delete(ForeignKeyAction::NoAction),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-commitments-number-unique")
                    .table(Commitments::Table)
                    .col(Commitments::Number)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-commitments-expense_id")
                    .table(Commitments::Table)
                    .col(Commitments::ExpenseId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Payments
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Payments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Payments::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Payments::Number).string().not_null())
                    .col(ColumnDef::new(Payments::CommitmentId).string().not_null())
                    .col(ColumnDef::new(Payments::PaidOn).date().not_null())
                    .col(
                        ColumnDef::new(Payments::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Payments::Note).string())
                    .col(ColumnDef::new(Payments::Status).string().not_null())
                    .col(ColumnDef::new(Payments::CreatedBy).string().not_null())
                    .col(ColumnDef::new(Payments::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Payments::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-payments-commitment_id")
                            .from(Payments::Table, Payments::CommitmentId)
                            .to(Commitments::Table, Commitments::Id)
                            .on_delete(ForeignKeyAction::NoAction),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-payments-number-unique")
                    .table(Payments::Table)
                    .col(Payments::Number)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-payments-commitment_id")
                    .table(Payments::Table)
                    .col(Payments::CommitmentId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Number sequences
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(NumberSequences::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(NumberSequences::Series).string().not_null())
                    .col(ColumnDef::new(NumberSequences::Year).integer().not_null())
                    .col(
                        ColumnDef::new(NumberSequences::LastValue)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(NumberSequences::Series)
                            .col(NumberSequences::Year),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Children first
        manager
            .drop_table(Table::drop().table(NumberSequences::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Payments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Commitments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Expenses::Table).to_owned())
            .await?;
        Ok(())
    }
}
