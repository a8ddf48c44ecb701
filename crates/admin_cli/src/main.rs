use std::{error::Error, path::PathBuf};

use chrono::{Datelike, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use engine::{
    CommitmentFilter, CreateCommitmentCmd, CreateExpenseCmd, CreatePaymentCmd, Engine,
    ExpenseFilter, ExpenseKind, ExpenseStatus, MoneyCents, PaymentFilter, PaymentStatus,
    UpdateCommitmentCmd, UpdateExpenseCmd, UpdatePaymentCmd, numbering,
};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod settings;

type CliResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

#[derive(Parser, Debug)]
#[command(name = "erario_admin")]
#[command(about = "Admin utilities for Erario (expenses, commitments, payments)")]
struct Cli {
    /// Settings file. A missing file is ignored.
    #[arg(long, default_value = "erario.toml")]
    config: PathBuf,

    /// Database connection string, overrides the settings file.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Identity recorded as the creator of new records.
    #[arg(long, env = "ERARIO_USER", default_value = "admin")]
    user: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Expense(Expense),
    Commitment(Commitment),
    Payment(Payment),
    /// Manage the schema instead of applying pending migrations implicitly.
    Migrate(MigrateArgs),
}

#[derive(Args, Debug)]
struct MigrateArgs {
    #[arg(value_enum, default_value_t = MigrateAction::Up)]
    action: MigrateAction,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum MigrateAction {
    /// Apply pending migrations.
    Up,
    /// Roll back every applied migration.
    Down,
    /// Drop all tables and migrate from scratch.
    Fresh,
    /// Print applied and pending migrations.
    Status,
}

// ── expense ─────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
struct Expense {
    #[command(subcommand)]
    command: ExpenseCommand,
}

#[derive(Subcommand, Debug)]
enum ExpenseCommand {
    Create(ExpenseCreateArgs),
    Show(ShowExpenseArgs),
    Update(ExpenseUpdateArgs),
    Delete(IdArgs),
    List(ExpenseListArgs),
    /// Unpaid expenses past due, or due within `--within` days.
    Overdue(OverdueArgs),
    Stats(TodayArgs),
    /// Validate a protocol number and tell whether it is filed.
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct ExpenseCreateArgs {
    /// OE, OR or OU.
    #[arg(long)]
    kind: ExpenseKind,
    #[arg(long)]
    creditor: String,
    /// Amount in reais, `1234.56` or `1234,56`.
    #[arg(long)]
    amount: MoneyCents,
    #[arg(long)]
    due_date: NaiveDate,
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug)]
struct ShowExpenseArgs {
    #[arg(required_unless_present = "protocol")]
    id: Option<Uuid>,
    #[arg(long, conflicts_with = "id")]
    protocol: Option<String>,
}

#[derive(Args, Debug)]
struct ExpenseUpdateArgs {
    id: Uuid,
    #[arg(long)]
    kind: Option<ExpenseKind>,
    #[arg(long)]
    creditor: Option<String>,
    #[arg(long)]
    amount: Option<MoneyCents>,
    #[arg(long)]
    due_date: Option<NaiveDate>,
    /// An empty string clears the description.
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug)]
struct ExpenseListArgs {
    #[arg(long)]
    protocol: Option<String>,
    #[arg(long)]
    kind: Option<ExpenseKind>,
    #[arg(long)]
    status: Option<ExpenseStatus>,
    #[arg(long)]
    creditor: Option<String>,
    #[arg(long)]
    due_from: Option<NaiveDate>,
    #[arg(long)]
    due_to: Option<NaiveDate>,
    #[arg(long)]
    min_amount: Option<MoneyCents>,
    #[arg(long)]
    max_amount: Option<MoneyCents>,
}

#[derive(Args, Debug)]
struct OverdueArgs {
    #[arg(long)]
    today: Option<NaiveDate>,
    #[arg(long)]
    within: Option<u32>,
}

#[derive(Args, Debug)]
struct TodayArgs {
    #[arg(long)]
    today: Option<NaiveDate>,
}

// ── commitment ──────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
struct Commitment {
    #[command(subcommand)]
    command: CommitmentCommand,
}

#[derive(Subcommand, Debug)]
enum CommitmentCommand {
    Create(CommitmentCreateArgs),
    Show(ShowNumberedArgs),
    Update(CommitmentUpdateArgs),
    Delete(IdArgs),
    List(CommitmentListArgs),
    /// Check how much can still be committed against an expense.
    Availability(AvailabilityArgs),
    NextNumber(NextNumberArgs),
    Check(CheckArgs),
    Stats,
    /// Committed totals per month of a year.
    Monthly(YearArgs),
}

#[derive(Args, Debug)]
struct CommitmentCreateArgs {
    #[arg(long)]
    expense_id: Uuid,
    #[arg(long)]
    amount: MoneyCents,
    #[arg(long)]
    date: NaiveDate,
    #[arg(long)]
    note: Option<String>,
}

#[derive(Args, Debug)]
struct CommitmentUpdateArgs {
    id: Uuid,
    #[arg(long)]
    amount: Option<MoneyCents>,
    #[arg(long)]
    date: Option<NaiveDate>,
    /// An empty string clears the note.
    #[arg(long)]
    note: Option<String>,
}

#[derive(Args, Debug)]
struct CommitmentListArgs {
    #[arg(long)]
    number: Option<String>,
    #[arg(long)]
    expense_id: Option<Uuid>,
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long)]
    to: Option<NaiveDate>,
    #[arg(long)]
    min_amount: Option<MoneyCents>,
    #[arg(long)]
    max_amount: Option<MoneyCents>,
    #[arg(long)]
    has_payments: Option<bool>,
}

// ── payment ─────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
struct Payment {
    #[command(subcommand)]
    command: PaymentCommand,
}

#[derive(Subcommand, Debug)]
enum PaymentCommand {
    Create(PaymentCreateArgs),
    Show(ShowNumberedArgs),
    Update(PaymentUpdateArgs),
    Delete(IdArgs),
    Cancel(SettleArgs),
    Reverse(SettleArgs),
    List(PaymentListArgs),
    /// Check how much can still be paid against a commitment.
    Availability(AvailabilityArgs),
    NextNumber(NextNumberArgs),
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct PaymentCreateArgs {
    #[arg(long)]
    commitment_id: Uuid,
    #[arg(long)]
    amount: MoneyCents,
    #[arg(long)]
    date: NaiveDate,
    #[arg(long)]
    note: Option<String>,
}

#[derive(Args, Debug)]
struct PaymentUpdateArgs {
    id: Uuid,
    #[arg(long)]
    amount: Option<MoneyCents>,
    #[arg(long)]
    date: Option<NaiveDate>,
    /// An empty string clears the note.
    #[arg(long)]
    note: Option<String>,
}

#[derive(Args, Debug)]
struct SettleArgs {
    id: Uuid,
    #[arg(long)]
    reason: String,
}

#[derive(Args, Debug)]
struct PaymentListArgs {
    #[arg(long)]
    number: Option<String>,
    #[arg(long)]
    commitment_id: Option<Uuid>,
    #[arg(long)]
    expense_id: Option<Uuid>,
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long)]
    to: Option<NaiveDate>,
    #[arg(long)]
    min_amount: Option<MoneyCents>,
    #[arg(long)]
    max_amount: Option<MoneyCents>,
    #[arg(long)]
    status: Option<PaymentStatus>,
}

// ── shared ──────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
struct IdArgs {
    id: Uuid,
}

#[derive(Args, Debug)]
struct ShowNumberedArgs {
    #[arg(required_unless_present = "number")]
    id: Option<Uuid>,
    #[arg(long, conflicts_with = "id")]
    number: Option<String>,
}

#[derive(Args, Debug)]
struct AvailabilityArgs {
    /// Expense id for commitments, commitment id for payments.
    id: Uuid,
    #[arg(long)]
    amount: MoneyCents,
}

#[derive(Args, Debug)]
struct NextNumberArgs {
    /// Defaults to the current year. Ignored with `--reserve`.
    #[arg(long)]
    year: Option<i32>,
    /// Consume the number instead of only showing it.
    #[arg(long)]
    reserve: bool,
}

#[derive(Args, Debug)]
struct CheckArgs {
    number: String,
}

#[derive(Args, Debug)]
struct YearArgs {
    #[arg(long)]
    year: Option<i32>,
}

#[derive(Serialize)]
struct NumberCheck<'a> {
    number: &'a str,
    valid: bool,
    exists: bool,
}

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn today_or(today: Option<NaiveDate>) -> NaiveDate {
    today.unwrap_or_else(|| Utc::now().date_naive())
}

async fn connect_db(database_url: &str) -> CliResult<DatabaseConnection> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

async fn open_engine(database_url: &str, settings: &settings::Settings) -> CliResult<Engine> {
    let db = connect_db(database_url).await?;
    tracing::debug!(%database_url, "database ready");
    let engine = Engine::builder()
        .database(db)
        .options(settings.ledger.engine_options()?)
        .build()
        .await?;
    Ok(engine)
}

async fn run_migrate(database_url: &str, action: MigrateAction) -> CliResult<()> {
    let db = Database::connect(database_url).await?;
    match action {
        MigrateAction::Up => migration::Migrator::up(&db, None).await?,
        MigrateAction::Down => migration::Migrator::down(&db, None).await?,
        MigrateAction::Fresh => migration::Migrator::fresh(&db).await?,
        MigrateAction::Status => migration::Migrator::status(&db).await?,
    }
    tracing::info!(%database_url, ?action, "migration finished");
    Ok(())
}

async fn run_expense(engine: &Engine, user: &str, command: ExpenseCommand) -> CliResult<()> {
    let now = Utc::now();
    match command {
        ExpenseCommand::Create(args) => {
            let mut cmd = CreateExpenseCmd::new(
                args.kind,
                args.creditor,
                args.amount,
                args.due_date,
                user,
                now,
            );
            if let Some(description) = args.description {
                cmd = cmd.description(description);
            }
            print_json(&engine.create_expense(cmd).await?)
        }
        ExpenseCommand::Show(args) => {
            let expense = match (args.id, args.protocol) {
                (Some(id), _) => engine.expense(id).await?,
                (None, Some(protocol)) => engine.expense_by_protocol(&protocol).await?,
                (None, None) => return Err("an id or --protocol is required".into()),
            };
            print_json(&expense)
        }
        ExpenseCommand::Update(args) => {
            let mut cmd = UpdateExpenseCmd::new(args.id, now);
            if let Some(kind) = args.kind {
                cmd = cmd.kind(kind);
            }
            if let Some(creditor) = args.creditor {
                cmd = cmd.creditor(creditor);
            }
            if let Some(amount) = args.amount {
                cmd = cmd.amount(amount);
            }
            if let Some(due_date) = args.due_date {
                cmd = cmd.due_date(due_date);
            }
            if let Some(description) = args.description {
                cmd = cmd.description(description);
            }
            print_json(&engine.update_expense(cmd).await?)
        }
        ExpenseCommand::Delete(args) => {
            engine.delete_expense(args.id).await?;
            println!("deleted expense: {}", args.id);
            Ok(())
        }
        ExpenseCommand::List(args) => {
            let filter = ExpenseFilter {
                protocol: args.protocol,
                kind: args.kind,
                status: args.status,
                creditor: args.creditor,
                due_from: args.due_from,
                due_to: args.due_to,
                min_amount: args.min_amount,
                max_amount: args.max_amount,
            };
            print_json(&engine.list_expenses(&filter).await?)
        }
        ExpenseCommand::Overdue(args) => {
            let today = today_or(args.today);
            let expenses = match args.within {
                Some(days) => engine.expenses_due_within(today, days).await?,
                None => engine.overdue_expenses(today).await?,
            };
            print_json(&expenses)
        }
        ExpenseCommand::Stats(args) => {
            print_json(&engine.expense_statistics(today_or(args.today)).await?)
        }
        ExpenseCommand::Check(args) => print_json(&NumberCheck {
            number: &args.number,
            valid: numbering::is_valid_protocol(&args.number),
            exists: engine.protocol_exists(&args.number).await?,
        }),
    }
}

async fn run_commitment(engine: &Engine, user: &str, command: CommitmentCommand) -> CliResult<()> {
    let now = Utc::now();
    match command {
        CommitmentCommand::Create(args) => {
            let mut cmd = CreateCommitmentCmd::new(args.expense_id, args.amount, args.date, user, now);
            if let Some(note) = args.note {
                cmd = cmd.note(note);
            }
            print_json(&engine.create_commitment(cmd).await?)
        }
        CommitmentCommand::Show(args) => {
            let commitment = match (args.id, args.number) {
                (Some(id), _) => engine.commitment(id).await?,
                (None, Some(number)) => engine.commitment_by_number(&number).await?,
                (None, None) => return Err("an id or --number is required".into()),
            };
            print_json(&commitment)
        }
        CommitmentCommand::Update(args) => {
            let mut cmd = UpdateCommitmentCmd::new(args.id, now);
            if let Some(amount) = args.amount {
                cmd = cmd.amount(amount);
            }
            if let Some(date) = args.date {
                cmd = cmd.committed_on(date);
            }
            if let Some(note) = args.note {
                cmd = cmd.note(note);
            }
            print_json(&engine.update_commitment(cmd).await?)
        }
        CommitmentCommand::Delete(args) => {
            engine.delete_commitment(args.id, now).await?;
            println!("deleted commitment: {}", args.id);
            Ok(())
        }
        CommitmentCommand::List(args) => {
            let filter = CommitmentFilter {
                number: args.number,
                expense_id: args.expense_id,
                from: args.from,
                to: args.to,
                min_amount: args.min_amount,
                max_amount: args.max_amount,
                has_payments: args.has_payments,
            };
            print_json(&engine.list_commitments(&filter).await?)
        }
        CommitmentCommand::Availability(args) => {
            print_json(&engine.commitment_availability(args.id, args.amount).await?)
        }
        CommitmentCommand::NextNumber(args) => {
            let number = if args.reserve {
                engine.next_commitment_number(now).await?
            } else {
                let year = args.year.unwrap_or_else(|| now.year());
                engine.peek_next_commitment_number(year).await?
            };
            println!("{number}");
            Ok(())
        }
        CommitmentCommand::Check(args) => print_json(&NumberCheck {
            number: &args.number,
            valid: numbering::is_valid_commitment_number(&args.number),
            exists: engine.commitment_number_exists(&args.number).await?,
        }),
        CommitmentCommand::Stats => print_json(&engine.commitment_statistics().await?),
        CommitmentCommand::Monthly(args) => {
            let year = args.year.unwrap_or_else(|| now.year());
            print_json(&engine.monthly_committed_totals(year).await?)
        }
    }
}

async fn run_payment(engine: &Engine, user: &str, command: PaymentCommand) -> CliResult<()> {
    let now = Utc::now();
    match command {
        PaymentCommand::Create(args) => {
            let mut cmd = CreatePaymentCmd::new(args.commitment_id, args.amount, args.date, user, now);
            if let Some(note) = args.note {
                cmd = cmd.note(note);
            }
            print_json(&engine.create_payment(cmd).await?)
        }
        PaymentCommand::Show(args) => {
            let payment = match (args.id, args.number) {
                (Some(id), _) => engine.payment(id).await?,
                (None, Some(number)) => engine.payment_by_number(&number).await?,
                (None, None) => return Err("an id or --number is required".into()),
            };
            print_json(&payment)
        }
        PaymentCommand::Update(args) => {
            let mut cmd = UpdatePaymentCmd::new(args.id, now);
            if let Some(amount) = args.amount {
                cmd = cmd.amount(amount);
            }
            if let Some(date) = args.date {
                cmd = cmd.paid_on(date);
            }
            if let Some(note) = args.note {
                cmd = cmd.note(note);
            }
            print_json(&engine.update_payment(cmd).await?)
        }
        PaymentCommand::Delete(args) => {
            engine.delete_payment(args.id, now).await?;
            println!("deleted payment: {}", args.id);
            Ok(())
        }
        PaymentCommand::Cancel(args) => {
            print_json(&engine.cancel_payment(args.id, &args.reason, now).await?)
        }
        PaymentCommand::Reverse(args) => {
            print_json(&engine.reverse_payment(args.id, &args.reason, now).await?)
        }
        PaymentCommand::List(args) => {
            let filter = PaymentFilter {
                number: args.number,
                commitment_id: args.commitment_id,
                expense_id: args.expense_id,
                from: args.from,
                to: args.to,
                min_amount: args.min_amount,
                max_amount: args.max_amount,
                status: args.status,
            };
            print_json(&engine.list_payments(&filter).await?)
        }
        PaymentCommand::Availability(args) => {
            print_json(&engine.payment_availability(args.id, args.amount).await?)
        }
        PaymentCommand::NextNumber(args) => {
            let number = if args.reserve {
                engine.next_payment_number(now).await?
            } else {
                let year = args.year.unwrap_or_else(|| now.year());
                engine.peek_next_payment_number(year).await?
            };
            println!("{number}");
            Ok(())
        }
        PaymentCommand::Check(args) => print_json(&NumberCheck {
            number: &args.number,
            valid: numbering::is_valid_payment_number(&args.number),
            exists: engine.payment_number_exists(&args.number).await?,
        }),
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let settings = settings::Settings::new(&cli.config)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "erario_admin={level},engine={level}",
            level = settings.app.level
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let database_url = cli
        .database_url
        .unwrap_or_else(|| settings.database_url());
    match cli.command {
        Command::Expense(Expense { command }) => {
            let engine = open_engine(&database_url, &settings).await?;
            run_expense(&engine, &cli.user, command).await
        }
        Command::Commitment(Commitment { command }) => {
            let engine = open_engine(&database_url, &settings).await?;
            run_commitment(&engine, &cli.user, command).await
        }
        Command::Payment(Payment { command }) => {
            let engine = open_engine(&database_url, &settings).await?;
            run_payment(&engine, &cli.user, command).await
        }
        Command::Migrate(args) => run_migrate(&database_url, args.action).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
