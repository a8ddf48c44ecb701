use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection};

use engine::{
    CommitmentFilter, CreateCommitmentCmd, CreateExpenseCmd, CreatePaymentCmd, Engine,
    EngineError, EngineOptions, Expense, ExpenseFilter, ExpenseKind, ExpenseStatus, MoneyCents,
    PaidTotalPolicy, PaymentFilter, PaymentStatus, UpdateCommitmentCmd, UpdateExpenseCmd,
    UpdatePaymentCmd,
};
use migration::MigratorTrait;

async fn engine_on(db: &DatabaseConnection, options: EngineOptions) -> Engine {
    Engine::builder()
        .database(db.clone())
        .options(options)
        .build()
        .await
        .unwrap()
}

async fn engine_with_policy(policy: PaidTotalPolicy) -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = engine_on(
        &db,
        EngineOptions {
            paid_total_policy: policy,
            ..EngineOptions::default()
        },
    )
    .await;
    (engine, db)
}

async fn engine_with_db() -> (Engine, DatabaseConnection) {
    engine_with_policy(PaidTotalPolicy::ActiveOnly).await
}

fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn reais(value: i64) -> MoneyCents {
    MoneyCents::new(value * 100)
}

async fn new_expense(engine: &Engine, creditor: &str, amount: MoneyCents) -> Expense {
    engine
        .create_expense(
            CreateExpenseCmd::new(
                ExpenseKind::BuildingWorks,
                creditor,
                amount,
                day(2025, 6, 30),
                "alice",
                at(),
            )
            .description("School roof"),
        )
        .await
        .unwrap()
}

async fn commit(engine: &Engine, expense: &Expense, amount: MoneyCents) -> engine::Commitment {
    engine
        .create_commitment(CreateCommitmentCmd::new(
            expense.id,
            amount,
            day(2025, 3, 11),
            "alice",
            at(),
        ))
        .await
        .unwrap()
}

async fn pay(engine: &Engine, commitment: &engine::Commitment, amount: MoneyCents) -> engine::Payment {
    engine
        .create_payment(CreatePaymentCmd::new(
            commitment.id,
            amount,
            day(2025, 3, 12),
            "alice",
            at(),
        ))
        .await
        .unwrap()
}

fn is_business_rule<T>(result: Result<T, EngineError>) -> bool {
    matches!(result, Err(EngineError::BusinessRule(_)))
}

#[tokio::test]
async fn create_expense_assigns_protocol_and_initial_status() {
    let (engine, _db) = engine_with_db().await;

    let expense = new_expense(&engine, "Acme Ltda", reais(1000)).await;
    assert_eq!(expense.protocol, "43022.000001/2025-07");
    assert_eq!(expense.status, ExpenseStatus::AwaitingCommitment);
    assert_eq!(expense.description.as_deref(), Some("School roof"));

    let second = new_expense(&engine, "Acme Ltda", reais(10)).await;
    assert_eq!(second.protocol, "43022.000002/2025-01");

    let found = engine.expense_by_protocol(&expense.protocol).await.unwrap();
    assert_eq!(found.id, expense.id);
    assert!(engine.protocol_exists(&expense.protocol).await.unwrap());
}

#[tokio::test]
async fn create_expense_rejects_bad_input() {
    let (engine, _db) = engine_with_db().await;

    let err = engine
        .create_expense(CreateExpenseCmd::new(
            ExpenseKind::Other,
            "   ",
            reais(10),
            day(2025, 6, 30),
            "alice",
            at(),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let err = engine
        .create_expense(CreateExpenseCmd::new(
            ExpenseKind::Other,
            "Acme",
            MoneyCents::ZERO,
            day(2025, 6, 30),
            "alice",
            at(),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)));
}

#[tokio::test]
async fn full_commitment_then_full_payment_freezes_expense() {
    let (engine, _db) = engine_with_db().await;
    let expense = new_expense(&engine, "Acme", reais(1000)).await;

    let commitment = commit(&engine, &expense, reais(1000)).await;
    let status = engine.expense(expense.id).await.unwrap().status;
    assert_eq!(status, ExpenseStatus::AwaitingPayment);

    pay(&engine, &commitment, reais(1000)).await;
    let paid = engine.expense(expense.id).await.unwrap();
    assert_eq!(paid.status, ExpenseStatus::Paid);

    let more = engine
        .create_commitment(CreateCommitmentCmd::new(
            expense.id,
            reais(1),
            day(2025, 3, 13),
            "alice",
            at(),
        ))
        .await;
    assert!(is_business_rule(more));

    let edit = engine
        .update_expense(UpdateExpenseCmd::new(expense.id, at()).creditor("Other"))
        .await;
    assert!(is_business_rule(edit));

    assert!(is_business_rule(engine.delete_expense(expense.id).await));
}

#[tokio::test]
async fn second_commitment_over_the_ceiling_is_rejected() {
    let (engine, _db) = engine_with_db().await;
    let expense = new_expense(&engine, "Acme", reais(500)).await;

    commit(&engine, &expense, reais(300)).await;
    let status = engine.expense(expense.id).await.unwrap().status;
    assert_eq!(status, ExpenseStatus::PartiallyCommitted);

    let err = engine
        .create_commitment(CreateCommitmentCmd::new(
            expense.id,
            reais(300),
            day(2025, 3, 11),
            "alice",
            at(),
        ))
        .await
        .unwrap_err();
    match err {
        EngineError::BusinessRule(message) => {
            assert!(message.contains("available: R$ 200.00"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let reloaded = engine.expense(expense.id).await.unwrap();
    assert_eq!(reloaded.commitments.len(), 1);
}

#[tokio::test]
async fn commitment_cannot_drop_below_its_payments() {
    let (engine, _db) = engine_with_db().await;
    let expense = new_expense(&engine, "Acme", reais(1000)).await;
    let commitment = commit(&engine, &expense, reais(200)).await;
    pay(&engine, &commitment, reais(150)).await;

    let result = engine
        .update_commitment(UpdateCommitmentCmd::new(commitment.id, at()).amount(reais(100)))
        .await;
    assert!(is_business_rule(result));

    let stored = engine.commitment(commitment.id).await.unwrap();
    assert_eq!(stored.amount, reais(200));
}

#[tokio::test]
async fn commitment_with_payments_cannot_be_changed_or_deleted() {
    let (engine, _db) = engine_with_db().await;
    let expense = new_expense(&engine, "Acme", reais(1000)).await;
    let commitment = commit(&engine, &expense, reais(400)).await;
    pay(&engine, &commitment, reais(100)).await;

    let note = engine
        .update_commitment(UpdateCommitmentCmd::new(commitment.id, at()).note("late"))
        .await;
    assert!(is_business_rule(note));
    assert!(is_business_rule(
        engine.delete_commitment(commitment.id, at()).await
    ));
    assert_eq!(
        engine
            .commitments_for_expense(expense.id)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn deleting_a_commitment_recomputes_status() {
    let (engine, _db) = engine_with_db().await;
    let expense = new_expense(&engine, "Acme", reais(1000)).await;
    let commitment = commit(&engine, &expense, reais(1000)).await;
    assert_eq!(
        engine.expense(expense.id).await.unwrap().status,
        ExpenseStatus::AwaitingPayment
    );

    engine.delete_commitment(commitment.id, at()).await.unwrap();

    let reloaded = engine.expense(expense.id).await.unwrap();
    assert!(reloaded.commitments.is_empty());
    assert_eq!(reloaded.status, ExpenseStatus::AwaitingCommitment);
    assert!(matches!(
        engine.commitment(commitment.id).await,
        Err(EngineError::KeyNotFound(_))
    ));
}

#[tokio::test]
async fn update_commitment_without_payments() {
    let (engine, _db) = engine_with_db().await;
    let expense = new_expense(&engine, "Acme", reais(1000)).await;
    let commitment = commit(&engine, &expense, reais(400)).await;

    let updated = engine
        .update_commitment(
            UpdateCommitmentCmd::new(commitment.id, at())
                .amount(reais(1000))
                .note("  full amount  "),
        )
        .await
        .unwrap();
    assert_eq!(updated.amount, reais(1000));
    assert_eq!(updated.note.as_deref(), Some("full amount"));
    assert_eq!(
        engine.expense(expense.id).await.unwrap().status,
        ExpenseStatus::AwaitingPayment
    );

    let over = engine
        .update_commitment(UpdateCommitmentCmd::new(commitment.id, at()).amount(reais(1001)))
        .await;
    assert!(is_business_rule(over));
}

#[tokio::test]
async fn commitment_numbers_are_sequential_within_a_year() {
    let (engine, _db) = engine_with_db().await;
    let expense = new_expense(&engine, "Acme", reais(1000)).await;

    let first = commit(&engine, &expense, reais(100)).await;
    let second = commit(&engine, &expense, reais(100)).await;
    assert_eq!(first.number, "2025NE0001");
    assert_eq!(second.number, "2025NE0002");

    let payment = pay(&engine, &first, reais(50)).await;
    assert_eq!(payment.number, "2025NP0001");

    assert!(engine.commitment_number_exists("2025NE0002").await.unwrap());
    assert!(!engine.commitment_number_exists("2025NE0003").await.unwrap());
    assert!(engine.payment_number_exists("2025NP0001").await.unwrap());
}

#[tokio::test]
async fn peek_does_not_reserve_but_next_does() {
    let (engine, _db) = engine_with_db().await;
    let expense = new_expense(&engine, "Acme", reais(1000)).await;

    assert_eq!(
        engine.peek_next_commitment_number(2025).await.unwrap(),
        "2025NE0001"
    );
    assert_eq!(
        engine.peek_next_commitment_number(2025).await.unwrap(),
        "2025NE0001"
    );

    let reserved = engine.next_commitment_number(at()).await.unwrap();
    assert_eq!(reserved, "2025NE0001");

    let commitment = commit(&engine, &expense, reais(100)).await;
    assert_eq!(commitment.number, "2025NE0002");
    assert_eq!(
        engine.peek_next_payment_number(2026).await.unwrap(),
        "2026NP0001"
    );
    assert_eq!(
        engine.peek_next_protocol_number(2025).await.unwrap(),
        "43022.000002/2025-01"
    );
}

#[tokio::test]
async fn generator_skips_numbers_already_in_storage() {
    let (engine, db) = engine_with_db().await;
    let expense = new_expense(&engine, "Acme", reais(1000)).await;
    commit(&engine, &expense, reais(100)).await;

    db.execute_unprepared(
        "UPDATE commitments SET number = '2025NE0002' WHERE number = '2025NE0001'",
    )
    .await
    .unwrap();

    assert_eq!(
        engine.peek_next_commitment_number(2025).await.unwrap(),
        "2025NE0003"
    );
    let next = commit(&engine, &expense, reais(100)).await;
    assert_eq!(next.number, "2025NE0003");
}

#[tokio::test]
async fn persistent_collision_surfaces_as_duplicate_and_rolls_back() {
    let (_, db) = engine_with_db().await;
    let engine = engine_on(
        &db,
        EngineOptions {
            max_number_attempts: 3,
            ..EngineOptions::default()
        },
    )
    .await;
    let expense = new_expense(&engine, "Acme", reais(1000)).await;
    commit(&engine, &expense, reais(100)).await;

    // Every further commitment on this expense now hits a unique index.
    db.execute_unprepared(
        "CREATE UNIQUE INDEX idx_one_commitment_per_expense ON commitments (expense_id)",
    )
    .await
    .unwrap();

    let second = engine
        .create_commitment(CreateCommitmentCmd::new(
            expense.id,
            reais(100),
            day(2025, 3, 11),
            "alice",
            at(),
        ))
        .await;
    match second {
        Err(err) => {
            assert!(err.is_duplicate());
            assert!(matches!(err, EngineError::ExistingKey(ref key) if key == "2025NE0002"));
        }
        Ok(commitment) => panic!("unexpected commitment {}", commitment.number),
    }

    assert_eq!(engine.expense(expense.id).await.unwrap().commitments.len(), 1);
    assert_eq!(
        engine.peek_next_commitment_number(2025).await.unwrap(),
        "2025NE0002"
    );
}

#[tokio::test]
async fn status_queries_follow_the_current_policy() {
    let (recorded, db) = engine_with_policy(PaidTotalPolicy::AllRecorded).await;
    let expense = new_expense(&recorded, "Acme", reais(1000)).await;
    let commitment = commit(&recorded, &expense, reais(1000)).await;
    let payment = pay(&recorded, &commitment, reais(1000)).await;
    recorded
        .reverse_payment(payment.id, "bank returned the transfer", at())
        .await
        .unwrap();
    assert_eq!(
        recorded.expense(expense.id).await.unwrap().status,
        ExpenseStatus::Paid
    );

    let active = engine_on(&db, EngineOptions::default()).await;
    let by_status = |status| ExpenseFilter {
        status: Some(status),
        ..ExpenseFilter::default()
    };

    assert!(
        active
            .list_expenses(&by_status(ExpenseStatus::Paid))
            .await
            .unwrap()
            .is_empty()
    );
    let awaiting = active
        .list_expenses(&by_status(ExpenseStatus::AwaitingPayment))
        .await
        .unwrap();
    assert_eq!(awaiting.len(), 1);
    assert_eq!(awaiting[0].status, ExpenseStatus::AwaitingPayment);

    let overdue = active.overdue_expenses(day(2025, 7, 1)).await.unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].id, expense.id);
    assert_eq!(
        active
            .expenses_due_within(day(2025, 6, 25), 5)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn reversed_payment_is_ignored_under_active_only() {
    let (engine, _db) = engine_with_policy(PaidTotalPolicy::ActiveOnly).await;
    let expense = new_expense(&engine, "Acme", reais(1000)).await;
    let commitment = commit(&engine, &expense, reais(1000)).await;
    let payment = pay(&engine, &commitment, reais(1000)).await;
    assert_eq!(
        engine.expense(expense.id).await.unwrap().status,
        ExpenseStatus::Paid
    );

    let reversed = engine
        .reverse_payment(payment.id, "bank returned the transfer", at())
        .await
        .unwrap();
    assert_eq!(reversed.status, PaymentStatus::Reversed);
    assert_eq!(
        reversed.note.as_deref(),
        Some("REVERSED: bank returned the transfer")
    );
    assert_eq!(
        engine.expense(expense.id).await.unwrap().status,
        ExpenseStatus::AwaitingPayment
    );

    pay(&engine, &commitment, reais(1000)).await;
    assert_eq!(
        engine.expense(expense.id).await.unwrap().status,
        ExpenseStatus::Paid
    );
}

#[tokio::test]
async fn reversed_payment_still_counts_under_all_recorded() {
    let (engine, _db) = engine_with_policy(PaidTotalPolicy::AllRecorded).await;
    let expense = new_expense(&engine, "Acme", reais(1000)).await;
    let commitment = commit(&engine, &expense, reais(1000)).await;
    let payment = pay(&engine, &commitment, reais(1000)).await;

    engine
        .reverse_payment(payment.id, "bank returned the transfer", at())
        .await
        .unwrap();
    assert_eq!(
        engine.expense(expense.id).await.unwrap().status,
        ExpenseStatus::Paid
    );

    let again = engine
        .create_payment(CreatePaymentCmd::new(
            commitment.id,
            reais(1),
            day(2025, 3, 12),
            "alice",
            at(),
        ))
        .await;
    assert!(is_business_rule(again));
}

#[tokio::test]
async fn settled_payments_are_terminal() {
    let (engine, _db) = engine_with_db().await;
    let expense = new_expense(&engine, "Acme", reais(1000)).await;
    let commitment = commit(&engine, &expense, reais(1000)).await;
    let payment = engine
        .create_payment(
            CreatePaymentCmd::new(commitment.id, reais(300), day(2025, 3, 12), "alice", at())
                .note("first installment"),
        )
        .await
        .unwrap();

    let cancelled = engine
        .cancel_payment(payment.id, "duplicate order", at())
        .await
        .unwrap();
    assert_eq!(cancelled.status, PaymentStatus::Cancelled);
    assert_eq!(
        cancelled.note.as_deref(),
        Some("first installment | CANCELLED: duplicate order")
    );

    assert!(is_business_rule(
        engine.cancel_payment(payment.id, "again", at()).await
    ));
    assert!(is_business_rule(
        engine.reverse_payment(payment.id, "again", at()).await
    ));
    assert!(is_business_rule(
        engine
            .update_payment(UpdatePaymentCmd::new(payment.id, at()).amount(reais(10)))
            .await
    ));
    assert!(is_business_rule(engine.delete_payment(payment.id, at()).await));

    let stored = engine.payment(payment.id).await.unwrap();
    assert_eq!(stored.status, PaymentStatus::Cancelled);
}

#[tokio::test]
async fn cancel_requires_a_reason() {
    let (engine, _db) = engine_with_db().await;
    let expense = new_expense(&engine, "Acme", reais(1000)).await;
    let commitment = commit(&engine, &expense, reais(1000)).await;
    let payment = pay(&engine, &commitment, reais(100)).await;

    let err = engine.cancel_payment(payment.id, "  ", at()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
    assert_eq!(
        engine.payment(payment.id).await.unwrap().status,
        PaymentStatus::Active
    );
}

#[tokio::test]
async fn update_and_delete_active_payment() {
    let (engine, _db) = engine_with_db().await;
    let expense = new_expense(&engine, "Acme", reais(1000)).await;
    let commitment = commit(&engine, &expense, reais(1000)).await;
    let payment = pay(&engine, &commitment, reais(400)).await;

    let over = engine
        .update_payment(UpdatePaymentCmd::new(payment.id, at()).amount(reais(1001)))
        .await;
    assert!(is_business_rule(over));

    let updated = engine
        .update_payment(UpdatePaymentCmd::new(payment.id, at()).amount(reais(1000)))
        .await
        .unwrap();
    assert_eq!(updated.amount, reais(1000));
    assert_eq!(
        engine.expense(expense.id).await.unwrap().status,
        ExpenseStatus::Paid
    );

    engine.delete_payment(payment.id, at()).await.unwrap();
    assert_eq!(
        engine.expense(expense.id).await.unwrap().status,
        ExpenseStatus::AwaitingPayment
    );
    assert!(matches!(
        engine.payment(payment.id).await,
        Err(EngineError::KeyNotFound(_))
    ));
}

#[tokio::test]
async fn expense_amount_cannot_drop_below_committed() {
    let (engine, _db) = engine_with_db().await;
    let expense = new_expense(&engine, "Acme", reais(1000)).await;
    commit(&engine, &expense, reais(600)).await;

    let lower = engine
        .update_expense(UpdateExpenseCmd::new(expense.id, at()).amount(reais(500)))
        .await;
    assert!(is_business_rule(lower));

    let exact = engine
        .update_expense(UpdateExpenseCmd::new(expense.id, at()).amount(reais(600)))
        .await
        .unwrap();
    assert_eq!(exact.status, ExpenseStatus::AwaitingPayment);
}

#[tokio::test]
async fn expense_with_commitments_cannot_be_deleted() {
    let (engine, _db) = engine_with_db().await;
    let busy = new_expense(&engine, "Acme", reais(1000)).await;
    commit(&engine, &busy, reais(100)).await;
    assert!(is_business_rule(engine.delete_expense(busy.id).await));

    let idle = new_expense(&engine, "Acme", reais(1000)).await;
    engine.delete_expense(idle.id).await.unwrap();
    assert!(matches!(
        engine.expense(idle.id).await,
        Err(EngineError::KeyNotFound(_))
    ));
}

#[tokio::test]
async fn lookups_by_number_and_protocol() {
    let (engine, _db) = engine_with_db().await;
    let expense = new_expense(&engine, "Acme", reais(1000)).await;
    let first = commit(&engine, &expense, reais(500)).await;
    let second = commit(&engine, &expense, reais(500)).await;
    pay(&engine, &first, reais(100)).await;
    pay(&engine, &second, reais(200)).await;

    let by_number = engine.commitment_by_number("2025NE0001").await.unwrap();
    assert_eq!(by_number.id, first.id);
    assert_eq!(by_number.payments.len(), 1);

    let tree = engine.expense(expense.id).await.unwrap();
    let second_in_tree = tree.commitments.iter().find(|c| c.id == second.id).unwrap();
    assert_eq!(second_in_tree.payments.len(), 1);
    assert_eq!(second_in_tree.payments[0].amount, reais(200));

    let commitments = engine
        .commitments_for_protocol(&expense.protocol)
        .await
        .unwrap();
    assert_eq!(commitments.len(), 2);

    let payments = engine.payments_for_expense(expense.id).await.unwrap();
    let numbers: Vec<_> = payments.iter().map(|p| p.number.as_str()).collect();
    assert_eq!(numbers, ["2025NP0001", "2025NP0002"]);
    assert_eq!(
        engine
            .payments_for_protocol(&expense.protocol)
            .await
            .unwrap()
            .len(),
        2
    );
    assert_eq!(
        engine
            .payments_for_commitment_number("2025NE0002")
            .await
            .unwrap()[0]
            .amount,
        reais(200)
    );
    assert_eq!(
        engine.payments_for_commitment(first.id).await.unwrap().len(),
        1
    );
    assert_eq!(
        engine.payment_by_number("2025NP0002").await.unwrap().amount,
        reais(200)
    );

    assert!(matches!(
        engine.commitment_by_number("2025NE0009").await,
        Err(EngineError::KeyNotFound(_))
    ));
}

#[tokio::test]
async fn filters_narrow_listings() {
    let (engine, _db) = engine_with_db().await;
    let joao = new_expense(&engine, "Construtora São João", reais(1000)).await;
    let acme = new_expense(&engine, "Acme Ltda", reais(50)).await;
    let with_payment = commit(&engine, &joao, reais(300)).await;
    commit(&engine, &joao, reais(200)).await;
    let payment = pay(&engine, &with_payment, reais(100)).await;
    pay(&engine, &with_payment, reais(50)).await;
    engine
        .cancel_payment(payment.id, "wrong invoice", at())
        .await
        .unwrap();

    let by_creditor = engine
        .list_expenses(&ExpenseFilter {
            creditor: Some("sao JOAO".to_string()),
            ..ExpenseFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(by_creditor.len(), 1);
    assert_eq!(by_creditor[0].id, joao.id);

    let small = engine
        .list_expenses(&ExpenseFilter {
            max_amount: Some(reais(100)),
            ..ExpenseFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(small.len(), 1);
    assert_eq!(small[0].id, acme.id);

    let partially = engine
        .list_expenses(&ExpenseFilter {
            status: Some(ExpenseStatus::PartiallyCommitted),
            ..ExpenseFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(partially.len(), 1);

    let untouched = engine
        .list_commitments(&CommitmentFilter {
            has_payments: Some(false),
            ..CommitmentFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(untouched.len(), 1);
    assert_eq!(untouched[0].number, "2025NE0002");

    let cancelled = engine
        .list_payments(&PaymentFilter {
            status: Some(PaymentStatus::Cancelled),
            ..PaymentFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].id, payment.id);

    let for_acme = engine
        .list_payments(&PaymentFilter {
            expense_id: Some(acme.id),
            ..PaymentFilter::default()
        })
        .await
        .unwrap();
    assert!(for_acme.is_empty());

    let inverted = engine
        .list_commitments(&CommitmentFilter {
            min_amount: Some(reais(10)),
            max_amount: Some(reais(1)),
            ..CommitmentFilter::default()
        })
        .await;
    assert!(matches!(inverted, Err(EngineError::InvalidInput(_))));
}

#[tokio::test]
async fn due_date_queries_skip_paid_expenses() {
    let (engine, _db) = engine_with_db().await;
    let open = new_expense(&engine, "Acme", reais(100)).await;
    let settled = new_expense(&engine, "Acme", reais(100)).await;
    let commitment = commit(&engine, &settled, reais(100)).await;
    pay(&engine, &commitment, reais(100)).await;

    let overdue = engine.overdue_expenses(day(2025, 7, 1)).await.unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].id, open.id);
    assert!(engine.overdue_expenses(day(2025, 6, 30)).await.unwrap().is_empty());

    let soon = engine
        .expenses_due_within(day(2025, 6, 25), 5)
        .await
        .unwrap();
    assert_eq!(soon.len(), 1);
    assert!(
        engine
            .expenses_due_within(day(2025, 6, 1), 5)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn availability_reports_remaining_amounts() {
    let (engine, _db) = engine_with_db().await;
    let expense = new_expense(&engine, "Acme", reais(1000)).await;
    let commitment = commit(&engine, &expense, reais(600)).await;
    pay(&engine, &commitment, reais(200)).await;

    let fits = engine
        .commitment_availability(expense.id, reais(400))
        .await
        .unwrap();
    assert!(fits.valid);
    assert_eq!(fits.available, reais(400));

    let too_much = engine
        .payment_availability(commitment.id, reais(500))
        .await
        .unwrap();
    assert!(!too_much.valid);
    assert_eq!(too_much.available, reais(400));
    assert!(!too_much.message.is_empty());
}

#[tokio::test]
async fn statistics_aggregate_the_ledger() {
    let (engine, _db) = engine_with_db().await;
    let first = new_expense(&engine, "Acme", reais(1000)).await;
    new_expense(&engine, "Acme", reais(500)).await;
    let commitment = commit(&engine, &first, reais(800)).await;
    commit(&engine, &first, reais(100)).await;
    pay(&engine, &commitment, reais(300)).await;

    let expenses = engine.expense_statistics(day(2025, 7, 1)).await.unwrap();
    assert_eq!(expenses.count, 2);
    assert_eq!(expenses.total_declared, reais(1500));
    assert_eq!(expenses.total_committed, reais(900));
    assert_eq!(expenses.total_paid, reais(300));
    assert_eq!(expenses.total_remaining, reais(1200));
    assert_eq!(expenses.overdue_count, 2);

    let commitments = engine.commitment_statistics().await.unwrap();
    assert_eq!(commitments.count, 2);
    assert_eq!(commitments.total_committed, reais(900));
    assert_eq!(commitments.total_remaining, reais(600));
    assert_eq!(commitments.without_payments, 1);

    let monthly = engine.monthly_committed_totals(2025).await.unwrap();
    assert_eq!(monthly.len(), 1);
    assert_eq!(monthly[0].month, 3);
    assert_eq!(monthly[0].count, 2);
    assert_eq!(monthly[0].total, reais(900));
    assert!(engine.monthly_committed_totals(2024).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_records_report_not_found() {
    let (engine, _db) = engine_with_db().await;
    let id = uuid::Uuid::new_v4();

    assert!(matches!(
        engine.expense(id).await,
        Err(EngineError::KeyNotFound(_))
    ));
    let err = engine
        .create_commitment(CreateCommitmentCmd::new(
            id,
            reais(1),
            day(2025, 3, 11),
            "alice",
            at(),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));
    assert!(matches!(
        engine.cancel_payment(id, "why", at()).await,
        Err(EngineError::KeyNotFound(_))
    ));
}

#[tokio::test]
async fn builder_rejects_zero_attempts() {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let result = Engine::builder()
        .database(db)
        .options(EngineOptions {
            max_number_attempts: 0,
            ..EngineOptions::default()
        })
        .build()
        .await;
    assert!(matches!(result, Err(EngineError::InvalidInput(_))));
}
