use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

use ringfence::{
    config::Settings,
    domain::{
        AuthorizeRequest, BankAccount, CreateRateRequest, Payment, PayoutStatus, ReferenceType,
        RegisterBankAccountRequest, RefundReason, RefundRequest, TransactionStatus,
    },
    error::AppError,
    gateway::{FakeBankTransfer, FakeGateway, NoopCatalogAdapter},
    service::ServiceContext,
};

struct Harness {
    context: ServiceContext,
    transfer: Arc<FakeBankTransfer>,
}

async fn setup() -> anyhow::Result<Harness> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let transfer = Arc::new(FakeBankTransfer::new());
    let context = ServiceContext::new(
        pool,
        &Settings::default(),
        Arc::new(FakeGateway::new()),
        transfer.clone(),
        Arc::new(NoopCatalogAdapter),
    )?;
    Ok(Harness { context, transfer })
}

async fn register_account(context: &ServiceContext, coach_id: Uuid) -> anyhow::Result<BankAccount> {
    Ok(context
        .bank_account_service
        .register(RegisterBankAccountRequest {
            coach_id,
            routing_number: "021000021".to_string(),
            account_number: "000123456789".to_string(),
            account_holder: "Jordan Coach".to_string(),
        })
        .await?)
}

/// Capture a 10_000-cent payment for the coach. No bank account is
/// registered here, so capture-time payout initiation is skipped and the
/// test controls payout creation explicitly.
async fn captured_payment(context: &ServiceContext, coach_id: Uuid) -> anyhow::Result<Payment> {
    let rate = context
        .rate_service
        .create(CreateRateRequest {
            coach_id,
            session_type: "coaching".to_string(),
            duration_minutes: 60,
            rate_cents: 10_000,
        })
        .await?;
    let payment = context
        .payment_service
        .authorize(AuthorizeRequest {
            client_id: Uuid::new_v4(),
            coach_id,
            rate_id: rate.id,
            payment_source: None,
            buyer: None,
        })
        .await?;
    Ok(context.payment_service.capture(payment.id).await?)
}

#[tokio::test]
async fn unverified_accounts_cannot_receive_payouts() -> anyhow::Result<()> {
    let h = setup().await?;
    let coach_id = Uuid::new_v4();
    let payment = captured_payment(&h.context, coach_id).await?;
    let account = register_account(&h.context, coach_id).await?;

    let err = h
        .context
        .payout_service
        .create(coach_id, account.id, payment.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // The guard writes no payout row.
    assert!(h.context.payout_service.list_for_coach(coach_id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn approval_runs_the_transfer_and_completes_the_payout() -> anyhow::Result<()> {
    let h = setup().await?;
    let coach_id = Uuid::new_v4();
    let payment = captured_payment(&h.context, coach_id).await?;
    let account = register_account(&h.context, coach_id).await?;
    h.context.bank_account_service.verify(account.id).await?;

    let payout = h
        .context
        .payout_service
        .create(coach_id, account.id, payment.id)
        .await?;
    assert_eq!(payout.status, PayoutStatus::Pending);
    assert_eq!(payout.amount_cents, 8_500);
    assert!(payout.amount_cents <= payment.coach_earnings_cents);

    let approved = h.context.payout_service.approve(payout.id).await?;
    assert_eq!(approved.status, PayoutStatus::Completed);

    let transfers = h.transfer.sent_transfers().await;
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].1, 8_500);

    // Ledger trail: pending row superseded by a completed one, both kept.
    let rows = h
        .context
        .billing_service
        .history_for_reference(payout.id, ReferenceType::Payout)
        .await?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].status, TransactionStatus::Pending);
    assert_eq!(rows[1].status, TransactionStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn rejection_supersedes_the_pending_ledger_row() -> anyhow::Result<()> {
    let h = setup().await?;
    let coach_id = Uuid::new_v4();
    let payment = captured_payment(&h.context, coach_id).await?;
    let account = register_account(&h.context, coach_id).await?;
    h.context.bank_account_service.verify(account.id).await?;

    let payout = h
        .context
        .payout_service
        .create(coach_id, account.id, payment.id)
        .await?;
    let rejected = h
        .context
        .payout_service
        .reject(payout.id, "earnings under review")
        .await?;

    assert_eq!(rejected.status, PayoutStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("earnings under review"));
    assert!(h.transfer.sent_transfers().await.is_empty());

    let rows = h
        .context
        .billing_service
        .history_for_reference(payout.id, ReferenceType::Payout)
        .await?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].status, TransactionStatus::Failed);

    // A rejected payout cannot be approved afterwards.
    let err = h.context.payout_service.approve(payout.id).await.unwrap_err();
    assert!(matches!(err, AppError::StateConflict(_)));
    Ok(())
}

#[tokio::test]
async fn failed_transfers_mark_the_payout_failed() -> anyhow::Result<()> {
    let h = setup().await?;
    let coach_id = Uuid::new_v4();
    let payment = captured_payment(&h.context, coach_id).await?;
    let account = register_account(&h.context, coach_id).await?;
    h.context.bank_account_service.verify(account.id).await?;

    let payout = h
        .context
        .payout_service
        .create(coach_id, account.id, payment.id)
        .await?;

    h.transfer.fail_next("destination account closed").await;
    let err = h.context.payout_service.approve(payout.id).await.unwrap_err();
    assert!(matches!(err, AppError::Gateway { operation: "bank_transfer", .. }));

    let failed = h.context.payout_service.find(payout.id).await?;
    assert_eq!(failed.status, PayoutStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn one_payout_per_payment() -> anyhow::Result<()> {
    let h = setup().await?;
    let coach_id = Uuid::new_v4();
    let payment = captured_payment(&h.context, coach_id).await?;
    let account = register_account(&h.context, coach_id).await?;
    h.context.bank_account_service.verify(account.id).await?;

    h.context
        .payout_service
        .create(coach_id, account.id, payment.id)
        .await?;
    let err = h
        .context
        .payout_service
        .create(coach_id, account.id, payment.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    Ok(())
}

#[tokio::test]
async fn refund_penalties_are_netted_at_payout_creation() -> anyhow::Result<()> {
    let h = setup().await?;
    let coach_id = Uuid::new_v4();
    let payment = captured_payment(&h.context, coach_id).await?;
    let account = register_account(&h.context, coach_id).await?;
    h.context.bank_account_service.verify(account.id).await?;

    // Coach-requested refund of 3_000: the penalty comes entirely out of
    // their earnings.
    h.context
        .refund_service
        .refund(RefundRequest {
            payment_id: payment.id,
            amount_cents: Some(3_000),
            reason: RefundReason::CoachRequested,
        })
        .await?;

    let payout = h
        .context
        .payout_service
        .create(coach_id, account.id, payment.id)
        .await?;
    assert_eq!(payout.amount_cents, 8_500 - 3_000);
    Ok(())
}

#[tokio::test]
async fn fully_penalized_payments_produce_no_payout() -> anyhow::Result<()> {
    let h = setup().await?;
    let coach_id = Uuid::new_v4();
    let payment = captured_payment(&h.context, coach_id).await?;
    let account = register_account(&h.context, coach_id).await?;
    h.context.bank_account_service.verify(account.id).await?;

    // A coach-requested refund of their entire earnings leaves nothing to
    // pay out, while the payment stays partially refunded.
    h.context
        .refund_service
        .refund(RefundRequest {
            payment_id: payment.id,
            amount_cents: Some(8_500),
            reason: RefundReason::CoachRequested,
        })
        .await?;

    let err = h
        .context
        .payout_service
        .create(coach_id, account.id, payment.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    Ok(())
}

#[tokio::test]
async fn accounts_with_payouts_in_flight_cannot_be_deleted() -> anyhow::Result<()> {
    let h = setup().await?;
    let coach_id = Uuid::new_v4();
    let payment = captured_payment(&h.context, coach_id).await?;
    let account = register_account(&h.context, coach_id).await?;
    h.context.bank_account_service.verify(account.id).await?;

    let payout = h
        .context
        .payout_service
        .create(coach_id, account.id, payment.id)
        .await?;

    let err = h.context.bank_account_service.remove(account.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // Once the payout settles, deletion is allowed again.
    h.context.payout_service.approve(payout.id).await?;
    h.context.bank_account_service.remove(account.id).await?;
    assert!(matches!(
        h.context.bank_account_service.find(account.id).await.unwrap_err(),
        AppError::NotFound(_)
    ));
    Ok(())
}

#[tokio::test]
async fn capture_initiates_a_payout_against_the_default_account() -> anyhow::Result<()> {
    let h = setup().await?;
    let coach_id = Uuid::new_v4();

    // Account registered and verified before the sale: the first account
    // becomes the default automatically.
    let account = register_account(&h.context, coach_id).await?;
    h.context.bank_account_service.verify(account.id).await?;

    let payment = captured_payment(&h.context, coach_id).await?;

    let payouts = h.context.payout_service.list_for_coach(coach_id).await?;
    assert_eq!(payouts.len(), 1);
    assert_eq!(payouts[0].payment_id, payment.id);
    assert_eq!(payouts[0].status, PayoutStatus::Pending);
    assert_eq!(payouts[0].amount_cents, payment.coach_earnings_cents);
    Ok(())
}

#[tokio::test]
async fn bank_accounts_are_masked_and_checksummed() -> anyhow::Result<()> {
    let h = setup().await?;
    let coach_id = Uuid::new_v4();

    let err = h
        .context
        .bank_account_service
        .register(RegisterBankAccountRequest {
            coach_id,
            routing_number: "123456789".to_string(), // bad checksum
            account_number: "000123456789".to_string(),
            account_holder: "Jordan Coach".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let account = register_account(&h.context, coach_id).await?;
    assert_eq!(account.masked_account_number(), "****6789");
    assert_ne!(account.account_number_enc, "000123456789");
    assert!(account.is_default);
    assert!(!account.is_verified);
    Ok(())
}

#[tokio::test]
async fn only_one_default_account_per_coach() -> anyhow::Result<()> {
    let h = setup().await?;
    let coach_id = Uuid::new_v4();

    let first = register_account(&h.context, coach_id).await?;
    let second = h
        .context
        .bank_account_service
        .register(RegisterBankAccountRequest {
            coach_id,
            routing_number: "011000015".to_string(),
            account_number: "000987654321".to_string(),
            account_holder: "Jordan Coach".to_string(),
        })
        .await?;
    assert!(first.is_default);
    assert!(!second.is_default);

    h.context.bank_account_service.set_default(second.id).await?;

    let accounts = h.context.bank_account_service.list_for_coach(coach_id).await?;
    let defaults: Vec<_> = accounts.iter().filter(|a| a.is_default).collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0].id, second.id);
    Ok(())
}
