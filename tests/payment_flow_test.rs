use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

use ringfence::{
    config::Settings,
    domain::{
        AuthorizeRequest, BuyerDetails, CreateRateRequest, PaymentStatus, Rate, ReferenceType,
        TransactionType, UpdateRateRequest,
    },
    error::AppError,
    gateway::{FakeBankTransfer, FakeGateway, GatewayPaymentStatus, NoopCatalogAdapter},
    service::ServiceContext,
};

async fn setup() -> anyhow::Result<(ServiceContext, Arc<FakeGateway>)> {
    // A single connection keeps every query on the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let gateway = Arc::new(FakeGateway::new());
    let context = ServiceContext::new(
        pool,
        &Settings::default(),
        gateway.clone(),
        Arc::new(FakeBankTransfer::new()),
        Arc::new(NoopCatalogAdapter),
    )?;
    Ok((context, gateway))
}

async fn seed_rate(context: &ServiceContext, coach_id: Uuid) -> anyhow::Result<Rate> {
    Ok(context
        .rate_service
        .create(CreateRateRequest {
            coach_id,
            session_type: "coaching".to_string(),
            duration_minutes: 60,
            rate_cents: 10_000,
        })
        .await?)
}

fn authorize_request(client_id: Uuid, coach_id: Uuid, rate_id: Uuid) -> AuthorizeRequest {
    AuthorizeRequest {
        client_id,
        coach_id,
        rate_id,
        payment_source: None,
        buyer: Some(BuyerDetails {
            email: "client@example.com".to_string(),
            given_name: Some("Casey".to_string()),
            family_name: Some("Client".to_string()),
        }),
    }
}

#[tokio::test]
async fn authorize_places_hold_and_conserves_split() -> anyhow::Result<()> {
    let (context, gateway) = setup().await?;
    let coach_id = Uuid::new_v4();
    let client_id = Uuid::new_v4();
    let rate = seed_rate(&context, coach_id).await?;

    let payment = context
        .payment_service
        .authorize(authorize_request(client_id, coach_id, rate.id))
        .await?;

    assert_eq!(payment.status, PaymentStatus::Authorized);
    assert_eq!(payment.amount_cents, 10_000);
    assert_eq!(payment.platform_fee_cents, 1_500);
    assert_eq!(payment.coach_earnings_cents, 8_500);
    assert!(payment.split_is_conserved());
    assert!(payment.paid_at.is_none());

    // The hold exists at the gateway but is not yet captured.
    assert_eq!(
        gateway.payment_status(&payment.gateway_payment_id).await,
        Some(GatewayPaymentStatus::Approved)
    );

    // No money has moved, so the ledger is still empty.
    let rows = context
        .billing_service
        .history_for_reference(payment.id, ReferenceType::Payment)
        .await?;
    assert!(rows.is_empty());
    Ok(())
}

#[tokio::test]
async fn repeat_purchases_reuse_the_gateway_customer() -> anyhow::Result<()> {
    let (context, gateway) = setup().await?;
    let coach_id = Uuid::new_v4();
    let client_id = Uuid::new_v4();
    let rate = seed_rate(&context, coach_id).await?;

    context
        .payment_service
        .authorize(authorize_request(client_id, coach_id, rate.id))
        .await?;
    context
        .payment_service
        .authorize(authorize_request(client_id, coach_id, rate.id))
        .await?;

    assert_eq!(gateway.customer_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn authorize_rejects_inactive_and_foreign_rates() -> anyhow::Result<()> {
    let (context, _gateway) = setup().await?;
    let coach_id = Uuid::new_v4();
    let client_id = Uuid::new_v4();
    let rate = seed_rate(&context, coach_id).await?;

    // Wrong coach for the rate.
    let err = context
        .payment_service
        .authorize(authorize_request(client_id, Uuid::new_v4(), rate.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RateOwnershipMismatch));

    // Deactivated rate.
    context.rate_service.deactivate(rate.id).await?;
    let err = context
        .payment_service
        .authorize(authorize_request(client_id, coach_id, rate.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRate(_)));

    // Nonexistent rate.
    let err = context
        .payment_service
        .authorize(authorize_request(client_id, coach_id, Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRate(_)));
    Ok(())
}

#[tokio::test]
async fn authorize_failure_creates_no_payment() -> anyhow::Result<()> {
    let (context, gateway) = setup().await?;
    let coach_id = Uuid::new_v4();
    let rate = seed_rate(&context, coach_id).await?;

    gateway.fail_next_authorize("card declined").await;
    let err = context
        .payment_service
        .authorize(authorize_request(Uuid::new_v4(), coach_id, rate.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Gateway { operation: "authorize", .. }));
    Ok(())
}

#[tokio::test]
async fn capture_succeeds_and_writes_three_ledger_rows() -> anyhow::Result<()> {
    let (context, gateway) = setup().await?;
    let coach_id = Uuid::new_v4();
    let client_id = Uuid::new_v4();
    let rate = seed_rate(&context, coach_id).await?;

    let payment = context
        .payment_service
        .authorize(authorize_request(client_id, coach_id, rate.id))
        .await?;
    let captured = context.payment_service.capture(payment.id).await?;

    assert_eq!(captured.status, PaymentStatus::Succeeded);
    assert!(captured.paid_at.is_some());
    assert_eq!(
        gateway.payment_status(&payment.gateway_payment_id).await,
        Some(GatewayPaymentStatus::Completed)
    );

    let rows = context
        .billing_service
        .history_for_reference(payment.id, ReferenceType::Payment)
        .await?;
    assert_eq!(rows.len(), 3);

    let client_row = rows
        .iter()
        .find(|r| r.user_id == client_id)
        .expect("client payment row");
    assert_eq!(client_row.amount_cents, 10_000);
    assert_eq!(client_row.transaction_type, TransactionType::Payment);

    let coach_row = rows
        .iter()
        .find(|r| r.user_id == coach_id)
        .expect("coach earnings row");
    assert_eq!(coach_row.amount_cents, 8_500);

    let fee_row = rows
        .iter()
        .find(|r| r.transaction_type == TransactionType::Fee)
        .expect("platform fee row");
    assert_eq!(fee_row.amount_cents, 1_500);
    Ok(())
}

#[tokio::test]
async fn fee_row_is_omitted_for_fee_free_payments() -> anyhow::Result<()> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let mut settings = Settings::default();
    settings.platform.fee_bps = 0;
    let context = ServiceContext::new(
        pool,
        &settings,
        Arc::new(FakeGateway::new()),
        Arc::new(FakeBankTransfer::new()),
        Arc::new(NoopCatalogAdapter),
    )?;

    let coach_id = Uuid::new_v4();
    let rate = seed_rate(&context, coach_id).await?;
    let payment = context
        .payment_service
        .authorize(authorize_request(Uuid::new_v4(), coach_id, rate.id))
        .await?;
    context.payment_service.capture(payment.id).await?;

    let rows = context
        .billing_service
        .history_for_reference(payment.id, ReferenceType::Payment)
        .await?;
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.transaction_type == TransactionType::Payment));
    Ok(())
}

#[tokio::test]
async fn second_capture_is_rejected_without_duplicate_ledger_rows() -> anyhow::Result<()> {
    let (context, _gateway) = setup().await?;
    let coach_id = Uuid::new_v4();
    let rate = seed_rate(&context, coach_id).await?;

    let payment = context
        .payment_service
        .authorize(authorize_request(Uuid::new_v4(), coach_id, rate.id))
        .await?;
    context.payment_service.capture(payment.id).await?;

    let err = context.payment_service.capture(payment.id).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidStateTransition { operation: "capture", status: PaymentStatus::Succeeded }
    ));

    let rows = context
        .billing_service
        .history_for_reference(payment.id, ReferenceType::Payment)
        .await?;
    assert_eq!(rows.len(), 3, "no duplicate ledger rows from the second capture");
    Ok(())
}

#[tokio::test]
async fn capture_failure_marks_payment_failed() -> anyhow::Result<()> {
    let (context, gateway) = setup().await?;
    let coach_id = Uuid::new_v4();
    let rate = seed_rate(&context, coach_id).await?;

    let payment = context
        .payment_service
        .authorize(authorize_request(Uuid::new_v4(), coach_id, rate.id))
        .await?;

    gateway.fail_next_capture("insufficient funds").await;
    let err = context.payment_service.capture(payment.id).await.unwrap_err();
    assert!(matches!(err, AppError::Gateway { operation: "capture", .. }));

    let failed = context.payment_service.find(payment.id).await?;
    assert_eq!(failed.status, PaymentStatus::Failed);
    assert!(failed.failure_reason.is_some());

    // Failed is terminal: a retry is refused before any gateway call.
    let err = context.payment_service.capture(payment.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition { .. }));
    Ok(())
}

#[tokio::test]
async fn capture_timeout_leaves_status_untouched() -> anyhow::Result<()> {
    let (context, gateway) = setup().await?;
    let coach_id = Uuid::new_v4();
    let rate = seed_rate(&context, coach_id).await?;

    let payment = context
        .payment_service
        .authorize(authorize_request(Uuid::new_v4(), coach_id, rate.id))
        .await?;

    gateway.timeout_next_capture().await;
    let err = context.payment_service.capture(payment.id).await.unwrap_err();
    assert!(matches!(err, AppError::GatewayTimeout { operation: "capture" }));

    // Unknown outcome: the payment stays authorized until reconciliation.
    let unchanged = context.payment_service.find(payment.id).await?;
    assert_eq!(unchanged.status, PaymentStatus::Authorized);
    Ok(())
}

#[tokio::test]
async fn cancel_releases_the_hold_without_ledger_entries() -> anyhow::Result<()> {
    let (context, gateway) = setup().await?;
    let coach_id = Uuid::new_v4();
    let rate = seed_rate(&context, coach_id).await?;

    let payment = context
        .payment_service
        .authorize(authorize_request(Uuid::new_v4(), coach_id, rate.id))
        .await?;
    let canceled = context.payment_service.cancel(payment.id, "client no-show").await?;

    assert_eq!(canceled.status, PaymentStatus::Canceled);
    assert_eq!(
        gateway.payment_status(&payment.gateway_payment_id).await,
        Some(GatewayPaymentStatus::Canceled)
    );

    let rows = context
        .billing_service
        .history_for_reference(payment.id, ReferenceType::Payment)
        .await?;
    assert!(rows.is_empty());

    // A released hold cannot be captured.
    let err = context.payment_service.capture(payment.id).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidStateTransition { operation: "capture", status: PaymentStatus::Canceled }
    ));
    Ok(())
}

#[tokio::test]
async fn referenced_rates_are_deactivated_not_deleted() -> anyhow::Result<()> {
    let (context, _gateway) = setup().await?;
    let coach_id = Uuid::new_v4();
    let rate = seed_rate(&context, coach_id).await?;

    context
        .payment_service
        .authorize(authorize_request(Uuid::new_v4(), coach_id, rate.id))
        .await?;

    context.rate_service.delete(rate.id).await?;
    let survivor = context.rate_service.find(rate.id).await?;
    assert!(!survivor.is_active, "referenced rate must be soft-deactivated");

    // An unreferenced rate is actually removed.
    let disposable = context
        .rate_service
        .create(CreateRateRequest {
            coach_id,
            session_type: "intro call".to_string(),
            duration_minutes: 30,
            rate_cents: 5_000,
        })
        .await?;
    context.rate_service.delete(disposable.id).await?;
    assert!(matches!(
        context.rate_service.find(disposable.id).await.unwrap_err(),
        AppError::NotFound(_)
    ));
    Ok(())
}

#[tokio::test]
async fn rate_price_updates_do_not_touch_existing_payments() -> anyhow::Result<()> {
    let (context, _gateway) = setup().await?;
    let coach_id = Uuid::new_v4();
    let rate = seed_rate(&context, coach_id).await?;

    let payment = context
        .payment_service
        .authorize(authorize_request(Uuid::new_v4(), coach_id, rate.id))
        .await?;

    context
        .rate_service
        .update(rate.id, UpdateRateRequest { rate_cents: Some(20_000), ..Default::default() })
        .await?;

    let unchanged = context.payment_service.find(payment.id).await?;
    assert_eq!(unchanged.amount_cents, 10_000);
    Ok(())
}
