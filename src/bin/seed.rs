use clap::Parser;
use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use uuid::Uuid;

use ringfence::{
    config::Settings,
    domain::{
        AuthorizeRequest, BuyerDetails, CreateRateRequest, RefundReason, RefundRequest,
        RegisterBankAccountRequest, UserType,
    },
    gateway::{FakeBankTransfer, FakeGateway, NoopCatalogAdapter},
    service::ServiceContext,
};

/// Seed a demo database and run one full payment lifecycle against the
/// in-memory fake gateway: authorize, capture, partial refund, payout.
#[derive(Parser)]
struct Args {
    /// Database URL (defaults to DATABASE_URL or sqlite:ringfence.db)
    #[arg(long)]
    database_url: Option<String>,

    /// Number of coaches to seed
    #[arg(long, default_value_t = 3)]
    coaches: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ringfence=info".into()),
        )
        .init();

    let args = Args::parse();

    println!("🌱 Starting database seeding...");

    let database_url = args
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| "sqlite:ringfence.db?mode=rwc".to_string());

    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    println!("📋 Running migrations...");
    sqlx::migrate!("./migrations").run(&db_pool).await?;

    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });
    let gateway = Arc::new(FakeGateway::new());
    let transfer = Arc::new(FakeBankTransfer::new());
    let context = ServiceContext::new(
        db_pool,
        &settings,
        gateway,
        transfer,
        Arc::new(NoopCatalogAdapter),
    )?;

    println!("💼 Creating coaches, rates and bank accounts...");
    let mut coach_rates = Vec::new();
    for i in 0..args.coaches {
        let coach_id = Uuid::new_v4();
        let rate = context
            .rate_service
            .create(CreateRateRequest {
                coach_id,
                session_type: if i % 2 == 0 { "coaching" } else { "consultation" }.to_string(),
                duration_minutes: 60,
                rate_cents: 10_000 + (i as i64) * 2_500,
            })
            .await?;

        let account = context
            .bank_account_service
            .register(RegisterBankAccountRequest {
                coach_id,
                routing_number: "011000015".to_string(),
                account_number: format!("00012345{:04}", i),
                account_holder: format!(
                    "{} {}",
                    FirstName().fake::<String>(),
                    LastName().fake::<String>()
                ),
            })
            .await?;
        context.bank_account_service.verify(account.id).await?;

        coach_rates.push((coach_id, rate));
    }

    println!("💳 Running a full payment lifecycle for the first coach...");
    let (coach_id, rate) = &coach_rates[0];
    let client_id = Uuid::new_v4();

    let payment = context
        .payment_service
        .authorize(AuthorizeRequest {
            client_id,
            coach_id: *coach_id,
            rate_id: rate.id,
            payment_source: None,
            buyer: Some(BuyerDetails {
                email: "demo.client@example.com".to_string(),
                given_name: Some(FirstName().fake()),
                family_name: Some(LastName().fake()),
            }),
        })
        .await?;
    println!("  🔒 Hold placed: {} ({} cents)", payment.id, payment.amount_cents);

    let captured = context.payment_service.capture(payment.id).await?;
    println!(
        "  💰 Captured: {} cents ({} to coach, {} platform fee)",
        captured.amount_cents, captured.coach_earnings_cents, captured.platform_fee_cents
    );

    let refund = context
        .refund_service
        .refund(RefundRequest {
            payment_id: payment.id,
            amount_cents: Some(captured.amount_cents / 4),
            reason: RefundReason::CustomerRequested,
        })
        .await?;
    println!(
        "  ↩️  Partial refund: {} cents ({} coach penalty, {} platform)",
        refund.amount_cents, refund.coach_penalty_cents, refund.platform_refund_cents
    );

    for payout in context.payout_service.list_pending().await? {
        let approved = context.payout_service.approve(payout.id).await?;
        println!("  🏦 Payout approved: {} cents -> {}", approved.net_amount_cents, approved.status);
    }

    println!("📒 Ledger for the coach:");
    for row in context
        .billing_service
        .history_for_user(*coach_id, UserType::Coach)
        .await?
    {
        println!(
            "  {} {:>8} cents  [{:?}] {}",
            row.created_at.format("%H:%M:%S"),
            row.amount_cents,
            row.transaction_type,
            row.description
        );
    }

    let summary = context.billing_service.coach_earnings_summary(*coach_id).await?;
    println!(
        "✅ Done. Coach earned {} cents, penalties {}, paid out {}, outstanding {}.",
        summary.total_earned_cents,
        summary.total_penalty_cents,
        summary.total_paid_out_cents,
        summary.outstanding_balance_cents
    );

    Ok(())
}
