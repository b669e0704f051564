use std::collections::HashMap;
use std::sync::Arc;

use rand::{rngs::StdRng, Rng, SeedableRng};
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

use ringfence::{
    config::Settings,
    domain::{AuthorizeRequest, CreateRateRequest, PaymentStatus, RefundReason, RefundRequest},
    gateway::{webhook, FakeBankTransfer, FakeGateway, NoopCatalogAdapter},
    service::ServiceContext,
};

const GATEWAY_STATUSES: &[&str] = &["PENDING", "APPROVED", "COMPLETED", "CANCELED", "FAILED"];
const REASONS: &[RefundReason] = &[
    RefundReason::CustomerRequested,
    RefundReason::CoachRequested,
    RefundReason::AdminInitiated,
    RefundReason::AutoCancellation,
    RefundReason::Duplicate,
    RefundReason::Fraudulent,
];

/// Drive the engine with a few hundred random operations (authorize,
/// capture, cancel, refund, webhook events, scripted gateway failures) and
/// check after every step that no payment ever breaks an invariant:
/// conservation of the split, the refund bound, and single-step transition
/// legality (no resurrection of terminal payments, no backwards motion).
#[tokio::test]
async fn random_operation_sequences_never_reach_illegal_states() -> anyhow::Result<()> {
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

    // Seeded so a failure is reproducible.
    let mut rng = StdRng::seed_from_u64(0x5EED_CA54);

    let coach_id = Uuid::new_v4();
    let rate = context
        .rate_service
        .create(CreateRateRequest {
            coach_id,
            session_type: "coaching".to_string(),
            duration_minutes: 60,
            rate_cents: 10_000,
        })
        .await?;

    let mut payment_ids: Vec<Uuid> = Vec::new();
    let mut last_seen: HashMap<Uuid, PaymentStatus> = HashMap::new();

    for step in 0..300 {
        let roll = rng.gen_range(0..100);

        if roll < 20 || payment_ids.is_empty() {
            // New authorization, occasionally with a scripted decline.
            if rng.gen_ratio(1, 10) {
                gateway.fail_next_authorize("fuzz decline").await;
            }
            if let Ok(payment) = context
                .payment_service
                .authorize(AuthorizeRequest {
                    client_id: Uuid::new_v4(),
                    coach_id,
                    rate_id: rate.id,
                    payment_source: None,
                    buyer: None,
                })
                .await
            {
                last_seen.insert(payment.id, payment.status);
                payment_ids.push(payment.id);
            }
        } else {
            let payment_id = payment_ids[rng.gen_range(0..payment_ids.len())];
            match roll {
                20..=44 => {
                    if rng.gen_ratio(1, 10) {
                        gateway.fail_next_capture("fuzz capture failure").await;
                    }
                    let _ = context.payment_service.capture(payment_id).await;
                }
                45..=59 => {
                    let _ = context.payment_service.cancel(payment_id, "fuzz cancel").await;
                }
                60..=79 => {
                    if rng.gen_ratio(1, 10) {
                        gateway.fail_next_refund("fuzz refund failure").await;
                    }
                    let amount = if rng.gen_bool(0.3) { None } else { Some(rng.gen_range(1..=12_000)) };
                    let reason = REASONS[rng.gen_range(0..REASONS.len())];
                    let _ = context
                        .refund_service
                        .refund(RefundRequest { payment_id, amount_cents: amount, reason })
                        .await;
                }
                _ => {
                    // Random (possibly stale or nonsensical) gateway event.
                    let payment = context.payment_service.find(payment_id).await?;
                    let status = GATEWAY_STATUSES[rng.gen_range(0..GATEWAY_STATUSES.len())];
                    let payload = format!(
                        r#"{{"type":"payment.updated","object":{{"id":"{}","status":"{}"}}}}"#,
                        payment.gateway_payment_id, status
                    );
                    let event = webhook::parse_event(&payload)?;
                    let _ = context.reconciliation_service.process_event(event).await;
                }
            }
        }

        // Invariants must hold after every single operation.
        for id in &payment_ids {
            let payment = context.payment_service.find(*id).await?;

            assert!(
                payment.split_is_conserved(),
                "step {}: split broke conservation: {:?}",
                step,
                payment
            );

            let refunded: i64 = context
                .refund_service
                .list_for_payment(*id)
                .await?
                .iter()
                .filter(|r| r.status == ringfence::domain::RefundStatus::Succeeded)
                .map(|r| r.amount_cents)
                .sum();
            assert!(
                refunded <= payment.amount_cents,
                "step {}: refunds {} exceed charge {}",
                step,
                refunded,
                payment.amount_cents
            );

            let previous = last_seen.insert(*id, payment.status).expect("tracked payment");
            assert!(
                previous == payment.status || previous.can_transition_to(payment.status),
                "step {}: illegal transition {} -> {}",
                step,
                previous,
                payment.status
            );
            if previous.is_terminal() {
                assert_eq!(
                    previous, payment.status,
                    "step {}: terminal payment came back to life",
                    step
                );
            }
        }
    }

    // The run must have actually exercised the machine.
    let statuses: Vec<PaymentStatus> = last_seen.values().copied().collect();
    assert!(statuses.iter().any(|s| *s == PaymentStatus::Succeeded || s.is_terminal()));
    Ok(())
}
