use std::sync::Arc;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    domain::*,
    error::{AppError, Result},
    gateway::{self, AuthorizeParams, GatewayPaymentStatus, PaymentGateway},
    repository::{BillingRepository, GatewayCustomerRepository, PaymentRepository, RateRepository},
    service::payout_service::PayoutService,
};

/// Issues authorization holds, finalizes them into charges, and releases
/// them. The gateway is called first and the local row written second; the
/// stored status is re-checked on every write so concurrent captures and
/// webhook updates fail loudly instead of overwriting each other.
pub struct PaymentService {
    payments: Arc<dyn PaymentRepository>,
    rates: Arc<dyn RateRepository>,
    customers: Arc<dyn GatewayCustomerRepository>,
    billing: Arc<dyn BillingRepository>,
    gateway: Arc<dyn PaymentGateway>,
    payouts: Arc<PayoutService>,
    fee_bps: i64,
    currency: String,
}

impl PaymentService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        rates: Arc<dyn RateRepository>,
        customers: Arc<dyn GatewayCustomerRepository>,
        billing: Arc<dyn BillingRepository>,
        gateway: Arc<dyn PaymentGateway>,
        payouts: Arc<PayoutService>,
        fee_bps: i64,
        currency: String,
    ) -> Self {
        Self { payments, rates, customers, billing, gateway, payouts, fee_bps, currency }
    }

    /// Place a hold for a rate on behalf of a client.
    ///
    /// The gateway hold is issued before anything is persisted. If the local
    /// write then fails, the hold is voided again (compensating action) so
    /// no ghost hold survives without a local record.
    pub async fn authorize(&self, request: AuthorizeRequest) -> Result<Payment> {
        let rate = self
            .rates
            .find_by_id(request.rate_id)
            .await?
            .ok_or_else(|| AppError::InvalidRate(format!("rate {} does not exist", request.rate_id)))?;

        if !rate.is_active {
            return Err(AppError::InvalidRate(format!("rate {} is no longer offered", rate.id)));
        }
        if rate.coach_id != request.coach_id {
            return Err(AppError::RateOwnershipMismatch);
        }

        let platform_fee_cents = rate.rate_cents * self.fee_bps / 10_000;
        let coach_earnings_cents = rate.rate_cents - platform_fee_cents;

        let customer_id = self.resolve_customer(request.client_id, request.buyer.as_ref()).await?;

        let authorization = self
            .gateway
            .authorize(AuthorizeParams {
                customer_id,
                amount_cents: rate.rate_cents,
                currency: self.currency.clone(),
                idempotency_key: gateway::idempotency_key("authorize"),
                payment_source: request.payment_source.clone(),
                description: format!("{} session ({} min)", rate.session_type, rate.duration_minutes),
            })
            .await?;

        let status = authorization.status.to_local();
        if status == PaymentStatus::Failed {
            tracing::warn!(
                gateway_payment_id = %authorization.gateway_payment_id,
                "gateway declined the authorization"
            );
        }

        let payment = Payment {
            id: Uuid::new_v4(),
            client_id: request.client_id,
            coach_id: request.coach_id,
            rate_id: Some(rate.id),
            gateway_payment_id: authorization.gateway_payment_id.clone(),
            amount_cents: rate.rate_cents,
            platform_fee_cents,
            coach_earnings_cents,
            currency: self.currency.clone(),
            status,
            failure_reason: None,
            paid_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        match self.payments.create(payment).await {
            Ok(created) => {
                tracing::info!(
                    payment_id = %created.id,
                    gateway_payment_id = %created.gateway_payment_id,
                    amount_cents = created.amount_cents,
                    "authorization hold placed"
                );
                Ok(created)
            }
            Err(err) => {
                // The hold exists at the gateway but we have no record of
                // it. Void it so the client's funds are released.
                tracing::error!(
                    gateway_payment_id = %authorization.gateway_payment_id,
                    error = %err,
                    "local write failed after authorization; voiding the hold"
                );
                if let Err(void_err) = self.gateway.cancel(&authorization.gateway_payment_id).await {
                    tracing::error!(
                        gateway_payment_id = %authorization.gateway_payment_id,
                        error = %void_err,
                        "compensating void failed; hold requires manual reconciliation"
                    );
                }
                Err(AppError::LedgerWriteFailed(err.to_string()))
            }
        }
    }

    /// Finalize a hold into a charge. This is the irreversible economic
    /// event: on success the client has been charged and the earnings split
    /// is written to the ledger.
    pub async fn capture(&self, payment_id: Uuid) -> Result<Payment> {
        let payment = self
            .payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payment {} not found", payment_id)))?;

        // Checked before the gateway call so a double capture never reaches
        // the processor.
        if !payment.is_capturable() {
            return Err(AppError::InvalidStateTransition { operation: "capture", status: payment.status });
        }

        match self.gateway.capture(&payment.gateway_payment_id).await {
            Ok(GatewayPaymentStatus::Completed) => {}
            Ok(other) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    gateway_status = %other,
                    "capture did not complete"
                );
                let reason = format!("capture returned {}", other);
                self.payments
                    .update_status_guarded(
                        payment.id,
                        &[PaymentStatus::Pending, PaymentStatus::Authorized],
                        PaymentStatus::Failed,
                        Some(&reason),
                    )
                    .await?;
                return Err(AppError::gateway("capture", reason));
            }
            Err(err @ AppError::GatewayTimeout { .. }) => {
                // Unknown outcome: leave the local status alone and let
                // reconciliation settle it.
                return Err(err);
            }
            Err(err) => {
                let reason = err.to_string();
                self.payments
                    .update_status_guarded(
                        payment.id,
                        &[PaymentStatus::Pending, PaymentStatus::Authorized],
                        PaymentStatus::Failed,
                        Some(&reason),
                    )
                    .await?;
                tracing::warn!(payment_id = %payment.id, error = %reason, "capture failed at the gateway");
                return Err(err);
            }
        }

        self.finalize_capture(payment.id).await
    }

    /// Apply the local effects of a completed capture: move the payment to
    /// `Succeeded`, write the ledger rows, and kick off payout initiation.
    /// Shared by the user-triggered capture path and webhook reconciliation;
    /// whichever wins the guarded update writes the ledger rows exactly once.
    pub(crate) async fn finalize_capture(&self, payment_id: Uuid) -> Result<Payment> {
        let won = self
            .payments
            .update_status_guarded(
                payment_id,
                &[PaymentStatus::Pending, PaymentStatus::Authorized],
                PaymentStatus::Succeeded,
                None,
            )
            .await?;
        if !won {
            return Err(AppError::StateConflict(format!(
                "payment {} was updated concurrently during capture",
                payment_id
            )));
        }

        let payment = self
            .payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payment {} not found", payment_id)))?;

        tracing::info!(
            payment_id = %payment.id,
            amount_cents = payment.amount_cents,
            coach_earnings_cents = payment.coach_earnings_cents,
            platform_fee_cents = payment.platform_fee_cents,
            "payment captured"
        );

        self.write_capture_ledger(&payment).await?;

        // Best-effort side effect: a failed payout initiation must never
        // fail the capture itself.
        if let Err(err) = self.payouts.initiate_for_payment(&payment).await {
            tracing::warn!(payment_id = %payment.id, error = %err, "payout initiation skipped");
        }

        Ok(payment)
    }

    async fn write_capture_ledger(&self, payment: &Payment) -> Result<()> {
        let rows = [
            Some(BillingTransaction::new(
                payment.client_id,
                UserType::Client,
                TransactionType::Payment,
                payment.amount_cents,
                &payment.currency,
                TransactionStatus::Completed,
                "Session payment".to_string(),
                payment.id,
                ReferenceType::Payment,
            )),
            Some(BillingTransaction::new(
                payment.coach_id,
                UserType::Coach,
                TransactionType::Payment,
                payment.coach_earnings_cents,
                &payment.currency,
                TransactionStatus::Completed,
                "Session earnings".to_string(),
                payment.id,
                ReferenceType::Payment,
            )),
            // The fee row is omitted for fee-free payments.
            (payment.platform_fee_cents > 0).then(|| {
                BillingTransaction::new(
                    PLATFORM_ACCOUNT,
                    UserType::Platform,
                    TransactionType::Fee,
                    payment.platform_fee_cents,
                    &payment.currency,
                    TransactionStatus::Completed,
                    "Platform fee".to_string(),
                    payment.id,
                    ReferenceType::Payment,
                )
            }),
        ];

        for row in rows.into_iter().flatten() {
            self.billing
                .create(row)
                .await
                .map_err(|e| AppError::LedgerWriteFailed(e.to_string()))?;
        }
        Ok(())
    }

    /// Release an uncaptured hold. No money moved, so no ledger entries.
    pub async fn cancel(&self, payment_id: Uuid, reason: &str) -> Result<Payment> {
        let payment = self
            .payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payment {} not found", payment_id)))?;

        if !payment.is_capturable() {
            return Err(AppError::InvalidStateTransition { operation: "cancel", status: payment.status });
        }

        self.gateway.cancel(&payment.gateway_payment_id).await?;

        let won = self
            .payments
            .update_status_guarded(
                payment.id,
                &[PaymentStatus::Pending, PaymentStatus::Authorized],
                PaymentStatus::Canceled,
                Some(reason),
            )
            .await?;
        if !won {
            return Err(AppError::StateConflict(format!(
                "payment {} was updated concurrently during cancellation",
                payment.id
            )));
        }

        tracing::info!(payment_id = %payment.id, reason, "authorization hold released");

        self.payments
            .find_by_id(payment.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payment {} not found", payment.id)))
    }

    pub async fn find(&self, payment_id: Uuid) -> Result<Payment> {
        self.payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payment {} not found", payment_id)))
    }

    /// Resolve the gateway customer for a client, creating one on first
    /// purchase.
    async fn resolve_customer(&self, client_id: Uuid, buyer: Option<&BuyerDetails>) -> Result<String> {
        if let Some(existing) = self.customers.find_by_client(client_id).await? {
            return Ok(existing.customer_id);
        }

        let fallback_email = format!("client+{}@bookings.invalid", client_id);
        let (email, given, family) = match buyer {
            Some(b) => (b.email.as_str(), b.given_name.as_deref(), b.family_name.as_deref()),
            None => (fallback_email.as_str(), None, None),
        };

        let customer_id = self.gateway.create_customer(email, given, family).await?;
        let record = self.customers.create(client_id, &customer_id).await?;
        tracing::debug!(client_id = %client_id, customer_id = %record.customer_id, "gateway customer created");
        Ok(record.customer_id)
    }
}
