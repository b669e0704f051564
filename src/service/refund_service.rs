use std::sync::Arc;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    domain::*,
    error::{AppError, Result},
    gateway::{self, GatewayRefundParams, PaymentGateway},
    repository::{BillingRepository, PaymentRepository, RefundRepository},
};

/// Computes refund distribution, calls the gateway, and keeps the payment's
/// refunded/partially-refunded status and the ledger in step with the
/// refunds that actually settle.
pub struct RefundService {
    payments: Arc<dyn PaymentRepository>,
    refunds: Arc<dyn RefundRepository>,
    billing: Arc<dyn BillingRepository>,
    gateway: Arc<dyn PaymentGateway>,
}

impl RefundService {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        refunds: Arc<dyn RefundRepository>,
        billing: Arc<dyn BillingRepository>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self { payments, refunds, billing, gateway }
    }

    /// Issue a refund. With no amount given, the full remaining balance is
    /// refunded. The sum of succeeded refunds can never exceed the original
    /// charge; a request that would breach the bound is rejected before any
    /// gateway call and leaves no refund row behind.
    pub async fn refund(&self, request: RefundRequest) -> Result<Refund> {
        let payment = self
            .payments
            .find_by_id(request.payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payment {} not found", request.payment_id)))?;

        if !payment.is_refundable() {
            return Err(AppError::InvalidStateTransition { operation: "refund", status: payment.status });
        }

        let already_refunded = self.refunds.sum_succeeded_for_payment(payment.id).await?;
        let available = payment.amount_cents - already_refunded;
        let amount_cents = request.amount_cents.unwrap_or(available);

        if amount_cents <= 0 {
            return Err(AppError::Validation("refund amount must be positive".to_string()));
        }
        if amount_cents > available {
            return Err(AppError::RefundExceedsBalance { requested: amount_cents, available });
        }

        let split = RefundSplit::distribute(
            request.reason,
            amount_cents,
            payment.coach_earnings_cents,
            payment.platform_fee_cents,
        );

        let refund = self
            .refunds
            .create(Refund {
                id: Uuid::new_v4(),
                payment_id: payment.id,
                gateway_refund_id: None,
                amount_cents,
                reason: request.reason,
                coach_penalty_cents: split.coach_penalty_cents,
                platform_refund_cents: split.platform_refund_cents,
                status: RefundStatus::Pending,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await?;

        let outcome = match self
            .gateway
            .refund(GatewayRefundParams {
                gateway_payment_id: payment.gateway_payment_id.clone(),
                amount_cents,
                idempotency_key: gateway::idempotency_key("refund"),
                reason: request.reason,
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(err @ AppError::GatewayTimeout { .. }) => {
                // Unknown outcome: the refund stays pending until a
                // reconciliation pass or webhook settles it.
                tracing::warn!(refund_id = %refund.id, "refund outcome unknown after timeout");
                return Err(err);
            }
            Err(err) => {
                self.refunds
                    .update_status_guarded(refund.id, &[RefundStatus::Pending], RefundStatus::Failed)
                    .await?;
                tracing::warn!(refund_id = %refund.id, error = %err, "gateway rejected the refund");
                return Err(err);
            }
        };

        let accepted_status = outcome.status.to_local();
        let attached = self
            .refunds
            .attach_gateway_refund(refund.id, &outcome.gateway_refund_id, accepted_status)
            .await?;

        tracing::info!(
            refund_id = %refund.id,
            gateway_refund_id = %outcome.gateway_refund_id,
            amount_cents,
            reason = %request.reason,
            status = %accepted_status,
            "refund accepted by gateway"
        );

        if attached && accepted_status == RefundStatus::Succeeded {
            let settled = self
                .refunds
                .find_by_id(refund.id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("refund {} not found", refund.id)))?;
            self.finalize_succeeded(&settled).await?;
        }

        self.refunds
            .find_by_id(refund.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("refund {} not found", refund.id)))
    }

    /// Apply the local effects of a refund that reached `Succeeded`:
    /// recompute the payment's cumulative refund status and write the
    /// ledger rows. Called exactly once per refund, by whichever path
    /// (synchronous or webhook) won the guarded status update.
    pub(crate) async fn finalize_succeeded(&self, refund: &Refund) -> Result<()> {
        let payment = self
            .payments
            .find_by_id(refund.payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payment {} not found", refund.payment_id)))?;

        let total_refunded = self.refunds.sum_succeeded_for_payment(payment.id).await?;
        let new_status = if total_refunded >= payment.amount_cents {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartiallyRefunded
        };

        let won = self
            .payments
            .update_status_guarded(
                payment.id,
                &[PaymentStatus::Succeeded, PaymentStatus::PartiallyRefunded],
                new_status,
                None,
            )
            .await?;
        if !won {
            tracing::warn!(
                payment_id = %payment.id,
                "payment status changed concurrently while finalizing a refund"
            );
        } else {
            tracing::info!(
                payment_id = %payment.id,
                old_status = %payment.status,
                new_status = %new_status,
                total_refunded,
                "payment refund status recomputed"
            );
        }

        self.billing
            .create(BillingTransaction::new(
                payment.client_id,
                UserType::Client,
                TransactionType::Refund,
                refund.amount_cents,
                &payment.currency,
                TransactionStatus::Completed,
                format!("Refund ({})", refund.reason),
                refund.id,
                ReferenceType::Refund,
            ))
            .await
            .map_err(|e| AppError::LedgerWriteFailed(e.to_string()))?;

        if refund.coach_penalty_cents > 0 {
            // Informational deduction: netted against the payout for this
            // payment rather than clawed back immediately.
            self.billing
                .create(BillingTransaction::new(
                    payment.coach_id,
                    UserType::Coach,
                    TransactionType::Fee,
                    refund.coach_penalty_cents,
                    &payment.currency,
                    TransactionStatus::Completed,
                    format!("Refund penalty ({})", refund.reason),
                    refund.id,
                    ReferenceType::Refund,
                ))
                .await
                .map_err(|e| AppError::LedgerWriteFailed(e.to_string()))?;
        }

        Ok(())
    }

    pub async fn list_for_payment(&self, payment_id: Uuid) -> Result<Vec<Refund>> {
        self.refunds.list_by_payment(payment_id).await
    }
}
