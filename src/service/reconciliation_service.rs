use std::sync::Arc;

use crate::{
    domain::{PaymentStatus, RefundStatus},
    error::{AppError, Result},
    gateway::{
        webhook, GatewayEvent, GatewayPaymentStatus, GatewayRefundStatus, PaymentEventObject,
        RefundEventObject,
    },
    repository::{PaymentRepository, RefundRepository},
    service::{payment_service::PaymentService, refund_service::RefundService},
};

/// Merges asynchronous gateway events into local state.
///
/// The gateway is the system of record for settlement; local writes from
/// the authorize/capture/cancel/refund flows are optimistic and corrected
/// here whenever the gateway's confirmation disagrees. Only legal forward
/// transitions are applied: events that arrive late, out of order, or after
/// a local mutation are logged and skipped rather than rolled backwards.
pub struct ReconciliationService {
    payments: Arc<dyn PaymentRepository>,
    refunds: Arc<dyn RefundRepository>,
    payment_service: Arc<PaymentService>,
    refund_service: Arc<RefundService>,
    webhook_secret: Option<String>,
}

impl ReconciliationService {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        refunds: Arc<dyn RefundRepository>,
        payment_service: Arc<PaymentService>,
        refund_service: Arc<RefundService>,
        webhook_secret: Option<String>,
    ) -> Self {
        Self { payments, refunds, payment_service, refund_service, webhook_secret }
    }

    /// Entry point for a raw webhook delivery: verify the signature, parse
    /// the envelope, apply the event.
    pub async fn process_delivery(&self, payload: &str, signature: &str) -> Result<()> {
        let secret = self
            .webhook_secret
            .as_deref()
            .ok_or_else(|| AppError::Internal("no webhook secret configured".to_string()))?;

        let event = webhook::verified_event(secret, payload, signature)?;
        self.process_event(event).await
    }

    pub async fn process_event(&self, event: GatewayEvent) -> Result<()> {
        match event {
            GatewayEvent::PaymentCreated(object) | GatewayEvent::PaymentUpdated(object) => {
                self.reconcile_payment(object).await
            }
            GatewayEvent::RefundCreated(object) | GatewayEvent::RefundUpdated(object) => {
                self.reconcile_refund(object).await
            }
            GatewayEvent::Unknown { event_type } => {
                // Forward-compatibility: new gateway event types must not
                // break the webhook consumer.
                tracing::info!(event_type = %event_type, "ignoring unhandled gateway event type");
                Ok(())
            }
        }
    }

    async fn reconcile_payment(&self, object: PaymentEventObject) -> Result<()> {
        let payment = match self.payments.find_by_gateway_id(&object.id).await? {
            Some(payment) => payment,
            None => {
                tracing::warn!(gateway_payment_id = %object.id, "webhook for unknown payment");
                return Err(AppError::ReconciliationSkipped(format!(
                    "no local payment for gateway id {}",
                    object.id
                )));
            }
        };

        let gateway_status: GatewayPaymentStatus = object.status.parse()?;
        let target = gateway_status.to_local();

        if payment.status == target {
            tracing::debug!(payment_id = %payment.id, status = %target, "payment already reconciled");
            return Ok(());
        }

        if !payment.status.can_transition_to(target) {
            tracing::info!(
                payment_id = %payment.id,
                local_status = %payment.status,
                gateway_status = %object.status,
                "skipping stale or illegal gateway transition"
            );
            return Err(AppError::ReconciliationSkipped(format!(
                "{} -> {} is not a legal forward transition",
                payment.status, target
            )));
        }

        // A gateway-confirmed capture carries the same local side effects
        // as a user-triggered one (ledger rows, payout initiation), applied
        // by whichever path wins the guarded update.
        if target == PaymentStatus::Succeeded {
            let updated = match self.payment_service.finalize_capture(payment.id).await {
                Ok(updated) => updated,
                // A user-triggered capture won the race; the event carried
                // no new information.
                Err(AppError::StateConflict(msg)) => return Err(AppError::ReconciliationSkipped(msg)),
                Err(err) => return Err(err),
            };
            tracing::info!(
                payment_id = %updated.id,
                old_status = %payment.status,
                new_status = %updated.status,
                "payment reconciled from gateway event"
            );
            return Ok(());
        }

        let won = self
            .payments
            .update_status_guarded(payment.id, &[payment.status], target, None)
            .await?;
        if !won {
            return Err(AppError::ReconciliationSkipped(format!(
                "payment {} changed concurrently while reconciling",
                payment.id
            )));
        }

        tracing::info!(
            payment_id = %payment.id,
            old_status = %payment.status,
            new_status = %target,
            "payment reconciled from gateway event"
        );
        Ok(())
    }

    async fn reconcile_refund(&self, object: RefundEventObject) -> Result<()> {
        let refund = match self.refunds.find_by_gateway_id(&object.id).await? {
            Some(refund) => refund,
            None => {
                tracing::warn!(gateway_refund_id = %object.id, "webhook for unknown refund");
                return Err(AppError::ReconciliationSkipped(format!(
                    "no local refund for gateway id {}",
                    object.id
                )));
            }
        };

        let gateway_status: GatewayRefundStatus = object.status.parse()?;
        let target = gateway_status.to_local();

        if refund.status == target {
            tracing::debug!(refund_id = %refund.id, status = %target, "refund already reconciled");
            return Ok(());
        }

        if !refund.status.can_transition_to(target) {
            tracing::info!(
                refund_id = %refund.id,
                local_status = %refund.status,
                gateway_status = %object.status,
                "skipping stale or illegal gateway refund transition"
            );
            return Err(AppError::ReconciliationSkipped(format!(
                "{} -> {} is not a legal forward transition",
                refund.status, target
            )));
        }

        let won = self
            .refunds
            .update_status_guarded(refund.id, &[refund.status], target)
            .await?;
        if !won {
            return Err(AppError::ReconciliationSkipped(format!(
                "refund {} changed concurrently while reconciling",
                refund.id
            )));
        }

        tracing::info!(
            refund_id = %refund.id,
            old_status = %refund.status,
            new_status = %target,
            "refund reconciled from gateway event"
        );

        if target == RefundStatus::Succeeded {
            let settled = self
                .refunds
                .find_by_id(refund.id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("refund {} not found", refund.id)))?;
            self.refund_service.finalize_succeeded(&settled).await?;
        }

        Ok(())
    }
}
