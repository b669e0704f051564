use async_trait::async_trait;
use std::time::Duration;
use stripe::{
    CancelPaymentIntent, CapturePaymentIntent, Client, CreateCustomer, CreatePaymentIntent,
    CreateRefund, Customer, EventObject, EventType, PaymentIntent, PaymentIntentCaptureMethod,
    PaymentIntentStatus, RequestStrategy, Webhook,
};

use crate::domain::RefundReason;
use crate::error::{AppError, Result};
use crate::gateway::{
    AuthorizeParams, GatewayAuthorization, GatewayEvent, GatewayPaymentStatus, GatewayRefundOutcome,
    GatewayRefundParams, GatewayRefundStatus, PaymentEventObject, PaymentGateway,
};

/// Production gateway adapter on Stripe. Authorizations are manual-capture
/// PaymentIntents; every mutating call carries the caller's idempotency key
/// and a bounded timeout. A timeout is surfaced as
/// [`AppError::GatewayTimeout`] because the outcome is unknown, not failed.
pub struct StripeGateway {
    client: Client,
    webhook_secret: Option<String>,
    timeout: Duration,
}

impl StripeGateway {
    pub fn new(secret_key: &str, webhook_secret: Option<String>, timeout_seconds: u64) -> Self {
        Self {
            client: Client::new(secret_key),
            webhook_secret,
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    /// A client that will apply the given idempotency key to its next
    /// request, so a retried call cannot produce a second side effect.
    fn keyed_client(&self, idempotency_key: String) -> Client {
        self.client.clone().with_strategy(RequestStrategy::Idempotent(idempotency_key))
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = std::result::Result<T, stripe::StripeError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(map_stripe_error(err, operation)),
            Err(_) => Err(AppError::GatewayTimeout { operation }),
        }
    }

    /// Translate a Stripe webhook delivery into the port vocabulary. Only
    /// payment-intent events are consumed; everything else is `Unknown`.
    pub fn parse_webhook(&self, payload: &str, signature: &str) -> Result<GatewayEvent> {
        let secret = self
            .webhook_secret
            .as_deref()
            .ok_or_else(|| AppError::Internal("no webhook secret configured".to_string()))?;

        let event = Webhook::construct_event(payload, signature, secret)
            .map_err(|e| AppError::Validation(format!("webhook verification failed: {}", e)))?;

        let mapped = match event.type_ {
            EventType::PaymentIntentSucceeded => payment_event(event.data.object, GatewayPaymentStatus::Completed),
            EventType::PaymentIntentCanceled => payment_event(event.data.object, GatewayPaymentStatus::Canceled),
            EventType::PaymentIntentPaymentFailed => payment_event(event.data.object, GatewayPaymentStatus::Failed),
            other => Some(GatewayEvent::Unknown { event_type: format!("{:?}", other) }),
        };
        Ok(mapped.unwrap_or(GatewayEvent::Unknown { event_type: "malformed".to_string() }))
    }
}

fn payment_event(object: EventObject, status: GatewayPaymentStatus) -> Option<GatewayEvent> {
    if let EventObject::PaymentIntent(intent) = object {
        Some(GatewayEvent::PaymentUpdated(PaymentEventObject {
            id: intent.id.to_string(),
            status: status.as_str().to_string(),
        }))
    } else {
        None
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_customer(
        &self,
        email: &str,
        given_name: Option<&str>,
        family_name: Option<&str>,
    ) -> Result<String> {
        let client = self.keyed_client(crate::gateway::idempotency_key("create_customer"));

        let full_name = match (given_name, family_name) {
            (Some(g), Some(f)) => Some(format!("{} {}", g, f)),
            (Some(g), None) => Some(g.to_string()),
            (None, Some(f)) => Some(f.to_string()),
            (None, None) => None,
        };

        let mut params = CreateCustomer::new();
        params.email = Some(email);
        params.name = full_name.as_deref();

        let customer = self
            .bounded("create_customer", Customer::create(&client, params))
            .await?;
        Ok(customer.id.to_string())
    }

    async fn authorize(&self, params: AuthorizeParams) -> Result<GatewayAuthorization> {
        let client = self.keyed_client(params.idempotency_key.clone());

        let currency = params
            .currency
            .to_lowercase()
            .parse::<stripe::Currency>()
            .map_err(|_| AppError::Validation(format!("unsupported currency: {}", params.currency)))?;

        let mut create = CreatePaymentIntent::new(params.amount_cents, currency);
        create.capture_method = Some(PaymentIntentCaptureMethod::Manual);
        create.description = Some(&params.description);
        create.customer = Some(
            params
                .customer_id
                .parse()
                .map_err(|_| AppError::Validation(format!("invalid customer id: {}", params.customer_id)))?,
        );
        if let Some(ref source) = params.payment_source {
            create.payment_method = Some(
                source
                    .parse()
                    .map_err(|_| AppError::Validation(format!("invalid payment source: {}", source)))?,
            );
            create.confirm = Some(true);
        }

        let intent = self
            .bounded("authorize", PaymentIntent::create(&client, create))
            .await?;

        Ok(GatewayAuthorization {
            gateway_payment_id: intent.id.to_string(),
            status: map_intent_status(intent.status),
        })
    }

    async fn capture(&self, gateway_payment_id: &str) -> Result<GatewayPaymentStatus> {
        let client = self.keyed_client(crate::gateway::idempotency_key("capture"));
        let intent_id = parse_intent_id(gateway_payment_id)?;

        let intent = self
            .bounded(
                "capture",
                PaymentIntent::capture(&client, &intent_id, CapturePaymentIntent::default()),
            )
            .await?;
        Ok(map_intent_status(intent.status))
    }

    async fn cancel(&self, gateway_payment_id: &str) -> Result<GatewayPaymentStatus> {
        let client = self.keyed_client(crate::gateway::idempotency_key("cancel"));
        let intent_id = parse_intent_id(gateway_payment_id)?;

        let intent = self
            .bounded(
                "cancel",
                PaymentIntent::cancel(&client, &intent_id, CancelPaymentIntent::default()),
            )
            .await?;
        Ok(map_intent_status(intent.status))
    }

    async fn refund(&self, params: GatewayRefundParams) -> Result<GatewayRefundOutcome> {
        let client = self.keyed_client(params.idempotency_key.clone());

        let mut create = CreateRefund::new();
        create.payment_intent = Some(parse_intent_id(&params.gateway_payment_id)?);
        create.amount = Some(params.amount_cents);
        create.reason = Some(match params.reason {
            RefundReason::Duplicate => stripe::RefundReasonFilter::Duplicate,
            RefundReason::Fraudulent => stripe::RefundReasonFilter::Fraudulent,
            _ => stripe::RefundReasonFilter::RequestedByCustomer,
        });

        let refund = self
            .bounded("refund", stripe::Refund::create(&client, create))
            .await?;

        let status = match refund.status.as_deref() {
            Some("succeeded") => GatewayRefundStatus::Completed,
            Some("failed") => GatewayRefundStatus::Failed,
            Some("canceled") => GatewayRefundStatus::Rejected,
            // "pending", "requires_action", or absent: still settling.
            _ => GatewayRefundStatus::Pending,
        };

        Ok(GatewayRefundOutcome { gateway_refund_id: refund.id.to_string(), status })
    }
}

fn parse_intent_id(id: &str) -> Result<stripe::PaymentIntentId> {
    id.parse()
        .map_err(|_| AppError::Validation(format!("invalid gateway payment id: {}", id)))
}

fn map_intent_status(status: PaymentIntentStatus) -> GatewayPaymentStatus {
    match status {
        PaymentIntentStatus::RequiresCapture => GatewayPaymentStatus::Approved,
        PaymentIntentStatus::Succeeded => GatewayPaymentStatus::Completed,
        PaymentIntentStatus::Canceled => GatewayPaymentStatus::Canceled,
        PaymentIntentStatus::RequiresPaymentMethod
        | PaymentIntentStatus::RequiresConfirmation
        | PaymentIntentStatus::RequiresAction
        | PaymentIntentStatus::Processing => GatewayPaymentStatus::Pending,
    }
}

/// Surface the processor's human-readable reason; wrap everything else as a
/// generic gateway error for the operation.
fn map_stripe_error(error: stripe::StripeError, operation: &'static str) -> AppError {
    match error {
        stripe::StripeError::Stripe(request_error) => {
            let message = request_error
                .message
                .clone()
                .unwrap_or_else(|| "processor rejected the request".to_string());
            AppError::Gateway { operation, message }
        }
        stripe::StripeError::Timeout => AppError::GatewayTimeout { operation },
        other => AppError::Gateway { operation, message: other.to_string() },
    }
}
