use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::gateway::{
    AuthorizeParams, BankTransfer, GatewayAuthorization, GatewayPaymentStatus, GatewayRefundOutcome,
    GatewayRefundParams, GatewayRefundStatus, PaymentGateway,
};

/// Deterministic in-memory gateway for tests and the seed binary.
///
/// Holds, captures, voids and refunds behave like a well-behaved processor;
/// failure and timeout behavior can be scripted one call at a time via the
/// `fail_next_*` knobs. Idempotency keys are honored for authorize and
/// refund: replaying a key returns the original object without a second
/// side effect.
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
    counter: AtomicU64,
}

#[derive(Default)]
struct FakeState {
    payments: HashMap<String, GatewayPaymentStatus>,
    refunds: HashMap<String, GatewayRefundStatus>,
    customers: Vec<String>,
    seen_authorize_keys: HashMap<String, String>,
    seen_refund_keys: HashMap<String, String>,
    fail_next_authorize: Option<String>,
    fail_next_capture: Option<String>,
    fail_next_refund: Option<String>,
    timeout_next_capture: bool,
    /// When set, refunds come back PENDING and must be completed by a
    /// webhook, mirroring a processor that settles refunds asynchronously.
    refunds_settle_async: bool,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}_{}", prefix, n)
    }

    pub async fn fail_next_authorize(&self, message: &str) {
        self.state.lock().await.fail_next_authorize = Some(message.to_string());
    }

    pub async fn fail_next_capture(&self, message: &str) {
        self.state.lock().await.fail_next_capture = Some(message.to_string());
    }

    pub async fn fail_next_refund(&self, message: &str) {
        self.state.lock().await.fail_next_refund = Some(message.to_string());
    }

    pub async fn timeout_next_capture(&self) {
        self.state.lock().await.timeout_next_capture = true;
    }

    pub async fn settle_refunds_async(&self) {
        self.state.lock().await.refunds_settle_async = true;
    }

    /// Gateway-side status of a hold/charge, for assertions.
    pub async fn payment_status(&self, gateway_payment_id: &str) -> Option<GatewayPaymentStatus> {
        self.state.lock().await.payments.get(gateway_payment_id).copied()
    }

    pub async fn refund_status(&self, gateway_refund_id: &str) -> Option<GatewayRefundStatus> {
        self.state.lock().await.refunds.get(gateway_refund_id).copied()
    }

    pub async fn customer_count(&self) -> usize {
        self.state.lock().await.customers.len()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_customer(
        &self,
        email: &str,
        _given_name: Option<&str>,
        _family_name: Option<&str>,
    ) -> Result<String> {
        let id = self.next_id("fc");
        let mut state = self.state.lock().await;
        state.customers.push(format!("{}:{}", id, email));
        Ok(id)
    }

    async fn authorize(&self, params: AuthorizeParams) -> Result<GatewayAuthorization> {
        let mut state = self.state.lock().await;
        if let Some(message) = state.fail_next_authorize.take() {
            return Err(AppError::Gateway { operation: "authorize", message });
        }
        if let Some(existing) = state.seen_authorize_keys.get(&params.idempotency_key) {
            let status = state.payments[existing];
            return Ok(GatewayAuthorization { gateway_payment_id: existing.clone(), status });
        }
        let id = self.next_id("fp");
        state.payments.insert(id.clone(), GatewayPaymentStatus::Approved);
        state.seen_authorize_keys.insert(params.idempotency_key, id.clone());
        Ok(GatewayAuthorization { gateway_payment_id: id, status: GatewayPaymentStatus::Approved })
    }

    async fn capture(&self, gateway_payment_id: &str) -> Result<GatewayPaymentStatus> {
        let mut state = self.state.lock().await;
        if state.timeout_next_capture {
            state.timeout_next_capture = false;
            return Err(AppError::GatewayTimeout { operation: "capture" });
        }
        if let Some(message) = state.fail_next_capture.take() {
            return Err(AppError::Gateway { operation: "capture", message });
        }
        let status = state
            .payments
            .get_mut(gateway_payment_id)
            .ok_or_else(|| AppError::gateway("capture", "no such payment"))?;
        match *status {
            GatewayPaymentStatus::Approved | GatewayPaymentStatus::Pending => {
                *status = GatewayPaymentStatus::Completed;
                Ok(GatewayPaymentStatus::Completed)
            }
            // A processor-side capture is idempotent: capturing a completed
            // payment reports completed rather than charging twice.
            GatewayPaymentStatus::Completed => Ok(GatewayPaymentStatus::Completed),
            other => Err(AppError::gateway("capture", format!("payment is {}", other))),
        }
    }

    async fn cancel(&self, gateway_payment_id: &str) -> Result<GatewayPaymentStatus> {
        let mut state = self.state.lock().await;
        let status = state
            .payments
            .get_mut(gateway_payment_id)
            .ok_or_else(|| AppError::gateway("cancel", "no such payment"))?;
        match *status {
            GatewayPaymentStatus::Approved | GatewayPaymentStatus::Pending => {
                *status = GatewayPaymentStatus::Canceled;
                Ok(GatewayPaymentStatus::Canceled)
            }
            GatewayPaymentStatus::Canceled => Ok(GatewayPaymentStatus::Canceled),
            other => Err(AppError::gateway("cancel", format!("payment is {}", other))),
        }
    }

    async fn refund(&self, params: GatewayRefundParams) -> Result<GatewayRefundOutcome> {
        let mut state = self.state.lock().await;
        if let Some(message) = state.fail_next_refund.take() {
            return Err(AppError::Gateway { operation: "refund", message });
        }
        if let Some(existing) = state.seen_refund_keys.get(&params.idempotency_key) {
            let status = state.refunds[existing];
            return Ok(GatewayRefundOutcome { gateway_refund_id: existing.clone(), status });
        }
        match state.payments.get(&params.gateway_payment_id) {
            Some(GatewayPaymentStatus::Completed) => {}
            Some(other) => {
                return Err(AppError::gateway("refund", format!("payment is {}", other)));
            }
            None => return Err(AppError::gateway("refund", "no such payment")),
        }
        let id = self.next_id("fr");
        let status = if state.refunds_settle_async {
            GatewayRefundStatus::Pending
        } else {
            GatewayRefundStatus::Completed
        };
        state.refunds.insert(id.clone(), status);
        state.seen_refund_keys.insert(params.idempotency_key, id.clone());
        Ok(GatewayRefundOutcome { gateway_refund_id: id, status })
    }
}

/// Records transfers instead of sending them; can be told to fail once.
#[derive(Default)]
pub struct FakeBankTransfer {
    state: Mutex<FakeTransferState>,
}

#[derive(Default)]
struct FakeTransferState {
    sent: Vec<(String, i64)>,
    fail_next: Option<String>,
}

impl FakeBankTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_next(&self, message: &str) {
        self.state.lock().await.fail_next = Some(message.to_string());
    }

    pub async fn sent_transfers(&self) -> Vec<(String, i64)> {
        self.state.lock().await.sent.clone()
    }
}

#[async_trait]
impl BankTransfer for FakeBankTransfer {
    async fn send(
        &self,
        _routing_number: &str,
        _account_number: &str,
        amount_cents: i64,
        reference: &str,
    ) -> Result<String> {
        let mut state = self.state.lock().await;
        if let Some(message) = state.fail_next.take() {
            return Err(AppError::Gateway { operation: "bank_transfer", message });
        }
        state.sent.push((reference.to_string(), amount_cents));
        Ok(format!("tx-{}", reference))
    }
}
