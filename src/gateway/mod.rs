use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{PaymentStatus, RefundStatus};
use crate::error::{AppError, Result};

pub mod fake;
pub mod stripe_client;
pub mod webhook;

pub use fake::{FakeBankTransfer, FakeGateway};
pub use stripe_client::StripeGateway;

/// The boundary to an external card processor. No business logic lives
/// behind this trait; implementations translate these calls onto a concrete
/// processor's API and normalize its responses into the port vocabulary.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_customer(
        &self,
        email: &str,
        given_name: Option<&str>,
        family_name: Option<&str>,
    ) -> Result<String>;

    /// Place a hold on the customer's instrument. `capture_later` holds are
    /// finalized by [`PaymentGateway::capture`] or released by
    /// [`PaymentGateway::cancel`].
    async fn authorize(&self, params: AuthorizeParams) -> Result<GatewayAuthorization>;

    async fn capture(&self, gateway_payment_id: &str) -> Result<GatewayPaymentStatus>;

    async fn cancel(&self, gateway_payment_id: &str) -> Result<GatewayPaymentStatus>;

    async fn refund(&self, params: GatewayRefundParams) -> Result<GatewayRefundOutcome>;
}

/// Moves approved funds to an external bank account. Kept separate from the
/// card port because providers are paid over a different rail; the default
/// no-op implementation stands in until one is wired up.
#[async_trait]
pub trait BankTransfer: Send + Sync {
    async fn send(
        &self,
        routing_number: &str,
        account_number: &str,
        amount_cents: i64,
        reference: &str,
    ) -> Result<String>;
}

pub struct NoopBankTransfer;

#[async_trait]
impl BankTransfer for NoopBankTransfer {
    async fn send(
        &self,
        _routing_number: &str,
        _account_number: &str,
        amount_cents: i64,
        reference: &str,
    ) -> Result<String> {
        tracing::info!("No transfer rail configured; marking {} cents for {} as sent", amount_cents, reference);
        Ok(format!("noop-{}", reference))
    }
}

/// Publishes rate offerings as catalog objects on the processor side.
/// The no-op implementation keeps the boundary honest where no processor
/// catalog is in use.
#[async_trait]
pub trait CatalogAdapter: Send + Sync {
    async fn publish_rate(
        &self,
        coach_id: Uuid,
        session_type: &str,
        rate_cents: i64,
    ) -> Result<Option<String>>;
}

pub struct NoopCatalogAdapter;

#[async_trait]
impl CatalogAdapter for NoopCatalogAdapter {
    async fn publish_rate(
        &self,
        _coach_id: Uuid,
        _session_type: &str,
        _rate_cents: i64,
    ) -> Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizeParams {
    pub customer_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub idempotency_key: String,
    /// Tokenized payment source to confirm the hold against, when present.
    pub payment_source: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct GatewayRefundParams {
    pub gateway_payment_id: String,
    pub amount_cents: i64,
    pub idempotency_key: String,
    pub reason: crate::domain::RefundReason,
}

#[derive(Debug, Clone)]
pub struct GatewayAuthorization {
    pub gateway_payment_id: String,
    pub status: GatewayPaymentStatus,
}

#[derive(Debug, Clone)]
pub struct GatewayRefundOutcome {
    pub gateway_refund_id: String,
    pub status: GatewayRefundStatus,
}

/// The processor's payment status vocabulary, normalized. Adapters map
/// their processor's own terms onto these; the engine maps them onto the
/// local state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayPaymentStatus {
    Pending,
    Approved,
    Completed,
    Canceled,
    Failed,
}

impl GatewayPaymentStatus {
    pub fn to_local(self) -> PaymentStatus {
        match self {
            GatewayPaymentStatus::Pending => PaymentStatus::Pending,
            GatewayPaymentStatus::Approved => PaymentStatus::Authorized,
            GatewayPaymentStatus::Completed => PaymentStatus::Succeeded,
            GatewayPaymentStatus::Canceled => PaymentStatus::Canceled,
            GatewayPaymentStatus::Failed => PaymentStatus::Failed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GatewayPaymentStatus::Pending => "PENDING",
            GatewayPaymentStatus::Approved => "APPROVED",
            GatewayPaymentStatus::Completed => "COMPLETED",
            GatewayPaymentStatus::Canceled => "CANCELED",
            GatewayPaymentStatus::Failed => "FAILED",
        }
    }
}

impl Display for GatewayPaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GatewayPaymentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(GatewayPaymentStatus::Pending),
            "APPROVED" => Ok(GatewayPaymentStatus::Approved),
            "COMPLETED" => Ok(GatewayPaymentStatus::Completed),
            "CANCELED" => Ok(GatewayPaymentStatus::Canceled),
            "FAILED" => Ok(GatewayPaymentStatus::Failed),
            _ => Err(AppError::ReconciliationSkipped(format!("unknown gateway payment status: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayRefundStatus {
    Pending,
    Completed,
    Rejected,
    Failed,
}

impl GatewayRefundStatus {
    pub fn to_local(self) -> RefundStatus {
        match self {
            GatewayRefundStatus::Pending => RefundStatus::Processing,
            GatewayRefundStatus::Completed => RefundStatus::Succeeded,
            GatewayRefundStatus::Rejected | GatewayRefundStatus::Failed => RefundStatus::Failed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GatewayRefundStatus::Pending => "PENDING",
            GatewayRefundStatus::Completed => "COMPLETED",
            GatewayRefundStatus::Rejected => "REJECTED",
            GatewayRefundStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for GatewayRefundStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(GatewayRefundStatus::Pending),
            "COMPLETED" => Ok(GatewayRefundStatus::Completed),
            "REJECTED" => Ok(GatewayRefundStatus::Rejected),
            "FAILED" => Ok(GatewayRefundStatus::Failed),
            _ => Err(AppError::ReconciliationSkipped(format!("unknown gateway refund status: {}", s))),
        }
    }
}

/// Fresh operation-scoped idempotency key. Retried client requests for the
/// same logical operation must reuse the key they were first issued.
pub fn idempotency_key(operation: &str) -> String {
    format!("{}_{}", operation, Uuid::new_v4())
}

/// An asynchronous event delivered by the processor. The gateway is the
/// system of record for settlement; these events correct optimistic local
/// writes whenever the two disagree.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    PaymentCreated(PaymentEventObject),
    PaymentUpdated(PaymentEventObject),
    RefundCreated(RefundEventObject),
    RefundUpdated(RefundEventObject),
    /// Event types we do not consume. Logged and ignored, never an error,
    /// so new gateway event types cannot break reconciliation.
    Unknown { event_type: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEventObject {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundEventObject {
    pub id: String,
    #[serde(default)]
    pub payment_id: Option<String>,
    pub status: String,
}
