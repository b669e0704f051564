use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

/// One authorization/charge against a client's payment instrument.
///
/// Created `Authorized` by the authorization flow and mutated only by
/// capture, cancellation, refunds and webhook reconciliation. Payments are
/// never deleted; failed and canceled rows stay behind for audit.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub client_id: Uuid,
    pub coach_id: Uuid,
    pub rate_id: Option<Uuid>,
    pub gateway_payment_id: String,
    pub amount_cents: i64,
    pub platform_fee_cents: i64,
    pub coach_earnings_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Invariant: the split must always reassemble into the charged amount.
    pub fn split_is_conserved(&self) -> bool {
        self.platform_fee_cents + self.coach_earnings_cents == self.amount_cents
    }

    pub fn is_capturable(&self) -> bool {
        matches!(self.status, PaymentStatus::Pending | PaymentStatus::Authorized)
    }

    pub fn is_refundable(&self) -> bool {
        matches!(self.status, PaymentStatus::Succeeded | PaymentStatus::PartiallyRefunded)
    }
}

/// Payment lifecycle:
///
/// ```text
/// Pending ──authorize ok──▶ Authorized ──capture──▶ Succeeded ──refund──▶ PartiallyRefunded ──▶ Refunded
///    │                          │
///    └──authorize fail─▶ Failed └──cancel──▶ Canceled
/// ```
///
/// `Failed`, `Canceled` and `Refunded` are terminal. `PartiallyRefunded`
/// accepts further refunds until the balance is exhausted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "TEXT")]
pub enum PaymentStatus {
    Pending,
    Authorized,
    Succeeded,
    PartiallyRefunded,
    Refunded,
    Canceled,
    Failed,
}

impl PaymentStatus {
    /// The single source of truth for transition legality. Every mutation
    /// path (capture, cancel, refund, webhook reconciliation) consults this
    /// table; nothing else decides what a payment may become.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Authorized)
                | (Pending, Succeeded)
                | (Pending, Canceled)
                | (Pending, Failed)
                | (Authorized, Succeeded)
                | (Authorized, Canceled)
                | (Authorized, Failed)
                | (Succeeded, PartiallyRefunded)
                | (Succeeded, Refunded)
                | (PartiallyRefunded, PartiallyRefunded)
                | (PartiallyRefunded, Refunded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Failed | PaymentStatus::Canceled | PaymentStatus::Refunded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Authorized => "Authorized",
            PaymentStatus::Succeeded => "Succeeded",
            PaymentStatus::PartiallyRefunded => "PartiallyRefunded",
            PaymentStatus::Refunded => "Refunded",
            PaymentStatus::Canceled => "Canceled",
            PaymentStatus::Failed => "Failed",
        }
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(PaymentStatus::Pending),
            "Authorized" => Ok(PaymentStatus::Authorized),
            "Succeeded" => Ok(PaymentStatus::Succeeded),
            "PartiallyRefunded" => Ok(PaymentStatus::PartiallyRefunded),
            "Refunded" => Ok(PaymentStatus::Refunded),
            "Canceled" => Ok(PaymentStatus::Canceled),
            "Failed" => Ok(PaymentStatus::Failed),
            _ => Err(AppError::Database(format!("Invalid payment status: {}", s))),
        }
    }
}

/// Input to the authorization flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    pub client_id: Uuid,
    pub coach_id: Uuid,
    pub rate_id: Uuid,
    /// Tokenized payment source, when the caller already collected one.
    pub payment_source: Option<String>,
    pub buyer: Option<BuyerDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyerDetails {
    pub email: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
}
