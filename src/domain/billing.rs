use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

/// Ledger rows attributed to the platform itself use the nil UUID as their
/// account, so the row shape stays uniform without a synthetic user record.
pub const PLATFORM_ACCOUNT: Uuid = Uuid::nil();

/// One line in the append-only billing ledger.
///
/// Every state transition that moves money writes at least one of these.
/// Rows are immutable once written; a correction is a new row for the same
/// `(reference_id, reference_type)` and readers take the latest.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BillingTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_type: UserType,
    pub transaction_type: TransactionType,
    pub amount_cents: i64,
    pub currency: String,
    pub status: TransactionStatus,
    pub description: String,
    pub reference_id: Uuid,
    pub reference_type: ReferenceType,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "TEXT")]
pub enum UserType {
    Client,
    Coach,
    Platform,
}

impl UserType {
    pub fn as_str(self) -> &'static str {
        match self {
            UserType::Client => "Client",
            UserType::Coach => "Coach",
            UserType::Platform => "Platform",
        }
    }
}

impl FromStr for UserType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Client" => Ok(UserType::Client),
            "Coach" => Ok(UserType::Coach),
            "Platform" => Ok(UserType::Platform),
            _ => Err(AppError::Database(format!("Invalid user type: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "TEXT")]
pub enum TransactionType {
    Payment,
    Refund,
    Fee,
    Payout,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Payment => "Payment",
            TransactionType::Refund => "Refund",
            TransactionType::Fee => "Fee",
            TransactionType::Payout => "Payout",
        }
    }
}

impl FromStr for TransactionType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Payment" => Ok(TransactionType::Payment),
            "Refund" => Ok(TransactionType::Refund),
            "Fee" => Ok(TransactionType::Fee),
            "Payout" => Ok(TransactionType::Payout),
            _ => Err(AppError::Database(format!("Invalid transaction type: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "TEXT")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "Pending",
            TransactionStatus::Completed => "Completed",
            TransactionStatus::Failed => "Failed",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(TransactionStatus::Pending),
            "Completed" => Ok(TransactionStatus::Completed),
            "Failed" => Ok(TransactionStatus::Failed),
            _ => Err(AppError::Database(format!("Invalid transaction status: {}", s))),
        }
    }
}

/// What a ledger row points back to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "TEXT")]
pub enum ReferenceType {
    Payment,
    Refund,
    Payout,
}

impl ReferenceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReferenceType::Payment => "Payment",
            ReferenceType::Refund => "Refund",
            ReferenceType::Payout => "Payout",
        }
    }
}

impl FromStr for ReferenceType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Payment" => Ok(ReferenceType::Payment),
            "Refund" => Ok(ReferenceType::Refund),
            "Payout" => Ok(ReferenceType::Payout),
            _ => Err(AppError::Database(format!("Invalid reference type: {}", s))),
        }
    }
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl BillingTransaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: Uuid,
        user_type: UserType,
        transaction_type: TransactionType,
        amount_cents: i64,
        currency: &str,
        status: TransactionStatus,
        description: String,
        reference_id: Uuid,
        reference_type: ReferenceType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            user_type,
            transaction_type,
            amount_cents,
            currency: currency.to_string(),
            status,
            description,
            reference_id,
            reference_type,
            metadata: None,
            created_at: Utc::now(),
        }
    }
}
