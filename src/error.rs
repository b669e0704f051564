use thiserror::Error;

use crate::domain::PaymentStatus;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid rate: {0}")]
    InvalidRate(String),

    #[error("Rate does not belong to the stated coach")]
    RateOwnershipMismatch,

    #[error("Illegal {operation} on payment in status {status}")]
    InvalidStateTransition {
        operation: &'static str,
        status: PaymentStatus,
    },

    /// The stored status changed between our read and our guarded write.
    /// A concurrent operation (often a webhook) won the race.
    #[error("State conflict: {0}")]
    StateConflict(String),

    #[error("Refund of {requested} cents exceeds remaining balance of {available} cents")]
    RefundExceedsBalance { requested: i64, available: i64 },

    #[error("Gateway error during {operation}: {message}")]
    Gateway { operation: &'static str, message: String },

    /// The gateway call was sent but no response was observed. The outcome
    /// is unknown; callers must reconcile against the gateway rather than
    /// retry blindly.
    #[error("Gateway timeout during {operation}; outcome unknown, reconciliation required")]
    GatewayTimeout { operation: &'static str },

    /// Local persistence failed after a gateway side effect already
    /// occurred. Compensation has been attempted where possible.
    #[error("Ledger write failed: {0}")]
    LedgerWriteFailed(String),

    #[error("Reconciliation skipped: {0}")]
    ReconciliationSkipped(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn gateway(operation: &'static str, message: impl Into<String>) -> Self {
        AppError::Gateway { operation, message: message.into() }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}
