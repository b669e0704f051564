use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

/// One transfer of a coach's earnings from a specific captured payment to
/// their verified bank account. Payouts are 1:1 with payments; there is no
/// pooled balance.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payout {
    pub id: Uuid,
    pub coach_id: Uuid,
    pub bank_account_id: Uuid,
    pub payment_id: Uuid,
    /// Earnings payable after refund penalties are netted out.
    pub amount_cents: i64,
    /// Amount after transfer fees (currently none are charged).
    pub net_amount_cents: i64,
    pub status: PayoutStatus,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "TEXT")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Rejected,
}

impl PayoutStatus {
    pub fn can_transition_to(self, next: PayoutStatus) -> bool {
        use PayoutStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Rejected) | (Processing, Completed) | (Processing, Failed)
        )
    }

    /// A payout in one of these states pins its bank account against
    /// deletion.
    pub fn blocks_account_deletion(self) -> bool {
        matches!(self, PayoutStatus::Pending | PayoutStatus::Processing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PayoutStatus::Pending => "Pending",
            PayoutStatus::Processing => "Processing",
            PayoutStatus::Completed => "Completed",
            PayoutStatus::Failed => "Failed",
            PayoutStatus::Rejected => "Rejected",
        }
    }
}

impl Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PayoutStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(PayoutStatus::Pending),
            "Processing" => Ok(PayoutStatus::Processing),
            "Completed" => Ok(PayoutStatus::Completed),
            "Failed" => Ok(PayoutStatus::Failed),
            "Rejected" => Ok(PayoutStatus::Rejected),
            _ => Err(AppError::Database(format!("Invalid payout status: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settled_payouts_are_final() {
        use PayoutStatus::*;
        for from in [Completed, Failed, Rejected] {
            for to in [Pending, Processing, Completed, Failed, Rejected] {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be illegal");
            }
        }
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Rejected));
        assert!(!Pending.can_transition_to(Completed), "completion requires a transfer attempt");
    }

    #[test]
    fn in_flight_payouts_pin_their_bank_account() {
        use PayoutStatus::*;
        assert!(Pending.blocks_account_deletion());
        assert!(Processing.blocks_account_deletion());
        for settled in [Completed, Failed, Rejected] {
            assert!(!settled.blocks_account_deletion());
        }
    }
}
