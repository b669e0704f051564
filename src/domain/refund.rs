use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

/// One refund against a captured payment. Created `Pending` before the
/// gateway call; finalized either synchronously from the gateway response or
/// later by webhook reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Refund {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub gateway_refund_id: Option<String>,
    pub amount_cents: i64,
    pub reason: RefundReason,
    pub coach_penalty_cents: i64,
    pub platform_refund_cents: i64,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "TEXT")]
pub enum RefundStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
}

impl RefundStatus {
    /// Refunds only move forward: Pending -> Processing -> Succeeded/Failed.
    pub fn can_transition_to(self, next: RefundStatus) -> bool {
        use RefundStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Succeeded) | (Pending, Failed) | (Processing, Succeeded) | (Processing, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RefundStatus::Pending => "Pending",
            RefundStatus::Processing => "Processing",
            RefundStatus::Succeeded => "Succeeded",
            RefundStatus::Failed => "Failed",
        }
    }
}

impl Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RefundStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(RefundStatus::Pending),
            "Processing" => Ok(RefundStatus::Processing),
            "Succeeded" => Ok(RefundStatus::Succeeded),
            "Failed" => Ok(RefundStatus::Failed),
            _ => Err(AppError::Database(format!("Invalid refund status: {}", s))),
        }
    }
}

/// Why a refund was issued. The reason drives who absorbs the cost.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "TEXT")]
#[serde(rename_all = "kebab-case")]
pub enum RefundReason {
    CustomerRequested,
    CoachRequested,
    AdminInitiated,
    AutoCancellation,
    Duplicate,
    Fraudulent,
}

impl RefundReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RefundReason::CustomerRequested => "customer-requested",
            RefundReason::CoachRequested => "coach-requested",
            RefundReason::AdminInitiated => "admin-initiated",
            RefundReason::AutoCancellation => "auto-cancellation",
            RefundReason::Duplicate => "duplicate",
            RefundReason::Fraudulent => "fraudulent",
        }
    }
}

impl Display for RefundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RefundReason {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer-requested" => Ok(RefundReason::CustomerRequested),
            "coach-requested" => Ok(RefundReason::CoachRequested),
            "admin-initiated" => Ok(RefundReason::AdminInitiated),
            "auto-cancellation" => Ok(RefundReason::AutoCancellation),
            "duplicate" => Ok(RefundReason::Duplicate),
            "fraudulent" => Ok(RefundReason::Fraudulent),
            _ => Err(AppError::Database(format!("Invalid refund reason: {}", s))),
        }
    }
}

/// How a refund's cost is divided between the coach and the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundSplit {
    pub coach_penalty_cents: i64,
    pub platform_refund_cents: i64,
}

impl RefundSplit {
    /// Distribution policy:
    /// - coach-requested: the coach absorbs the cost up to their earnings,
    ///   the platform covers the rest.
    /// - admin-initiated / auto-cancellation: the platform absorbs 100%.
    /// - everything else (customer-requested, duplicate, fraudulent):
    ///   proportional to the original earnings split, coach share floored.
    pub fn distribute(
        reason: RefundReason,
        refund_cents: i64,
        coach_earnings_cents: i64,
        platform_fee_cents: i64,
    ) -> RefundSplit {
        let coach_penalty_cents = match reason {
            RefundReason::CoachRequested => refund_cents.min(coach_earnings_cents),
            RefundReason::AdminInitiated | RefundReason::AutoCancellation => 0,
            _ => {
                let total = coach_earnings_cents + platform_fee_cents;
                if total == 0 {
                    0
                } else {
                    refund_cents * coach_earnings_cents / total
                }
            }
        };
        RefundSplit {
            coach_penalty_cents,
            platform_refund_cents: refund_cents - coach_penalty_cents,
        }
    }
}

/// Input to the refund flow. `amount_cents: None` refunds the full
/// remaining balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub payment_id: Uuid,
    pub amount_cents: Option<i64>,
    pub reason: RefundReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference payment: 10_000 cents total, 15% platform fee.
    const EARNINGS: i64 = 8_500;
    const FEE: i64 = 1_500;

    #[test]
    fn customer_requested_full_refund_splits_proportionally() {
        let split = RefundSplit::distribute(RefundReason::CustomerRequested, 10_000, EARNINGS, FEE);
        assert_eq!(split.coach_penalty_cents, 8_500);
        assert_eq!(split.platform_refund_cents, 1_500);
    }

    #[test]
    fn coach_requested_partial_refund_comes_out_of_earnings() {
        let split = RefundSplit::distribute(RefundReason::CoachRequested, 5_000, EARNINGS, FEE);
        assert_eq!(split.coach_penalty_cents, 5_000);
        assert_eq!(split.platform_refund_cents, 0);
    }

    #[test]
    fn coach_requested_refund_is_capped_at_earnings() {
        let split = RefundSplit::distribute(RefundReason::CoachRequested, 10_000, EARNINGS, FEE);
        assert_eq!(split.coach_penalty_cents, 8_500);
        assert_eq!(split.platform_refund_cents, 1_500);
    }

    #[test]
    fn admin_initiated_refund_is_on_the_platform() {
        let split = RefundSplit::distribute(RefundReason::AdminInitiated, 10_000, EARNINGS, FEE);
        assert_eq!(split.coach_penalty_cents, 0);
        assert_eq!(split.platform_refund_cents, 10_000);
    }

    #[test]
    fn auto_cancellation_is_on_the_platform() {
        let split = RefundSplit::distribute(RefundReason::AutoCancellation, 3_333, EARNINGS, FEE);
        assert_eq!(split.coach_penalty_cents, 0);
        assert_eq!(split.platform_refund_cents, 3_333);
    }

    #[test]
    fn proportional_split_floors_the_coach_share() {
        // 1000 * 8500 / 10000 = 850 exactly; use an awkward amount instead.
        let split = RefundSplit::distribute(RefundReason::Duplicate, 999, EARNINGS, FEE);
        assert_eq!(split.coach_penalty_cents, 999 * EARNINGS / (EARNINGS + FEE));
        assert_eq!(split.coach_penalty_cents + split.platform_refund_cents, 999);
    }

    #[test]
    fn split_always_sums_to_refund_amount() {
        for reason in [
            RefundReason::CustomerRequested,
            RefundReason::CoachRequested,
            RefundReason::AdminInitiated,
            RefundReason::AutoCancellation,
            RefundReason::Duplicate,
            RefundReason::Fraudulent,
        ] {
            for amount in [1, 37, 4_999, 10_000] {
                let split = RefundSplit::distribute(reason, amount, EARNINGS, FEE);
                assert_eq!(
                    split.coach_penalty_cents + split.platform_refund_cents,
                    amount,
                    "split must conserve the refund amount for {reason}"
                );
                assert!(split.coach_penalty_cents >= 0);
                assert!(split.platform_refund_cents >= 0);
            }
        }
    }

    #[test]
    fn zero_value_payment_penalizes_nobody() {
        let split = RefundSplit::distribute(RefundReason::CustomerRequested, 0, 0, 0);
        assert_eq!(split.coach_penalty_cents, 0);
        assert_eq!(split.platform_refund_cents, 0);
    }
}
