use std::sync::Arc;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    domain::*,
    error::Result,
    repository::BillingRepository,
};

/// Read-side reporting over the ledger. Dashboards and statements are
/// derived from `billing_transactions` alone, never from the mutable
/// payment/refund/payout rows.
pub struct BillingService {
    billing: Arc<dyn BillingRepository>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoachEarningsSummary {
    pub coach_id: Uuid,
    pub total_earned_cents: i64,
    pub total_penalty_cents: i64,
    pub total_paid_out_cents: i64,
    /// Earned, minus penalties, minus what has already been transferred.
    pub outstanding_balance_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformRevenueSummary {
    pub fees_collected_cents: i64,
}

impl BillingService {
    pub fn new(billing: Arc<dyn BillingRepository>) -> Self {
        Self { billing }
    }

    pub async fn history_for_user(
        &self,
        user_id: Uuid,
        user_type: UserType,
    ) -> Result<Vec<BillingTransaction>> {
        self.billing.list_for_user(user_id, user_type).await
    }

    pub async fn history_for_reference(
        &self,
        reference_id: Uuid,
        reference_type: ReferenceType,
    ) -> Result<Vec<BillingTransaction>> {
        self.billing.list_for_reference(reference_id, reference_type).await
    }

    pub async fn coach_earnings_summary(&self, coach_id: Uuid) -> Result<CoachEarningsSummary> {
        let total_earned_cents = self
            .billing
            .sum_for_user(coach_id, UserType::Coach, TransactionType::Payment, TransactionStatus::Completed)
            .await?;
        let total_penalty_cents = self
            .billing
            .sum_for_user(coach_id, UserType::Coach, TransactionType::Fee, TransactionStatus::Completed)
            .await?;
        let total_paid_out_cents = self
            .billing
            .sum_for_user(coach_id, UserType::Coach, TransactionType::Payout, TransactionStatus::Completed)
            .await?;

        Ok(CoachEarningsSummary {
            coach_id,
            total_earned_cents,
            total_penalty_cents,
            total_paid_out_cents,
            outstanding_balance_cents: total_earned_cents - total_penalty_cents - total_paid_out_cents,
        })
    }

    pub async fn platform_revenue_summary(&self) -> Result<PlatformRevenueSummary> {
        let fees_collected_cents = self
            .billing
            .sum_for_user(PLATFORM_ACCOUNT, UserType::Platform, TransactionType::Fee, TransactionStatus::Completed)
            .await?;

        Ok(PlatformRevenueSummary { fees_collected_cents })
    }
}
