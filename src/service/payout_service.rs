use std::sync::Arc;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    crypto::AccountCipher,
    domain::*,
    error::{AppError, Result},
    gateway::BankTransfer,
    repository::{BankAccountRepository, BillingRepository, PaymentRepository, PayoutRepository, RefundRepository},
};

/// Turns captured payments into payouts against a verified bank account,
/// one payout per payment. Admins approve (triggering the transfer) or
/// reject each payout.
pub struct PayoutService {
    payouts: Arc<dyn PayoutRepository>,
    payments: Arc<dyn PaymentRepository>,
    refunds: Arc<dyn RefundRepository>,
    bank_accounts: Arc<dyn BankAccountRepository>,
    billing: Arc<dyn BillingRepository>,
    transfer: Arc<dyn BankTransfer>,
    cipher: AccountCipher,
    currency: String,
}

/// Reserved for future gateway transfer costs.
const TRANSFER_FEE_CENTS: i64 = 0;

impl PayoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        payouts: Arc<dyn PayoutRepository>,
        payments: Arc<dyn PaymentRepository>,
        refunds: Arc<dyn RefundRepository>,
        bank_accounts: Arc<dyn BankAccountRepository>,
        billing: Arc<dyn BillingRepository>,
        transfer: Arc<dyn BankTransfer>,
        cipher: AccountCipher,
        currency: String,
    ) -> Self {
        Self { payouts, payments, refunds, bank_accounts, billing, transfer, cipher, currency }
    }

    /// Capture-time hook: create a payout against the coach's default
    /// verified account, if they have one.
    pub async fn initiate_for_payment(&self, payment: &Payment) -> Result<Payout> {
        let account = self
            .bank_accounts
            .find_default_for_coach(payment.coach_id)
            .await?
            .ok_or_else(|| {
                AppError::Validation(format!("coach {} has no default bank account", payment.coach_id))
            })?;

        self.create(payment.coach_id, account.id, payment.id).await
    }

    pub async fn create(&self, coach_id: Uuid, bank_account_id: Uuid, payment_id: Uuid) -> Result<Payout> {
        let account = self
            .bank_accounts
            .find_by_id(bank_account_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("bank account {} not found", bank_account_id)))?;

        if account.coach_id != coach_id {
            return Err(AppError::Validation("bank account does not belong to this coach".to_string()));
        }
        if !account.is_verified {
            return Err(AppError::Validation(format!(
                "bank account {} is not verified",
                account.masked_account_number()
            )));
        }

        let payment = self
            .payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payment {} not found", payment_id)))?;

        if payment.coach_id != coach_id {
            return Err(AppError::Validation("payment does not belong to this coach".to_string()));
        }
        if !matches!(payment.status, PaymentStatus::Succeeded | PaymentStatus::PartiallyRefunded) {
            return Err(AppError::InvalidStateTransition { operation: "payout", status: payment.status });
        }

        if self.payouts.find_by_payment(payment_id).await?.is_some() {
            return Err(AppError::Conflict(format!("payment {} already has a payout", payment_id)));
        }

        // Refund penalties recorded against this payment come out of the
        // payable amount here, not out of funds already transferred.
        let penalties = self.refunds.sum_succeeded_penalties_for_payment(payment_id).await?;
        let amount_cents = (payment.coach_earnings_cents - penalties).max(0);
        if amount_cents == 0 {
            return Err(AppError::Validation(format!(
                "nothing payable for payment {} after refund penalties",
                payment_id
            )));
        }
        let net_amount_cents = amount_cents - TRANSFER_FEE_CENTS;

        let payout = self
            .payouts
            .create(Payout {
                id: Uuid::new_v4(),
                coach_id,
                bank_account_id,
                payment_id,
                amount_cents,
                net_amount_cents,
                status: PayoutStatus::Pending,
                rejection_reason: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await?;

        self.write_payout_ledger(&payout, TransactionStatus::Pending).await?;

        tracing::info!(
            payout_id = %payout.id,
            payment_id = %payment_id,
            amount_cents,
            "payout created, awaiting approval"
        );
        Ok(payout)
    }

    /// Admin approval: runs the bank transfer and settles the payout as
    /// completed or failed.
    pub async fn approve(&self, payout_id: Uuid) -> Result<Payout> {
        let payout = self.find(payout_id).await?;

        let won = self
            .payouts
            .update_status_guarded(payout.id, &[PayoutStatus::Pending], PayoutStatus::Processing, None)
            .await?;
        if !won {
            return Err(AppError::StateConflict(format!("payout {} is not awaiting approval", payout.id)));
        }

        let account = self
            .bank_accounts
            .find_by_id(payout.bank_account_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("bank account {} not found", payout.bank_account_id)))?;

        let account_number = self.cipher.decrypt(&account.account_number_enc)?;
        let reference = payout.id.to_string();

        match self
            .transfer
            .send(&account.routing_number, &account_number, payout.net_amount_cents, &reference)
            .await
        {
            Ok(receipt) => {
                self.payouts
                    .update_status_guarded(payout.id, &[PayoutStatus::Processing], PayoutStatus::Completed, None)
                    .await?;
                self.write_payout_ledger(&payout, TransactionStatus::Completed).await?;
                tracing::info!(payout_id = %payout.id, receipt = %receipt, "payout completed");
            }
            Err(err) => {
                self.payouts
                    .update_status_guarded(payout.id, &[PayoutStatus::Processing], PayoutStatus::Failed, None)
                    .await?;
                self.write_payout_ledger(&payout, TransactionStatus::Failed).await?;
                tracing::error!(payout_id = %payout.id, error = %err, "bank transfer failed");
                return Err(err);
            }
        }

        self.find(payout_id).await
    }

    /// Admin rejection. The pending ledger row is superseded by a failed
    /// one; the original row stays untouched.
    pub async fn reject(&self, payout_id: Uuid, reason: &str) -> Result<Payout> {
        let payout = self.find(payout_id).await?;

        let won = self
            .payouts
            .update_status_guarded(payout.id, &[PayoutStatus::Pending], PayoutStatus::Rejected, Some(reason))
            .await?;
        if !won {
            return Err(AppError::StateConflict(format!("payout {} is not awaiting approval", payout.id)));
        }

        self.write_payout_ledger(&payout, TransactionStatus::Failed).await?;

        tracing::info!(payout_id = %payout.id, reason, "payout rejected");
        self.find(payout_id).await
    }

    pub async fn find(&self, payout_id: Uuid) -> Result<Payout> {
        self.payouts
            .find_by_id(payout_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payout {} not found", payout_id)))
    }

    pub async fn list_for_coach(&self, coach_id: Uuid) -> Result<Vec<Payout>> {
        self.payouts.list_by_coach(coach_id).await
    }

    pub async fn list_pending(&self) -> Result<Vec<Payout>> {
        self.payouts.list_by_status(PayoutStatus::Pending).await
    }

    async fn write_payout_ledger(&self, payout: &Payout, status: TransactionStatus) -> Result<()> {
        self.billing
            .create(BillingTransaction::new(
                payout.coach_id,
                UserType::Coach,
                TransactionType::Payout,
                payout.net_amount_cents,
                &self.currency,
                status,
                format!("Payout for payment {}", payout.payment_id),
                payout.id,
                ReferenceType::Payout,
            ))
            .await
            .map_err(|e| AppError::LedgerWriteFailed(e.to_string()))?;
        Ok(())
    }
}
