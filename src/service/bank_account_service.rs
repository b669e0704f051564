use std::sync::Arc;
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    crypto::AccountCipher,
    domain::{bank_account::is_valid_routing_number, BankAccount, RegisterBankAccountRequest},
    error::{AppError, Result},
    repository::{BankAccountRepository, PayoutRepository},
};

/// Registry of coach payout destinations. Account numbers are encrypted
/// before they reach the store and only ever surfaced masked.
pub struct BankAccountService {
    bank_accounts: Arc<dyn BankAccountRepository>,
    payouts: Arc<dyn PayoutRepository>,
    cipher: AccountCipher,
}

impl BankAccountService {
    pub fn new(
        bank_accounts: Arc<dyn BankAccountRepository>,
        payouts: Arc<dyn PayoutRepository>,
        cipher: AccountCipher,
    ) -> Self {
        Self { bank_accounts, payouts, cipher }
    }

    pub async fn register(&self, request: RegisterBankAccountRequest) -> Result<BankAccount> {
        request
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        if !is_valid_routing_number(&request.routing_number) {
            return Err(AppError::Validation("routing number failed checksum validation".to_string()));
        }
        if !request.account_number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AppError::Validation("account number must be numeric".to_string()));
        }

        let account_number_enc = self.cipher.encrypt(&request.account_number)?;
        let account_last4 = request.account_number[request.account_number.len() - 4..].to_string();

        // The first account a coach registers becomes their default.
        let is_default = self.bank_accounts.list_by_coach(request.coach_id).await?.is_empty();

        let account = self
            .bank_accounts
            .create(BankAccount {
                id: Uuid::new_v4(),
                coach_id: request.coach_id,
                routing_number: request.routing_number,
                account_number_enc,
                account_last4,
                account_holder: request.account_holder,
                is_verified: false,
                is_default,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await?;

        tracing::info!(
            bank_account_id = %account.id,
            coach_id = %account.coach_id,
            account = %account.masked_account_number(),
            "bank account registered, pending verification"
        );
        Ok(account)
    }

    /// Mark an account as verified. Verification itself (micro-deposits,
    /// instant verification) happens outside the engine; this records the
    /// outcome and unlocks the account for payouts.
    pub async fn verify(&self, bank_account_id: Uuid) -> Result<BankAccount> {
        let account = self.find(bank_account_id).await?;
        if account.is_verified {
            return Ok(account);
        }
        let verified = self.bank_accounts.set_verified(bank_account_id).await?;
        tracing::info!(bank_account_id = %verified.id, "bank account verified");
        Ok(verified)
    }

    pub async fn set_default(&self, bank_account_id: Uuid) -> Result<BankAccount> {
        let account = self.find(bank_account_id).await?;
        self.bank_accounts.set_default(account.id, account.coach_id).await
    }

    /// Delete an account unless a pending or processing payout still
    /// depends on it.
    pub async fn remove(&self, bank_account_id: Uuid) -> Result<()> {
        let account = self.find(bank_account_id).await?;

        if self.payouts.exists_blocking_for_account(account.id).await? {
            return Err(AppError::Conflict(
                "bank account has payouts in flight and cannot be deleted".to_string(),
            ));
        }

        self.bank_accounts.delete(account.id).await?;
        tracing::info!(bank_account_id = %account.id, "bank account deleted");
        Ok(())
    }

    pub async fn find(&self, bank_account_id: Uuid) -> Result<BankAccount> {
        self.bank_accounts
            .find_by_id(bank_account_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("bank account {} not found", bank_account_id)))
    }

    pub async fn list_for_coach(&self, coach_id: Uuid) -> Result<Vec<BankAccount>> {
        self.bank_accounts.list_by_coach(coach_id).await
    }
}
