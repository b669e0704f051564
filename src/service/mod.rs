pub mod payment_service;
pub mod refund_service;
pub mod payout_service;
pub mod bank_account_service;
pub mod rate_service;
pub mod billing_service;
pub mod reconciliation_service;

use std::sync::Arc;
use sqlx::SqlitePool;

use crate::config::Settings;
use crate::crypto::AccountCipher;
use crate::error::Result;
use crate::gateway::{BankTransfer, CatalogAdapter, PaymentGateway};
use crate::repository::*;

pub use bank_account_service::BankAccountService;
pub use billing_service::{BillingService, CoachEarningsSummary, PlatformRevenueSummary};
pub use payment_service::PaymentService;
pub use payout_service::PayoutService;
pub use rate_service::RateService;
pub use reconciliation_service::ReconciliationService;
pub use refund_service::RefundService;

/// Wires repositories, ports and services together over one pool. The
/// gateway, transfer rail and catalog adapter are injected so callers (and
/// tests) choose the implementations.
pub struct ServiceContext {
    pub rate_service: Arc<RateService>,
    pub payment_service: Arc<PaymentService>,
    pub refund_service: Arc<RefundService>,
    pub payout_service: Arc<PayoutService>,
    pub bank_account_service: Arc<BankAccountService>,
    pub billing_service: Arc<BillingService>,
    pub reconciliation_service: Arc<ReconciliationService>,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    pub fn new(
        db_pool: SqlitePool,
        settings: &Settings,
        gateway: Arc<dyn PaymentGateway>,
        transfer: Arc<dyn BankTransfer>,
        catalog: Arc<dyn CatalogAdapter>,
    ) -> Result<Self> {
        let cipher = if settings.security.account_cipher_key.is_empty() {
            // No key configured: run with an ephemeral key. Fine for dev
            // and tests; persisted ciphertexts will not survive a restart.
            tracing::warn!("no account cipher key configured; using an ephemeral key");
            AccountCipher::from_base64_key(&AccountCipher::generate_key())?
        } else {
            AccountCipher::from_base64_key(&settings.security.account_cipher_key)?
        };

        let rate_repo: Arc<dyn RateRepository> = Arc::new(SqliteRateRepository::new(db_pool.clone()));
        let payment_repo: Arc<dyn PaymentRepository> =
            Arc::new(SqlitePaymentRepository::new(db_pool.clone()));
        let refund_repo: Arc<dyn RefundRepository> =
            Arc::new(SqliteRefundRepository::new(db_pool.clone()));
        let billing_repo: Arc<dyn BillingRepository> =
            Arc::new(SqliteBillingRepository::new(db_pool.clone()));
        let bank_account_repo: Arc<dyn BankAccountRepository> =
            Arc::new(SqliteBankAccountRepository::new(db_pool.clone()));
        let payout_repo: Arc<dyn PayoutRepository> =
            Arc::new(SqlitePayoutRepository::new(db_pool.clone()));
        let customer_repo: Arc<dyn GatewayCustomerRepository> =
            Arc::new(SqliteGatewayCustomerRepository::new(db_pool.clone()));

        let payout_service = Arc::new(PayoutService::new(
            payout_repo.clone(),
            payment_repo.clone(),
            refund_repo.clone(),
            bank_account_repo.clone(),
            billing_repo.clone(),
            transfer,
            cipher.clone(),
            settings.platform.currency.clone(),
        ));

        let payment_service = Arc::new(PaymentService::new(
            payment_repo.clone(),
            rate_repo.clone(),
            customer_repo,
            billing_repo.clone(),
            gateway.clone(),
            payout_service.clone(),
            settings.platform.fee_bps,
            settings.platform.currency.clone(),
        ));

        let refund_service = Arc::new(RefundService::new(
            payment_repo.clone(),
            refund_repo.clone(),
            billing_repo.clone(),
            gateway,
        ));

        let reconciliation_service = Arc::new(ReconciliationService::new(
            payment_repo,
            refund_repo,
            payment_service.clone(),
            refund_service.clone(),
            settings.gateway.webhook_secret.clone(),
        ));

        let bank_account_service =
            Arc::new(BankAccountService::new(bank_account_repo, payout_repo, cipher));
        let rate_service = Arc::new(RateService::new(rate_repo, catalog));
        let billing_service = Arc::new(BillingService::new(billing_repo));

        Ok(Self {
            rate_service,
            payment_service,
            refund_service,
            payout_service,
            bank_account_service,
            billing_service,
            reconciliation_service,
            db_pool,
        })
    }
}
