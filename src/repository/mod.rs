use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::*;
use crate::error::Result;

pub mod rate_repository;
pub mod payment_repository;
pub mod refund_repository;
pub mod billing_repository;
pub mod bank_account_repository;
pub mod payout_repository;
pub mod customer_repository;

pub use rate_repository::SqliteRateRepository;
pub use payment_repository::SqlitePaymentRepository;
pub use refund_repository::SqliteRefundRepository;
pub use billing_repository::SqliteBillingRepository;
pub use bank_account_repository::SqliteBankAccountRepository;
pub use payout_repository::SqlitePayoutRepository;
pub use customer_repository::SqliteGatewayCustomerRepository;

#[async_trait]
pub trait RateRepository: Send + Sync {
    async fn create(&self, rate: Rate) -> Result<Rate>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Rate>>;
    async fn list_by_coach(&self, coach_id: Uuid) -> Result<Vec<Rate>>;
    async fn update(&self, id: Uuid, update: UpdateRateRequest) -> Result<Rate>;
    async fn set_active(&self, id: Uuid, active: bool) -> Result<Rate>;
    async fn delete(&self, id: Uuid) -> Result<()>;
    /// Whether any payment still references this rate.
    async fn is_referenced(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create(&self, payment: Payment) -> Result<Payment>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>>;
    async fn find_by_gateway_id(&self, gateway_payment_id: &str) -> Result<Option<Payment>>;
    async fn list_by_client(&self, client_id: Uuid) -> Result<Vec<Payment>>;
    async fn list_by_coach(&self, coach_id: Uuid) -> Result<Vec<Payment>>;
    /// Optimistic status write: applies only while the stored status is one
    /// of `expected`, and reports whether this caller won the race. Sets
    /// `paid_at` when moving to `Succeeded`.
    async fn update_status_guarded(
        &self,
        id: Uuid,
        expected: &[PaymentStatus],
        new_status: PaymentStatus,
        failure_reason: Option<&str>,
    ) -> Result<bool>;
}

#[async_trait]
pub trait RefundRepository: Send + Sync {
    async fn create(&self, refund: Refund) -> Result<Refund>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Refund>>;
    async fn find_by_gateway_id(&self, gateway_refund_id: &str) -> Result<Option<Refund>>;
    async fn list_by_payment(&self, payment_id: Uuid) -> Result<Vec<Refund>>;
    /// Total already refunded for the payment (succeeded refunds only).
    async fn sum_succeeded_for_payment(&self, payment_id: Uuid) -> Result<i64>;
    /// Total coach penalties from succeeded refunds for the payment.
    async fn sum_succeeded_penalties_for_payment(&self, payment_id: Uuid) -> Result<i64>;
    /// Record the gateway's acceptance of a pending refund.
    async fn attach_gateway_refund(
        &self,
        id: Uuid,
        gateway_refund_id: &str,
        status: RefundStatus,
    ) -> Result<bool>;
    async fn update_status_guarded(
        &self,
        id: Uuid,
        expected: &[RefundStatus],
        new_status: RefundStatus,
    ) -> Result<bool>;
}

/// The ledger is append-only: this trait exposes no update or delete, and
/// the SQLite implementation contains no UPDATE statement. A correction is
/// a new row for the same reference; readers take the latest.
#[async_trait]
pub trait BillingRepository: Send + Sync {
    async fn create(&self, transaction: BillingTransaction) -> Result<BillingTransaction>;
    async fn list_for_user(&self, user_id: Uuid, user_type: UserType) -> Result<Vec<BillingTransaction>>;
    async fn list_for_reference(
        &self,
        reference_id: Uuid,
        reference_type: ReferenceType,
    ) -> Result<Vec<BillingTransaction>>;
    async fn latest_for_reference(
        &self,
        reference_id: Uuid,
        reference_type: ReferenceType,
        transaction_type: TransactionType,
    ) -> Result<Option<BillingTransaction>>;
    /// Sum of ledger rows for a user, filtered by type and status.
    async fn sum_for_user(
        &self,
        user_id: Uuid,
        user_type: UserType,
        transaction_type: TransactionType,
        status: TransactionStatus,
    ) -> Result<i64>;
}

#[async_trait]
pub trait BankAccountRepository: Send + Sync {
    async fn create(&self, account: BankAccount) -> Result<BankAccount>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<BankAccount>>;
    async fn list_by_coach(&self, coach_id: Uuid) -> Result<Vec<BankAccount>>;
    async fn find_default_for_coach(&self, coach_id: Uuid) -> Result<Option<BankAccount>>;
    async fn set_verified(&self, id: Uuid) -> Result<BankAccount>;
    /// Make this account the coach's default, clearing any previous default
    /// in the same transaction.
    async fn set_default(&self, id: Uuid, coach_id: Uuid) -> Result<BankAccount>;
    async fn delete(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait PayoutRepository: Send + Sync {
    async fn create(&self, payout: Payout) -> Result<Payout>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payout>>;
    async fn find_by_payment(&self, payment_id: Uuid) -> Result<Option<Payout>>;
    async fn list_by_coach(&self, coach_id: Uuid) -> Result<Vec<Payout>>;
    async fn list_by_status(&self, status: PayoutStatus) -> Result<Vec<Payout>>;
    /// Whether the bank account is pinned by a pending/processing payout.
    async fn exists_blocking_for_account(&self, bank_account_id: Uuid) -> Result<bool>;
    async fn update_status_guarded(
        &self,
        id: Uuid,
        expected: &[PayoutStatus],
        new_status: PayoutStatus,
        rejection_reason: Option<&str>,
    ) -> Result<bool>;
}

#[async_trait]
pub trait GatewayCustomerRepository: Send + Sync {
    async fn find_by_client(&self, client_id: Uuid) -> Result<Option<GatewayCustomer>>;
    async fn create(&self, client_id: Uuid, customer_id: &str) -> Result<GatewayCustomer>;
}
