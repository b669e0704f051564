pub mod rate;
pub mod payment;
pub mod refund;
pub mod billing;
pub mod bank_account;
pub mod payout;

pub use rate::*;
pub use payment::*;
pub use refund::*;
pub use billing::*;
pub use bank_account::*;
pub use payout::*;

/// A customer record on the processor side, mapped from a marketplace
/// client so repeat buyers reuse the same gateway customer object.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct GatewayCustomer {
    pub id: uuid::Uuid,
    pub client_id: uuid::Uuid,
    pub customer_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
