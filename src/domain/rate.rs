use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A priced, versioned offering a coach sells: one session type at one
/// duration for one price. Rates are soft-deactivated rather than deleted
/// while any payment still references them.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Rate {
    pub id: Uuid,
    pub coach_id: Uuid,
    pub session_type: String,
    pub duration_minutes: i64,
    pub rate_cents: i64,
    /// Catalog object reference on the processor side, when one was
    /// published through the catalog adapter.
    pub catalog_ref: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateRateRequest {
    pub coach_id: Uuid,
    #[validate(length(min = 1, max = 100))]
    pub session_type: String,
    #[validate(range(min = 15, max = 480))]
    pub duration_minutes: i64,
    #[validate(range(min = 100, max = 100_000_000))]
    pub rate_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateRateRequest {
    pub session_type: Option<String>,
    pub duration_minutes: Option<i64>,
    pub rate_cents: Option<i64>,
    pub is_active: Option<bool>,
}
