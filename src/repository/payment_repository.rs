use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{Payment, PaymentStatus},
    error::{AppError, Result},
    repository::PaymentRepository,
};

#[derive(FromRow)]
struct PaymentRow {
    id: String,
    client_id: String,
    coach_id: String,
    rate_id: Option<String>,
    gateway_payment_id: String,
    amount_cents: i64,
    platform_fee_cents: i64,
    coach_earnings_cents: i64,
    currency: String,
    status: String,
    failure_reason: Option<String>,
    paid_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const SELECT_COLUMNS: &str = "id, client_id, coach_id, rate_id, gateway_payment_id, amount_cents, \
     platform_fee_cents, coach_earnings_cents, currency, status, failure_reason, \
     paid_at, created_at, updated_at";

pub struct SqlitePaymentRepository {
    pool: SqlitePool,
}

impl SqlitePaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_payment(row: PaymentRow) -> Result<Payment> {
        Ok(Payment {
            id: parse_uuid(&row.id)?,
            client_id: parse_uuid(&row.client_id)?,
            coach_id: parse_uuid(&row.coach_id)?,
            rate_id: row.rate_id.as_deref().map(parse_uuid).transpose()?,
            gateway_payment_id: row.gateway_payment_id,
            amount_cents: row.amount_cents,
            platform_fee_cents: row.platform_fee_cents,
            coach_earnings_cents: row.coach_earnings_cents,
            currency: row.currency,
            status: row.status.parse()?,
            failure_reason: row.failure_reason,
            paid_at: row.paid_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| AppError::Database(e.to_string()))
}

/// Render a status list as a SQL IN-list. Statuses are trusted static
/// strings, never user input.
fn status_in_list(expected: &[PaymentStatus]) -> String {
    expected
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl PaymentRepository for SqlitePaymentRepository {
    async fn create(&self, payment: Payment) -> Result<Payment> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, client_id, coach_id, rate_id, gateway_payment_id,
                amount_cents, platform_fee_cents, coach_earnings_cents,
                currency, status, failure_reason, paid_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(payment.id.to_string())
        .bind(payment.client_id.to_string())
        .bind(payment.coach_id.to_string())
        .bind(payment.rate_id.map(|id| id.to_string()))
        .bind(&payment.gateway_payment_id)
        .bind(payment.amount_cents)
        .bind(payment.platform_fee_cents)
        .bind(payment.coach_earnings_cents)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(&payment.failure_reason)
        .bind(payment.paid_at.map(|dt| dt.naive_utc()))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(payment.id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve created payment".to_string()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>> {
        let sql = format!("SELECT {} FROM payments WHERE id = ?", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn find_by_gateway_id(&self, gateway_payment_id: &str) -> Result<Option<Payment>> {
        let sql = format!("SELECT {} FROM payments WHERE gateway_payment_id = ?", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(gateway_payment_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn list_by_client(&self, client_id: Uuid) -> Result<Vec<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE client_id = ? ORDER BY created_at DESC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(client_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }

    async fn list_by_coach(&self, coach_id: Uuid) -> Result<Vec<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE coach_id = ? ORDER BY created_at DESC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(coach_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }

    async fn update_status_guarded(
        &self,
        id: Uuid,
        expected: &[PaymentStatus],
        new_status: PaymentStatus,
        failure_reason: Option<&str>,
    ) -> Result<bool> {
        let now = Utc::now().naive_utc();
        let paid_at = if new_status == PaymentStatus::Succeeded { Some(now) } else { None };

        // Read-check-write compressed into one statement: the WHERE clause
        // re-checks the precondition, so a concurrent writer makes this a
        // no-op instead of a silent overwrite.
        let sql = format!(
            r#"
            UPDATE payments
            SET status = ?,
                failure_reason = COALESCE(?, failure_reason),
                paid_at = COALESCE(?, paid_at),
                updated_at = ?
            WHERE id = ? AND status IN ({})
            "#,
            status_in_list(expected)
        );

        let result = sqlx::query(&sql)
            .bind(new_status.as_str())
            .bind(failure_reason)
            .bind(paid_at)
            .bind(now)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
