use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{Refund, RefundStatus},
    error::{AppError, Result},
    repository::{payment_repository::parse_uuid, RefundRepository},
};

#[derive(FromRow)]
struct RefundRow {
    id: String,
    payment_id: String,
    gateway_refund_id: Option<String>,
    amount_cents: i64,
    reason: String,
    coach_penalty_cents: i64,
    platform_refund_cents: i64,
    status: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const SELECT_COLUMNS: &str = "id, payment_id, gateway_refund_id, amount_cents, reason, \
     coach_penalty_cents, platform_refund_cents, status, created_at, updated_at";

pub struct SqliteRefundRepository {
    pool: SqlitePool,
}

impl SqliteRefundRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_refund(row: RefundRow) -> Result<Refund> {
        Ok(Refund {
            id: parse_uuid(&row.id)?,
            payment_id: parse_uuid(&row.payment_id)?,
            gateway_refund_id: row.gateway_refund_id,
            amount_cents: row.amount_cents,
            reason: row.reason.parse()?,
            coach_penalty_cents: row.coach_penalty_cents,
            platform_refund_cents: row.platform_refund_cents,
            status: row.status.parse()?,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }
}

fn status_in_list(expected: &[RefundStatus]) -> String {
    expected
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl RefundRepository for SqliteRefundRepository {
    async fn create(&self, refund: Refund) -> Result<Refund> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO refunds (
                id, payment_id, gateway_refund_id, amount_cents, reason,
                coach_penalty_cents, platform_refund_cents, status,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(refund.id.to_string())
        .bind(refund.payment_id.to_string())
        .bind(&refund.gateway_refund_id)
        .bind(refund.amount_cents)
        .bind(refund.reason.as_str())
        .bind(refund.coach_penalty_cents)
        .bind(refund.platform_refund_cents)
        .bind(refund.status.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(refund.id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve created refund".to_string()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Refund>> {
        let sql = format!("SELECT {} FROM refunds WHERE id = ?", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, RefundRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_refund).transpose()
    }

    async fn find_by_gateway_id(&self, gateway_refund_id: &str) -> Result<Option<Refund>> {
        let sql = format!("SELECT {} FROM refunds WHERE gateway_refund_id = ?", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, RefundRow>(&sql)
            .bind(gateway_refund_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_refund).transpose()
    }

    async fn list_by_payment(&self, payment_id: Uuid) -> Result<Vec<Refund>> {
        let sql = format!(
            "SELECT {} FROM refunds WHERE payment_id = ? ORDER BY created_at ASC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, RefundRow>(&sql)
            .bind(payment_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_refund).collect()
    }

    async fn sum_succeeded_for_payment(&self, payment_id: Uuid) -> Result<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM refunds WHERE payment_id = ? AND status = 'Succeeded'",
        )
        .bind(payment_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(total)
    }

    async fn sum_succeeded_penalties_for_payment(&self, payment_id: Uuid) -> Result<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(coach_penalty_cents), 0) FROM refunds WHERE payment_id = ? AND status = 'Succeeded'",
        )
        .bind(payment_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(total)
    }

    async fn attach_gateway_refund(
        &self,
        id: Uuid,
        gateway_refund_id: &str,
        status: RefundStatus,
    ) -> Result<bool> {
        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            UPDATE refunds
            SET gateway_refund_id = ?, status = ?, updated_at = ?
            WHERE id = ? AND status = 'Pending'
            "#,
        )
        .bind(gateway_refund_id)
        .bind(status.as_str())
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_status_guarded(
        &self,
        id: Uuid,
        expected: &[RefundStatus],
        new_status: RefundStatus,
    ) -> Result<bool> {
        let now = Utc::now().naive_utc();
        let sql = format!(
            "UPDATE refunds SET status = ?, updated_at = ? WHERE id = ? AND status IN ({})",
            status_in_list(expected)
        );

        let result = sqlx::query(&sql)
            .bind(new_status.as_str())
            .bind(now)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
