use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{Payout, PayoutStatus},
    error::{AppError, Result},
    repository::{payment_repository::parse_uuid, PayoutRepository},
};

#[derive(FromRow)]
struct PayoutRow {
    id: String,
    coach_id: String,
    bank_account_id: String,
    payment_id: String,
    amount_cents: i64,
    net_amount_cents: i64,
    status: String,
    rejection_reason: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const SELECT_COLUMNS: &str = "id, coach_id, bank_account_id, payment_id, amount_cents, \
     net_amount_cents, status, rejection_reason, created_at, updated_at";

pub struct SqlitePayoutRepository {
    pool: SqlitePool,
}

impl SqlitePayoutRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_payout(row: PayoutRow) -> Result<Payout> {
        Ok(Payout {
            id: parse_uuid(&row.id)?,
            coach_id: parse_uuid(&row.coach_id)?,
            bank_account_id: parse_uuid(&row.bank_account_id)?,
            payment_id: parse_uuid(&row.payment_id)?,
            amount_cents: row.amount_cents,
            net_amount_cents: row.net_amount_cents,
            status: row.status.parse()?,
            rejection_reason: row.rejection_reason,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }
}

fn status_in_list(expected: &[PayoutStatus]) -> String {
    expected
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl PayoutRepository for SqlitePayoutRepository {
    async fn create(&self, payout: Payout) -> Result<Payout> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO payouts (
                id, coach_id, bank_account_id, payment_id, amount_cents,
                net_amount_cents, status, rejection_reason, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(payout.id.to_string())
        .bind(payout.coach_id.to_string())
        .bind(payout.bank_account_id.to_string())
        .bind(payout.payment_id.to_string())
        .bind(payout.amount_cents)
        .bind(payout.net_amount_cents)
        .bind(payout.status.as_str())
        .bind(&payout.rejection_reason)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            // The UNIQUE constraint on payment_id enforces 1:1 with the
            // captured payment.
            if e.to_string().contains("UNIQUE") {
                AppError::Conflict("A payout already exists for this payment".to_string())
            } else {
                AppError::Database(e.to_string())
            }
        })?;

        self.find_by_id(payout.id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve created payout".to_string()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payout>> {
        let sql = format!("SELECT {} FROM payouts WHERE id = ?", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, PayoutRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_payout).transpose()
    }

    async fn find_by_payment(&self, payment_id: Uuid) -> Result<Option<Payout>> {
        let sql = format!("SELECT {} FROM payouts WHERE payment_id = ?", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, PayoutRow>(&sql)
            .bind(payment_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_payout).transpose()
    }

    async fn list_by_coach(&self, coach_id: Uuid) -> Result<Vec<Payout>> {
        let sql = format!(
            "SELECT {} FROM payouts WHERE coach_id = ? ORDER BY created_at DESC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, PayoutRow>(&sql)
            .bind(coach_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_payout).collect()
    }

    async fn list_by_status(&self, status: PayoutStatus) -> Result<Vec<Payout>> {
        let sql = format!(
            "SELECT {} FROM payouts WHERE status = ? ORDER BY created_at ASC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, PayoutRow>(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_payout).collect()
    }

    async fn exists_blocking_for_account(&self, bank_account_id: Uuid) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM payouts WHERE bank_account_id = ? AND status IN ('Pending', 'Processing')",
        )
        .bind(bank_account_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(count > 0)
    }

    async fn update_status_guarded(
        &self,
        id: Uuid,
        expected: &[PayoutStatus],
        new_status: PayoutStatus,
        rejection_reason: Option<&str>,
    ) -> Result<bool> {
        let now = Utc::now().naive_utc();
        let sql = format!(
            r#"
            UPDATE payouts
            SET status = ?, rejection_reason = COALESCE(?, rejection_reason), updated_at = ?
            WHERE id = ? AND status IN ({})
            "#,
            status_in_list(expected)
        );

        let result = sqlx::query(&sql)
            .bind(new_status.as_str())
            .bind(rejection_reason)
            .bind(now)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
