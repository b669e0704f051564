use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{Rate, UpdateRateRequest},
    error::{AppError, Result},
    repository::{payment_repository::parse_uuid, RateRepository},
};

#[derive(FromRow)]
struct RateRow {
    id: String,
    coach_id: String,
    session_type: String,
    duration_minutes: i64,
    rate_cents: i64,
    catalog_ref: Option<String>,
    is_active: bool,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const SELECT_COLUMNS: &str =
    "id, coach_id, session_type, duration_minutes, rate_cents, catalog_ref, is_active, created_at, updated_at";

pub struct SqliteRateRepository {
    pool: SqlitePool,
}

impl SqliteRateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_rate(row: RateRow) -> Result<Rate> {
        Ok(Rate {
            id: parse_uuid(&row.id)?,
            coach_id: parse_uuid(&row.coach_id)?,
            session_type: row.session_type,
            duration_minutes: row.duration_minutes,
            rate_cents: row.rate_cents,
            catalog_ref: row.catalog_ref,
            is_active: row.is_active,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }
}

#[async_trait]
impl RateRepository for SqliteRateRepository {
    async fn create(&self, rate: Rate) -> Result<Rate> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO rates (
                id, coach_id, session_type, duration_minutes, rate_cents,
                catalog_ref, is_active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(rate.id.to_string())
        .bind(rate.coach_id.to_string())
        .bind(&rate.session_type)
        .bind(rate.duration_minutes)
        .bind(rate.rate_cents)
        .bind(&rate.catalog_ref)
        .bind(rate.is_active)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(rate.id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve created rate".to_string()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Rate>> {
        let sql = format!("SELECT {} FROM rates WHERE id = ?", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, RateRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_rate).transpose()
    }

    async fn list_by_coach(&self, coach_id: Uuid) -> Result<Vec<Rate>> {
        let sql = format!(
            "SELECT {} FROM rates WHERE coach_id = ? ORDER BY created_at DESC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, RateRow>(&sql)
            .bind(coach_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_rate).collect()
    }

    async fn update(&self, id: Uuid, update: UpdateRateRequest) -> Result<Rate> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            UPDATE rates
            SET session_type = COALESCE(?, session_type),
                duration_minutes = COALESCE(?, duration_minutes),
                rate_cents = COALESCE(?, rate_cents),
                is_active = COALESCE(?, is_active),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&update.session_type)
        .bind(update.duration_minutes)
        .bind(update.rate_cents)
        .bind(update.is_active)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Rate not found".to_string()))
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<Rate> {
        let now = Utc::now().naive_utc();

        sqlx::query("UPDATE rates SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(now)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Rate not found".to_string()))
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM rates WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    async fn is_referenced(&self, id: Uuid) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM payments WHERE rate_id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(count > 0)
    }
}
