use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::BankAccount,
    error::{AppError, Result},
    repository::{payment_repository::parse_uuid, BankAccountRepository},
};

#[derive(FromRow)]
struct BankAccountRow {
    id: String,
    coach_id: String,
    routing_number: String,
    account_number_enc: String,
    account_last4: String,
    account_holder: String,
    is_verified: bool,
    is_default: bool,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const SELECT_COLUMNS: &str = "id, coach_id, routing_number, account_number_enc, account_last4, \
     account_holder, is_verified, is_default, created_at, updated_at";

pub struct SqliteBankAccountRepository {
    pool: SqlitePool,
}

impl SqliteBankAccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_account(row: BankAccountRow) -> Result<BankAccount> {
        Ok(BankAccount {
            id: parse_uuid(&row.id)?,
            coach_id: parse_uuid(&row.coach_id)?,
            routing_number: row.routing_number,
            account_number_enc: row.account_number_enc,
            account_last4: row.account_last4,
            account_holder: row.account_holder,
            is_verified: row.is_verified,
            is_default: row.is_default,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }
}

#[async_trait]
impl BankAccountRepository for SqliteBankAccountRepository {
    async fn create(&self, account: BankAccount) -> Result<BankAccount> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO bank_accounts (
                id, coach_id, routing_number, account_number_enc, account_last4,
                account_holder, is_verified, is_default, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(account.coach_id.to_string())
        .bind(&account.routing_number)
        .bind(&account.account_number_enc)
        .bind(&account.account_last4)
        .bind(&account.account_holder)
        .bind(account.is_verified)
        .bind(account.is_default)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(account.id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve created bank account".to_string()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<BankAccount>> {
        let sql = format!("SELECT {} FROM bank_accounts WHERE id = ?", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, BankAccountRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_account).transpose()
    }

    async fn list_by_coach(&self, coach_id: Uuid) -> Result<Vec<BankAccount>> {
        let sql = format!(
            "SELECT {} FROM bank_accounts WHERE coach_id = ? ORDER BY created_at DESC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, BankAccountRow>(&sql)
            .bind(coach_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_account).collect()
    }

    async fn find_default_for_coach(&self, coach_id: Uuid) -> Result<Option<BankAccount>> {
        let sql = format!(
            "SELECT {} FROM bank_accounts WHERE coach_id = ? AND is_default = 1",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, BankAccountRow>(&sql)
            .bind(coach_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_account).transpose()
    }

    async fn set_verified(&self, id: Uuid) -> Result<BankAccount> {
        let now = Utc::now().naive_utc();

        sqlx::query("UPDATE bank_accounts SET is_verified = 1, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Bank account not found".to_string()))
    }

    async fn set_default(&self, id: Uuid, coach_id: Uuid) -> Result<BankAccount> {
        let now = Utc::now().naive_utc();

        // Clearing and setting must be atomic so two defaults can never
        // coexist, even briefly.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        sqlx::query("UPDATE bank_accounts SET is_default = 0, updated_at = ? WHERE coach_id = ?")
            .bind(now)
            .bind(coach_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        sqlx::query("UPDATE bank_accounts SET is_default = 1, updated_at = ? WHERE id = ? AND coach_id = ?")
            .bind(now)
            .bind(id.to_string())
            .bind(coach_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tx.commit().await.map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Bank account not found".to_string()))
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM bank_accounts WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }
}
