use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{BillingTransaction, ReferenceType, TransactionStatus, TransactionType, UserType},
    error::{AppError, Result},
    repository::{payment_repository::parse_uuid, BillingRepository},
};

#[derive(FromRow)]
struct TransactionRow {
    id: String,
    user_id: String,
    user_type: String,
    transaction_type: String,
    amount_cents: i64,
    currency: String,
    status: String,
    description: String,
    reference_id: String,
    reference_type: String,
    metadata: Option<String>,
    created_at: NaiveDateTime,
}

const SELECT_COLUMNS: &str = "id, user_id, user_type, transaction_type, amount_cents, currency, \
     status, description, reference_id, reference_type, metadata, created_at";

/// Append-only ledger store. Deliberately contains no UPDATE or DELETE
/// statement; a correction is a superseding INSERT for the same reference.
pub struct SqliteBillingRepository {
    pool: SqlitePool,
}

impl SqliteBillingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_transaction(row: TransactionRow) -> Result<BillingTransaction> {
        let metadata = row
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| AppError::Database(format!("Invalid ledger metadata: {}", e)))?;

        Ok(BillingTransaction {
            id: parse_uuid(&row.id)?,
            user_id: parse_uuid(&row.user_id)?,
            user_type: row.user_type.parse()?,
            transaction_type: row.transaction_type.parse()?,
            amount_cents: row.amount_cents,
            currency: row.currency,
            status: row.status.parse()?,
            description: row.description,
            reference_id: parse_uuid(&row.reference_id)?,
            reference_type: row.reference_type.parse()?,
            metadata,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
        })
    }
}

#[async_trait]
impl BillingRepository for SqliteBillingRepository {
    async fn create(&self, transaction: BillingTransaction) -> Result<BillingTransaction> {
        let metadata = transaction
            .metadata
            .as_ref()
            .map(|m| m.to_string());

        sqlx::query(
            r#"
            INSERT INTO billing_transactions (
                id, user_id, user_type, transaction_type, amount_cents,
                currency, status, description, reference_id, reference_type,
                metadata, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transaction.id.to_string())
        .bind(transaction.user_id.to_string())
        .bind(transaction.user_type.as_str())
        .bind(transaction.transaction_type.as_str())
        .bind(transaction.amount_cents)
        .bind(&transaction.currency)
        .bind(transaction.status.as_str())
        .bind(&transaction.description)
        .bind(transaction.reference_id.to_string())
        .bind(transaction.reference_type.as_str())
        .bind(metadata)
        .bind(transaction.created_at.naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(transaction)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        user_type: UserType,
    ) -> Result<Vec<BillingTransaction>> {
        let sql = format!(
            "SELECT {} FROM billing_transactions WHERE user_id = ? AND user_type = ? ORDER BY created_at DESC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(user_id.to_string())
            .bind(user_type.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_transaction).collect()
    }

    async fn list_for_reference(
        &self,
        reference_id: Uuid,
        reference_type: ReferenceType,
    ) -> Result<Vec<BillingTransaction>> {
        let sql = format!(
            "SELECT {} FROM billing_transactions WHERE reference_id = ? AND reference_type = ? ORDER BY created_at ASC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(reference_id.to_string())
            .bind(reference_type.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_transaction).collect()
    }

    async fn latest_for_reference(
        &self,
        reference_id: Uuid,
        reference_type: ReferenceType,
        transaction_type: TransactionType,
    ) -> Result<Option<BillingTransaction>> {
        let sql = format!(
            r#"
            SELECT {} FROM billing_transactions
            WHERE reference_id = ? AND reference_type = ? AND transaction_type = ?
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(reference_id.to_string())
            .bind(reference_type.as_str())
            .bind(transaction_type.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_transaction).transpose()
    }

    async fn sum_for_user(
        &self,
        user_id: Uuid,
        user_type: UserType,
        transaction_type: TransactionType,
        status: TransactionStatus,
    ) -> Result<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0) FROM billing_transactions
            WHERE user_id = ? AND user_type = ? AND transaction_type = ? AND status = ?
            "#,
        )
        .bind(user_id.to_string())
        .bind(user_type.as_str())
        .bind(transaction_type.as_str())
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(total)
    }
}
