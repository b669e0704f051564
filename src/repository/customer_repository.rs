use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::GatewayCustomer,
    error::{AppError, Result},
    repository::{payment_repository::parse_uuid, GatewayCustomerRepository},
};

#[derive(FromRow)]
struct GatewayCustomerRow {
    id: String,
    client_id: String,
    customer_id: String,
    created_at: NaiveDateTime,
}

pub struct SqliteGatewayCustomerRepository {
    pool: SqlitePool,
}

impl SqliteGatewayCustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_customer(row: GatewayCustomerRow) -> Result<GatewayCustomer> {
        Ok(GatewayCustomer {
            id: parse_uuid(&row.id)?,
            client_id: parse_uuid(&row.client_id)?,
            customer_id: row.customer_id,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
        })
    }
}

#[async_trait]
impl GatewayCustomerRepository for SqliteGatewayCustomerRepository {
    async fn find_by_client(&self, client_id: Uuid) -> Result<Option<GatewayCustomer>> {
        let row = sqlx::query_as::<_, GatewayCustomerRow>(
            "SELECT id, client_id, customer_id, created_at FROM gateway_customers WHERE client_id = ?",
        )
        .bind(client_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_customer).transpose()
    }

    async fn create(&self, client_id: Uuid, customer_id: &str) -> Result<GatewayCustomer> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            "INSERT INTO gateway_customers (id, client_id, customer_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(client_id.to_string())
        .bind(customer_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_client(client_id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve created gateway customer".to_string()))
    }
}
