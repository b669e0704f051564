use std::sync::Arc;
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::{CreateRateRequest, Rate, UpdateRateRequest},
    error::{AppError, Result},
    gateway::CatalogAdapter,
    repository::RateRepository,
};

/// The rate catalog: priced offerings coaches sell. Rates referenced by a
/// payment are soft-deactivated on delete so historic payments keep their
/// pricing context.
pub struct RateService {
    rates: Arc<dyn RateRepository>,
    catalog: Arc<dyn CatalogAdapter>,
}

impl RateService {
    pub fn new(rates: Arc<dyn RateRepository>, catalog: Arc<dyn CatalogAdapter>) -> Self {
        Self { rates, catalog }
    }

    pub async fn create(&self, request: CreateRateRequest) -> Result<Rate> {
        request
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let catalog_ref = self
            .catalog
            .publish_rate(request.coach_id, &request.session_type, request.rate_cents)
            .await?;

        let rate = self
            .rates
            .create(Rate {
                id: Uuid::new_v4(),
                coach_id: request.coach_id,
                session_type: request.session_type,
                duration_minutes: request.duration_minutes,
                rate_cents: request.rate_cents,
                catalog_ref,
                is_active: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await?;

        tracing::info!(
            rate_id = %rate.id,
            coach_id = %rate.coach_id,
            rate_cents = rate.rate_cents,
            "rate created"
        );
        Ok(rate)
    }

    pub async fn update(&self, rate_id: Uuid, update: UpdateRateRequest) -> Result<Rate> {
        if let Some(rate_cents) = update.rate_cents {
            if rate_cents <= 0 {
                return Err(AppError::Validation("rate must be positive".to_string()));
            }
        }
        self.find(rate_id).await?;
        self.rates.update(rate_id, update).await
    }

    pub async fn deactivate(&self, rate_id: Uuid) -> Result<Rate> {
        self.find(rate_id).await?;
        self.rates.set_active(rate_id, false).await
    }

    /// Hard-delete an unreferenced rate. A rate any payment still points at
    /// is deactivated instead, preserving the audit trail.
    pub async fn delete(&self, rate_id: Uuid) -> Result<()> {
        self.find(rate_id).await?;

        if self.rates.is_referenced(rate_id).await? {
            tracing::info!(rate_id = %rate_id, "rate is referenced by payments; deactivating instead of deleting");
            self.rates.set_active(rate_id, false).await?;
            return Ok(());
        }

        self.rates.delete(rate_id).await
    }

    pub async fn find(&self, rate_id: Uuid) -> Result<Rate> {
        self.rates
            .find_by_id(rate_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("rate {} not found", rate_id)))
    }

    pub async fn list_for_coach(&self, coach_id: Uuid) -> Result<Vec<Rate>> {
        self.rates.list_by_coach(coach_id).await
    }
}
