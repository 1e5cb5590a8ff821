use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::db::pool_ext::begin_with_retry;
use crate::error::AppError;

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct ServicePlan {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub tier_count: i64,
    pub subscription_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct PlanTier {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub name: String,
    pub monthly_price: BigDecimal,
    pub included_hours: BigDecimal,
    pub sort_order: i32,
    pub subscription_count: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TierService {
    pub tier_id: Uuid,
    pub service_id: Uuid,
    pub service_name: String,
}

#[derive(Debug, Clone)]
pub struct TierInput {
    pub name: String,
    pub monthly_price: BigDecimal,
    pub included_hours: BigDecimal,
    pub sort_order: i32,
    pub service_ids: Vec<Uuid>,
}

const PLAN_SELECT: &str = r#"
    SELECT p.id, p.name, p.description, p.is_active, p.created_at,
           (SELECT COUNT(*) FROM plan_tiers t WHERE t.plan_id = p.id) AS tier_count,
           (SELECT COUNT(*) FROM client_plan_subscriptions s WHERE s.plan_id = p.id) AS subscription_count
    FROM service_plans p
"#;

const TIER_SELECT: &str = r#"
    SELECT t.id, t.plan_id, t.name, t.monthly_price, t.included_hours, t.sort_order,
           (SELECT COUNT(*) FROM client_plan_subscriptions s WHERE s.tier_id = t.id) AS subscription_count
    FROM plan_tiers t
"#;

pub struct ServicePlanRepository {
    db_pool: PgPool,
}

impl ServicePlanRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn list(&self) -> Result<Vec<ServicePlan>, AppError> {
        sqlx::query_as::<_, ServicePlan>(&format!("{} ORDER BY p.name", PLAN_SELECT))
            .fetch_all(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list plans: {}", e)))
    }

    pub async fn get(&self, id: &Uuid) -> Result<ServicePlan, AppError> {
        sqlx::query_as::<_, ServicePlan>(&format!("{} WHERE p.id = $1", PLAN_SELECT))
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch plan: {}", e)))?
            .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))
    }

    pub async fn create(&self, name: &str, description: Option<&str>) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO service_plans (id, name, description) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(name.trim())
            .bind(description)
            .execute(&self.db_pool)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Conflict(_) => AppError::Conflict(format!("A plan named {} already exists", name.trim())),
                other => other,
            })?;
        Ok(id)
    }

    pub async fn update(&self, id: &Uuid, name: &str, description: Option<&str>) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE service_plans SET name = $1, description = $2, updated_at = now() WHERE id = $3")
            .bind(name.trim())
            .bind(description)
            .bind(id)
            .execute(&self.db_pool)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Conflict(_) => AppError::Conflict(format!("A plan named {} already exists", name.trim())),
                other => other,
            })?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Plan not found".to_string()));
        }
        Ok(())
    }

    pub async fn toggle_active(&self, id: &Uuid) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>(
            "UPDATE service_plans SET is_active = NOT is_active, updated_at = now() WHERE id = $1 RETURNING is_active",
        )
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to toggle plan: {}", e)))?
        .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))
    }

    /// Deletes a plan nobody subscribes to; its tiers go with it.
    pub async fn delete(&self, id: &Uuid) -> Result<(), AppError> {
        let plan = self.get(id).await?;
        if plan.subscription_count > 0 {
            return Err(AppError::Conflict(format!(
                "{} still has {} subscription(s) and cannot be deleted",
                plan.name, plan.subscription_count
            )));
        }
        sqlx::query("DELETE FROM service_plans WHERE id = $1")
            .bind(id)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    pub async fn tiers_for_plan(&self, plan_id: &Uuid) -> Result<Vec<PlanTier>, AppError> {
        sqlx::query_as::<_, PlanTier>(&format!("{} WHERE t.plan_id = $1 ORDER BY t.sort_order, t.name", TIER_SELECT))
            .bind(plan_id)
            .fetch_all(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list tiers: {}", e)))
    }

    pub async fn all_tiers(&self) -> Result<Vec<PlanTier>, AppError> {
        sqlx::query_as::<_, PlanTier>(&format!("{} ORDER BY t.plan_id, t.sort_order, t.name", TIER_SELECT))
            .fetch_all(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list tiers: {}", e)))
    }

    pub async fn get_tier(&self, id: &Uuid) -> Result<PlanTier, AppError> {
        sqlx::query_as::<_, PlanTier>(&format!("{} WHERE t.id = $1", TIER_SELECT))
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch tier: {}", e)))?
            .ok_or_else(|| AppError::NotFound("Tier not found".to_string()))
    }

    pub async fn services_for_tiers(&self, tier_ids: &[Uuid]) -> Result<Vec<TierService>, AppError> {
        if tier_ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, TierService>(
            r#"
            SELECT pts.tier_id, pts.service_id, s.name AS service_name
            FROM plan_tier_services pts
            JOIN services s ON s.id = pts.service_id
            WHERE pts.tier_id = ANY($1)
            ORDER BY s.name
            "#,
        )
        .bind(tier_ids)
        .fetch_all(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to list tier services: {}", e)))
    }

    pub async fn create_tier(&self, plan_id: &Uuid, input: &TierInput) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        let mut tx = begin_with_retry(&self.db_pool, 3, 50)
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO plan_tiers (id, plan_id, name, monthly_price, included_hours, sort_order)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(plan_id)
        .bind(input.name.trim())
        .bind(&input.monthly_price)
        .bind(&input.included_hours)
        .bind(input.sort_order)
        .execute(&mut *tx)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict(format!("This plan already has a tier named {}", input.name.trim())),
            other => other,
        })?;

        replace_tier_services(&mut tx, &id, &input.service_ids).await?;

        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit tier: {}", e)))?;
        Ok(id)
    }

    pub async fn update_tier(&self, id: &Uuid, input: &TierInput) -> Result<(), AppError> {
        let mut tx = begin_with_retry(&self.db_pool, 3, 50)
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let result = sqlx::query(
            r#"
            UPDATE plan_tiers
            SET name = $1, monthly_price = $2, included_hours = $3, sort_order = $4, updated_at = now()
            WHERE id = $5
            "#,
        )
        .bind(input.name.trim())
        .bind(&input.monthly_price)
        .bind(&input.included_hours)
        .bind(input.sort_order)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict(format!("This plan already has a tier named {}", input.name.trim())),
            other => other,
        })?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Tier not found".to_string()));
        }

        replace_tier_services(&mut tx, id, &input.service_ids).await?;

        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit tier: {}", e)))?;
        Ok(())
    }

    pub async fn delete_tier(&self, id: &Uuid) -> Result<(), AppError> {
        let tier = self.get_tier(id).await?;
        if tier.subscription_count > 0 {
            return Err(AppError::Conflict(format!(
                "Tier {} is used by {} subscription(s) and cannot be deleted",
                tier.name, tier.subscription_count
            )));
        }
        sqlx::query("DELETE FROM plan_tiers WHERE id = $1")
            .bind(id)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }
}

async fn replace_tier_services(
    tx: &mut Transaction<'_, Postgres>,
    tier_id: &Uuid,
    service_ids: &[Uuid],
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM plan_tier_services WHERE tier_id = $1")
        .bind(tier_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to clear tier services: {}", e)))?;

    if !service_ids.is_empty() {
        sqlx::query(
            r#"
            INSERT INTO plan_tier_services (tier_id, service_id)
            SELECT $1, UNNEST($2::uuid[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(tier_id)
        .bind(service_ids)
        .execute(&mut **tx)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Validation("One of the selected services no longer exists".to_string()),
            other => other,
        })?;
    }
    Ok(())
}
