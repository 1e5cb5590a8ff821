use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub tier_count: i64,
    pub created_at: DateTime<Utc>,
}

const SERVICE_SELECT: &str = r#"
    SELECT s.id, s.name, s.description, s.is_active, s.created_at,
           (SELECT COUNT(*) FROM plan_tier_services pts WHERE pts.service_id = s.id) AS tier_count
    FROM services s
"#;

pub struct ServiceRepository {
    db_pool: PgPool,
}

impl ServiceRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn list(&self) -> Result<Vec<Service>, AppError> {
        sqlx::query_as::<_, Service>(&format!("{} ORDER BY s.name", SERVICE_SELECT))
            .fetch_all(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list services: {}", e)))
    }

    pub async fn list_active(&self) -> Result<Vec<Service>, AppError> {
        sqlx::query_as::<_, Service>(&format!("{} WHERE s.is_active ORDER BY s.name", SERVICE_SELECT))
            .fetch_all(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list active services: {}", e)))
    }

    pub async fn create(&self, name: &str, description: Option<&str>) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO services (id, name, description) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(name.trim())
            .bind(description)
            .execute(&self.db_pool)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Conflict(_) => AppError::Conflict(format!("A service named {} already exists", name.trim())),
                other => other,
            })?;
        Ok(id)
    }

    pub async fn update(&self, id: &Uuid, name: &str, description: Option<&str>) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE services SET name = $1, description = $2, updated_at = now() WHERE id = $3")
            .bind(name.trim())
            .bind(description)
            .bind(id)
            .execute(&self.db_pool)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Conflict(_) => AppError::Conflict(format!("A service named {} already exists", name.trim())),
                other => other,
            })?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Service not found".to_string()));
        }
        Ok(())
    }

    /// Flips the active flag and returns the new value.
    pub async fn toggle_active(&self, id: &Uuid) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>(
            "UPDATE services SET is_active = NOT is_active, updated_at = now() WHERE id = $1 RETURNING is_active",
        )
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to toggle service: {}", e)))?
        .ok_or_else(|| AppError::NotFound("Service not found".to_string()))
    }

    /// Deletes a service that no tier includes.
    pub async fn delete(&self, id: &Uuid) -> Result<(), AppError> {
        let in_use: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM plan_tier_services WHERE service_id = $1")
            .bind(id)
            .fetch_one(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to check service usage: {}", e)))?;
        if in_use > 0 {
            return Err(AppError::Conflict(format!(
                "This service is included in {} tier(s). Remove it from those tiers first.",
                in_use
            )));
        }

        let result = sqlx::query("DELETE FROM services WHERE id = $1")
            .bind(id)
            .execute(&self.db_pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Service not found".to_string()));
        }
        Ok(())
    }
}
