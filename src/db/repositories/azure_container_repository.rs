use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct AzureContainer {
    pub id: Uuid,
    pub name: String,
    pub client_id: Option<Uuid>,
    pub client_name: Option<String>,
    pub description: Option<String>,
    pub created_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

const CONTAINER_SELECT: &str = r#"
    SELECT a.id, a.name, a.client_id, c.full_name AS client_name, a.description,
           cb.full_name AS created_by_name, a.created_at
    FROM azure_containers a
    LEFT JOIN users c ON c.id = a.client_id
    LEFT JOIN users cb ON cb.id = a.created_by
"#;

pub struct AzureContainerRepository {
    db_pool: PgPool,
}

impl AzureContainerRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// All containers, or only those of one client.
    pub async fn list(&self, client_id: Option<Uuid>) -> Result<Vec<AzureContainer>, AppError> {
        match client_id {
            Some(client_id) => {
                sqlx::query_as::<_, AzureContainer>(&format!("{} WHERE a.client_id = $1 ORDER BY a.name", CONTAINER_SELECT))
                    .bind(client_id)
                    .fetch_all(&self.db_pool)
                    .await
            }
            None => {
                sqlx::query_as::<_, AzureContainer>(&format!("{} ORDER BY a.name", CONTAINER_SELECT))
                    .fetch_all(&self.db_pool)
                    .await
            }
        }
        .map_err(|e| AppError::Database(format!("Failed to list containers: {}", e)))
    }

    pub async fn get(&self, id: &Uuid) -> Result<AzureContainer, AppError> {
        sqlx::query_as::<_, AzureContainer>(&format!("{} WHERE a.id = $1", CONTAINER_SELECT))
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch container: {}", e)))?
            .ok_or_else(|| AppError::NotFound("Container not found".to_string()))
    }

    pub async fn insert(
        &self,
        name: &str,
        client_id: Option<Uuid>,
        description: Option<&str>,
        created_by: &Uuid,
    ) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO azure_containers (id, name, client_id, description, created_by) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(name)
        .bind(client_id)
        .bind(description)
        .bind(created_by)
        .execute(&self.db_pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict(format!("A container named {} is already registered", name)),
            other => other,
        })?;
        Ok(id)
    }

    pub async fn delete(&self, id: &Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM azure_containers WHERE id = $1")
            .bind(id)
            .execute(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete container: {}", e)))?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Container not found".to_string()));
        }
        Ok(())
    }
}
