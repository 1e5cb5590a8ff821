use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct DocumentCategory {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub sort_order: i32,
    pub document_count: i64,
}

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct PlanDocument {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub category_id: Uuid,
    pub category_name: String,
    pub media_id: Uuid,
    pub media_name: String,
    pub mime_type: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

const DOCUMENT_SELECT: &str = r#"
    SELECT d.id, d.subscription_id, d.category_id, c.name AS category_name,
           d.media_id, m.original_name AS media_name, m.mime_type, d.title, d.created_at
    FROM plan_documents d
    JOIN plan_document_categories c ON c.id = d.category_id
    JOIN media_library m ON m.id = d.media_id
"#;

pub struct PlanDocumentRepository {
    db_pool: PgPool,
}

impl PlanDocumentRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn list_categories(&self) -> Result<Vec<DocumentCategory>, AppError> {
        sqlx::query_as::<_, DocumentCategory>(
            r#"
            SELECT c.id, c.name, c.description, c.sort_order,
                   (SELECT COUNT(*) FROM plan_documents d WHERE d.category_id = c.id) AS document_count
            FROM plan_document_categories c
            ORDER BY c.sort_order, c.name
            "#,
        )
        .fetch_all(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to list document categories: {}", e)))
    }

    pub async fn create_category(&self, name: &str, description: Option<&str>, sort_order: i32) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO plan_document_categories (id, name, description, sort_order) VALUES ($1, $2, $3, $4)")
            .bind(id)
            .bind(name.trim())
            .bind(description)
            .bind(sort_order)
            .execute(&self.db_pool)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Conflict(_) => AppError::Conflict(format!("A category named {} already exists", name.trim())),
                other => other,
            })?;
        Ok(id)
    }

    pub async fn update_category(&self, id: &Uuid, name: &str, description: Option<&str>, sort_order: i32) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE plan_document_categories SET name = $1, description = $2, sort_order = $3 WHERE id = $4",
        )
        .bind(name.trim())
        .bind(description)
        .bind(sort_order)
        .bind(id)
        .execute(&self.db_pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict(format!("A category named {} already exists", name.trim())),
            other => other,
        })?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Document category not found".to_string()));
        }
        Ok(())
    }

    /// Deletes a category that holds no documents.
    pub async fn delete_category(&self, id: &Uuid) -> Result<(), AppError> {
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM plan_documents WHERE category_id = $1")
            .bind(id)
            .fetch_one(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to count category documents: {}", e)))?;
        if documents > 0 {
            return Err(AppError::Conflict(format!(
                "This category still contains {} document(s). Move or delete them first.",
                documents
            )));
        }

        let result = sqlx::query("DELETE FROM plan_document_categories WHERE id = $1")
            .bind(id)
            .execute(&self.db_pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Document category not found".to_string()));
        }
        Ok(())
    }

    pub async fn documents_for_subscriptions(&self, subscription_ids: &[Uuid]) -> Result<Vec<PlanDocument>, AppError> {
        if subscription_ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, PlanDocument>(&format!(
            "{} WHERE d.subscription_id = ANY($1) ORDER BY c.sort_order, c.name, d.title",
            DOCUMENT_SELECT
        ))
        .bind(subscription_ids)
        .fetch_all(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to list plan documents: {}", e)))
    }

    pub async fn get_document(&self, id: &Uuid) -> Result<PlanDocument, AppError> {
        sqlx::query_as::<_, PlanDocument>(&format!("{} WHERE d.id = $1", DOCUMENT_SELECT))
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch plan document: {}", e)))?
            .ok_or_else(|| AppError::NotFound("Document not found".to_string()))
    }

    pub async fn attach(&self, subscription_id: &Uuid, category_id: &Uuid, media_id: &Uuid, title: &str) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO plan_documents (id, subscription_id, category_id, media_id, title) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(subscription_id)
        .bind(category_id)
        .bind(media_id)
        .bind(title.trim())
        .execute(&self.db_pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Validation("The subscription, category or file no longer exists".to_string()),
            other => other,
        })?;
        Ok(id)
    }

    pub async fn delete_document(&self, id: &Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM plan_documents WHERE id = $1")
            .bind(id)
            .execute(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete plan document: {}", e)))?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Document not found".to_string()));
        }
        Ok(())
    }

    pub async fn count_for_media(&self, media_id: &Uuid) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM plan_documents WHERE media_id = $1")
            .bind(media_id)
            .fetch_one(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to count media references: {}", e)))
    }
}
