use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::AppError;
use crate::utils::pagination::{Page, Pagination};

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct MediaItem {
    pub id: Uuid,
    pub title: String,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub checksum_sha256: String,
    pub alt_text: Option<String>,
    pub uploaded_by: Option<Uuid>,
    pub uploader_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MediaItem {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Coarse grouping used by the library's type filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Document,
    Other,
}

impl MediaKind {
    pub const ALL: [MediaKind; 3] = [MediaKind::Image, MediaKind::Document, MediaKind::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Document => "document",
            MediaKind::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MediaKind::Image => "Images",
            MediaKind::Document => "Documents",
            MediaKind::Other => "Other",
        }
    }

    pub fn parse(value: &str) -> Option<MediaKind> {
        MediaKind::ALL.into_iter().find(|k| k.as_str() == value.trim())
    }
}

#[derive(Debug, Clone)]
pub struct NewMedia {
    pub title: String,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub checksum_sha256: String,
    pub alt_text: Option<String>,
    pub uploaded_by: Uuid,
}

const MEDIA_SELECT: &str = r#"
    SELECT m.id, m.title, m.original_name, m.stored_name, m.mime_type, m.size_bytes,
           m.checksum_sha256, m.alt_text, m.uploaded_by, u.full_name AS uploader_name, m.created_at
    FROM media_library m
    LEFT JOIN users u ON u.id = m.uploaded_by
    WHERE 1=1
"#;

const DOCUMENT_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "text/plain",
    "text/csv",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

pub struct MediaRepository {
    db_pool: PgPool,
}

impl MediaRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn list(&self, kind: Option<MediaKind>, pagination: Pagination) -> Result<Page<MediaItem>, AppError> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM media_library m WHERE 1=1");
        push_kind_filter(&mut count_query, kind);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to count media: {}", e)))?;

        let mut query = QueryBuilder::<Postgres>::new(MEDIA_SELECT);
        push_kind_filter(&mut query, kind);
        query
            .push(" ORDER BY m.created_at DESC LIMIT ")
            .push_bind(pagination.limit())
            .push(" OFFSET ")
            .push_bind(pagination.offset());

        let items = query
            .build_query_as::<MediaItem>()
            .fetch_all(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list media: {}", e)))?;

        Ok(Page::new(items, pagination, total))
    }

    /// Recent items for pickers such as the plan document form.
    pub async fn recent(&self, limit: i64) -> Result<Vec<MediaItem>, AppError> {
        sqlx::query_as::<_, MediaItem>(&format!("{} ORDER BY m.created_at DESC LIMIT $1", MEDIA_SELECT))
            .bind(limit)
            .fetch_all(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list media: {}", e)))
    }

    pub async fn get(&self, id: &Uuid) -> Result<MediaItem, AppError> {
        sqlx::query_as::<_, MediaItem>(&format!("{} AND m.id = $1", MEDIA_SELECT))
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch media item: {}", e)))?
            .ok_or_else(|| AppError::NotFound("Media item not found".to_string()))
    }

    pub async fn find_by_checksum(&self, checksum: &str) -> Result<Option<MediaItem>, AppError> {
        sqlx::query_as::<_, MediaItem>(&format!("{} AND m.checksum_sha256 = $1", MEDIA_SELECT))
            .bind(checksum)
            .fetch_optional(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to look up checksum: {}", e)))
    }

    pub async fn insert(&self, media: &NewMedia) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO media_library
                (id, title, original_name, stored_name, mime_type, size_bytes, checksum_sha256, alt_text, uploaded_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(id)
        .bind(&media.title)
        .bind(&media.original_name)
        .bind(&media.stored_name)
        .bind(&media.mime_type)
        .bind(media.size_bytes)
        .bind(&media.checksum_sha256)
        .bind(&media.alt_text)
        .bind(media.uploaded_by)
        .execute(&self.db_pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict("This file is already in the media library".to_string()),
            other => other,
        })?;
        Ok(id)
    }

    pub async fn update_details(&self, id: &Uuid, title: &str, alt_text: Option<&str>) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE media_library SET title = $1, alt_text = $2 WHERE id = $3")
            .bind(title.trim())
            .bind(alt_text)
            .bind(id)
            .execute(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to update media item: {}", e)))?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Media item not found".to_string()));
        }
        Ok(())
    }

    pub async fn delete(&self, id: &Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM media_library WHERE id = $1")
            .bind(id)
            .execute(&self.db_pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Media item not found".to_string()));
        }
        Ok(())
    }
}

fn push_kind_filter(query: &mut QueryBuilder<'_, Postgres>, kind: Option<MediaKind>) {
    let documents: Vec<String> = DOCUMENT_MIME_TYPES.iter().map(|m| m.to_string()).collect();
    match kind {
        Some(MediaKind::Image) => {
            query.push(" AND m.mime_type LIKE 'image/%'");
        }
        Some(MediaKind::Document) => {
            query.push(" AND m.mime_type = ANY(").push_bind(documents).push(")");
        }
        Some(MediaKind::Other) => {
            query
                .push(" AND m.mime_type NOT LIKE 'image/%' AND NOT (m.mime_type = ANY(")
                .push_bind(documents)
                .push("))");
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_parse() {
        assert_eq!(MediaKind::parse("image"), Some(MediaKind::Image));
        assert_eq!(MediaKind::parse("video"), None);
    }

    #[test]
    fn test_other_kind_excludes_images_and_documents() {
        let mut query = QueryBuilder::<Postgres>::new("SELECT 1 FROM media_library m WHERE 1=1");
        push_kind_filter(&mut query, Some(MediaKind::Other));
        let sql = query.sql();
        assert!(sql.contains("NOT LIKE 'image/%'"));
        assert!(sql.contains("NOT (m.mime_type = ANY($1))"));
    }
}
