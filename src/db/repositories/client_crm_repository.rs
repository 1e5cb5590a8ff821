use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::db::repositories::user_repository::escape_like;
use crate::error::AppError;
use crate::models::CrmStatus;
use crate::utils::pagination::{Page, Pagination};

/// A client user joined with its CRM record.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct ClientRecord {
    pub client_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub is_active: bool,
    pub company_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub notes: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: CrmStatus,
    pub updated_at: DateTime<Utc>,
}

impl ClientRecord {
    pub fn display_name(&self) -> String {
        match self.company_name.as_deref().filter(|c| !c.is_empty()) {
            Some(company) => format!("{} ({})", self.full_name, company),
            None => self.full_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientFilter {
    pub status: Option<CrmStatus>,
    pub search: Option<String>,
    /// Restricts the list to clients assigned to this employee.
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct CrmUpdate {
    pub company_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub notes: Option<String>,
    pub status: CrmStatus,
}

const CLIENT_SELECT: &str = r#"
    SELECT u.id AS client_id, u.full_name, u.email, u.is_active,
           c.company_name, c.phone, c.address, c.website, c.notes,
           COALESCE(c.status, 'active') AS status,
           COALESCE(c.updated_at, u.updated_at) AS updated_at
    FROM users u
    LEFT JOIN client_crm c ON c.client_id = u.id
    WHERE u.role = 'client'
"#;

pub struct ClientCrmRepository {
    db_pool: PgPool,
}

impl ClientCrmRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn list(&self, filter: &ClientFilter, pagination: Pagination) -> Result<Page<ClientRecord>, AppError> {
        let mut count_query = QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*) FROM ({}", CLIENT_SELECT));
        push_client_filters(&mut count_query, filter);
        count_query.push(") AS filtered");
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to count clients: {}", e)))?;

        let mut query = QueryBuilder::<Postgres>::new(CLIENT_SELECT);
        push_client_filters(&mut query, filter);
        query
            .push(" ORDER BY u.full_name ASC LIMIT ")
            .push_bind(pagination.limit())
            .push(" OFFSET ")
            .push_bind(pagination.offset());

        let clients = query
            .build_query_as::<ClientRecord>()
            .fetch_all(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list clients: {}", e)))?;

        Ok(Page::new(clients, pagination, total))
    }

    pub async fn get(&self, client_id: &Uuid) -> Result<ClientRecord, AppError> {
        sqlx::query_as::<_, ClientRecord>(&format!("{} AND u.id = $1", CLIENT_SELECT))
            .bind(client_id)
            .fetch_optional(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch client: {}", e)))?
            .ok_or_else(|| AppError::NotFound(format!("Client not found: {}", client_id)))
    }

    pub async fn update(&self, client_id: &Uuid, update: &CrmUpdate) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO client_crm (client_id, company_name, phone, address, website, notes, status, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, now())
            ON CONFLICT (client_id) DO UPDATE SET
                company_name = EXCLUDED.company_name,
                phone = EXCLUDED.phone,
                address = EXCLUDED.address,
                website = EXCLUDED.website,
                notes = EXCLUDED.notes,
                status = EXCLUDED.status,
                updated_at = now()
            "#,
        )
        .bind(client_id)
        .bind(&update.company_name)
        .bind(&update.phone)
        .bind(&update.address)
        .bind(&update.website)
        .bind(&update.notes)
        .bind(update.status.as_str())
        .execute(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to update CRM record: {}", e)))?;
        Ok(())
    }

    pub async fn update_notes(&self, client_id: &Uuid, notes: Option<&str>) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO client_crm (client_id, notes, status, updated_at)
            VALUES ($1, $2, 'active', now())
            ON CONFLICT (client_id) DO UPDATE SET notes = EXCLUDED.notes, updated_at = now()
            "#,
        )
        .bind(client_id)
        .bind(notes)
        .execute(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to update CRM notes: {}", e)))?;
        Ok(())
    }
}

fn push_client_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &ClientFilter) {
    if let Some(status) = filter.status {
        query.push(" AND COALESCE(c.status, 'active') = ").push_bind(status.as_str());
    }
    if let Some(employee_id) = filter.assigned_to {
        query
            .push(" AND EXISTS (SELECT 1 FROM employee_client_assignments a WHERE a.client_id = u.id AND a.employee_id = ")
            .push_bind(employee_id)
            .push(")");
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = format!("%{}%", escape_like(search.trim()));
        query
            .push(" AND (u.full_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR c.company_name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_scope_is_bound() {
        let mut query = QueryBuilder::<Postgres>::new(CLIENT_SELECT);
        push_client_filters(
            &mut query,
            &ClientFilter {
                status: Some(CrmStatus::Lead),
                search: None,
                assigned_to: Some(Uuid::new_v4()),
            },
        );
        let sql = query.sql();
        assert!(sql.contains("COALESCE(c.status, 'active') = $1"));
        assert!(sql.contains("a.employee_id = $2"));
    }

    #[test]
    fn test_display_name_includes_company() {
        let record = ClientRecord {
            client_id: Uuid::new_v4(),
            full_name: "Dana Smith".to_string(),
            email: "dana@example.com".to_string(),
            is_active: true,
            company_name: Some("Acme".to_string()),
            phone: None,
            address: None,
            website: None,
            notes: None,
            status: CrmStatus::Active,
            updated_at: Utc::now(),
        };
        assert_eq!(record.display_name(), "Dana Smith (Acme)");
    }
}
