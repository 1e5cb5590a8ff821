use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct Assignment {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub employee_name: String,
    pub client_id: Uuid,
    pub client_name: String,
    pub company_name: Option<String>,
    pub assigned_by_name: Option<String>,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentFilter {
    pub employee_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
}

/// Result of an assign call; a repeated pair is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    Created,
    AlreadyAssigned,
}

const ASSIGNMENT_SELECT: &str = r#"
    SELECT a.id, a.employee_id, e.full_name AS employee_name,
           a.client_id, c.full_name AS client_name, crm.company_name,
           b.full_name AS assigned_by_name, a.assigned_at
    FROM employee_client_assignments a
    JOIN users e ON e.id = a.employee_id
    JOIN users c ON c.id = a.client_id
    LEFT JOIN client_crm crm ON crm.client_id = a.client_id
    LEFT JOIN users b ON b.id = a.assigned_by
    WHERE 1=1
"#;

pub struct AssignmentRepository {
    db_pool: PgPool,
}

impl AssignmentRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn list(&self, filter: &AssignmentFilter) -> Result<Vec<Assignment>, AppError> {
        let mut query = QueryBuilder::<Postgres>::new(ASSIGNMENT_SELECT);
        if let Some(employee_id) = filter.employee_id {
            query.push(" AND a.employee_id = ").push_bind(employee_id);
        }
        if let Some(client_id) = filter.client_id {
            query.push(" AND a.client_id = ").push_bind(client_id);
        }
        query.push(" ORDER BY e.full_name, c.full_name");

        query
            .build_query_as::<Assignment>()
            .fetch_all(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list assignments: {}", e)))
    }

    pub async fn assign(&self, employee_id: &Uuid, client_id: &Uuid, assigned_by: &Uuid) -> Result<AssignOutcome, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO employee_client_assignments (id, employee_id, client_id, assigned_by, assigned_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (employee_id, client_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(employee_id)
        .bind(client_id)
        .bind(assigned_by)
        .execute(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to create assignment: {}", e)))?;

        Ok(if result.rows_affected() == 0 {
            AssignOutcome::AlreadyAssigned
        } else {
            AssignOutcome::Created
        })
    }

    pub async fn unassign(&self, assignment_id: &Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM employee_client_assignments WHERE id = $1")
            .bind(assignment_id)
            .execute(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to remove assignment: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Assignment not found".to_string()));
        }
        Ok(())
    }

    pub async fn is_assigned(&self, employee_id: &Uuid, client_id: &Uuid) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM employee_client_assignments WHERE employee_id = $1 AND client_id = $2)",
        )
        .bind(employee_id)
        .bind(client_id)
        .fetch_one(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to check assignment: {}", e)))
    }

    pub async fn client_ids_for(&self, employee_id: &Uuid) -> Result<Vec<Uuid>, AppError> {
        sqlx::query_scalar::<_, Uuid>("SELECT client_id FROM employee_client_assignments WHERE employee_id = $1")
            .bind(employee_id)
            .fetch_all(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list assigned clients: {}", e)))
    }
}
