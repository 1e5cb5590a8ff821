use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::AppError;
use crate::utils::date_range::DateRange;
use crate::utils::pagination::{Page, Pagination};

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct TimeLog {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub employee_name: String,
    pub client_id: Option<Uuid>,
    pub client_name: Option<String>,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub billable: bool,
    pub duration_minutes: i64,
}

impl TimeLog {
    pub fn is_running(&self) -> bool {
        self.end_time.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimeLogFilter {
    pub employee_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub range: DateRange,
}

/// Fields shared by manual create and edit.
#[derive(Debug, Clone)]
pub struct TimeEntry {
    pub client_id: Option<Uuid>,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub billable: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, sqlx::FromRow)]
pub struct TimeTotals {
    pub total_minutes: i64,
    pub billable_minutes: i64,
}

const TIME_LOG_SELECT: &str = r#"
    SELECT t.id, t.employee_id, e.full_name AS employee_name,
           t.client_id, c.full_name AS client_name,
           t.description, t.start_time, t.end_time, t.billable,
           (EXTRACT(EPOCH FROM (COALESCE(t.end_time, now()) - t.start_time)) / 60)::BIGINT AS duration_minutes
    FROM employee_time_logs t
    JOIN users e ON e.id = t.employee_id
    LEFT JOIN users c ON c.id = t.client_id
    WHERE 1=1
"#;

pub struct TimeLogRepository {
    db_pool: PgPool,
}

impl TimeLogRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn get(&self, id: &Uuid) -> Result<TimeLog, AppError> {
        sqlx::query_as::<_, TimeLog>(&format!("{} AND t.id = $1", TIME_LOG_SELECT))
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch time entry: {}", e)))?
            .ok_or_else(|| AppError::NotFound("Time entry not found".to_string()))
    }

    pub async fn active_for(&self, employee_id: &Uuid) -> Result<Option<TimeLog>, AppError> {
        sqlx::query_as::<_, TimeLog>(&format!(
            "{} AND t.employee_id = $1 AND t.end_time IS NULL",
            TIME_LOG_SELECT
        ))
        .bind(employee_id)
        .fetch_optional(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch active timer: {}", e)))
    }

    /// Starts a timer. The partial unique index on running entries turns a
    /// second concurrent start into a conflict.
    pub async fn start(
        &self,
        employee_id: &Uuid,
        client_id: Option<Uuid>,
        description: &str,
        billable: bool,
    ) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO employee_time_logs (id, employee_id, client_id, description, start_time, end_time, billable)
            VALUES ($1, $2, $3, $4, now(), NULL, $5)
            "#,
        )
        .bind(id)
        .bind(employee_id)
        .bind(client_id)
        .bind(description.trim())
        .bind(billable)
        .execute(&self.db_pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict("You already have a running timer. Stop it first.".to_string()),
            other => other,
        })?;
        Ok(id)
    }

    /// Stops the running timer and returns the finished entry.
    pub async fn stop(&self, employee_id: &Uuid) -> Result<TimeLog, AppError> {
        let stopped: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE employee_time_logs
            SET end_time = GREATEST(now(), start_time + INTERVAL '1 second'), updated_at = now()
            WHERE employee_id = $1 AND end_time IS NULL
            RETURNING id
            "#,
        )
        .bind(employee_id)
        .fetch_optional(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to stop timer: {}", e)))?;

        match stopped {
            Some(id) => self.get(&id).await,
            None => Err(AppError::Validation("No timer is running".to_string())),
        }
    }

    pub async fn create_manual(&self, employee_id: &Uuid, entry: &TimeEntry) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO employee_time_logs (id, employee_id, client_id, description, start_time, end_time, billable)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(employee_id)
        .bind(entry.client_id)
        .bind(entry.description.trim())
        .bind(entry.start_time)
        .bind(entry.end_time)
        .bind(entry.billable)
        .execute(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to add time entry: {}", e)))?;
        Ok(id)
    }

    pub async fn update(&self, id: &Uuid, entry: &TimeEntry) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE employee_time_logs
            SET client_id = $1, description = $2, start_time = $3, end_time = $4, billable = $5, updated_at = now()
            WHERE id = $6
            "#,
        )
        .bind(entry.client_id)
        .bind(entry.description.trim())
        .bind(entry.start_time)
        .bind(entry.end_time)
        .bind(entry.billable)
        .bind(id)
        .execute(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to update time entry: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Time entry not found".to_string()));
        }
        Ok(())
    }

    pub async fn delete(&self, id: &Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM employee_time_logs WHERE id = $1")
            .bind(id)
            .execute(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete time entry: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Time entry not found".to_string()));
        }
        Ok(())
    }

    pub async fn list(&self, filter: &TimeLogFilter, pagination: Pagination) -> Result<Page<TimeLog>, AppError> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM employee_time_logs t WHERE 1=1");
        push_time_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to count time entries: {}", e)))?;

        let mut query = QueryBuilder::<Postgres>::new(TIME_LOG_SELECT);
        push_time_filters(&mut query, filter);
        query
            .push(" ORDER BY t.start_time DESC LIMIT ")
            .push_bind(pagination.limit())
            .push(" OFFSET ")
            .push_bind(pagination.offset());

        let entries = query
            .build_query_as::<TimeLog>()
            .fetch_all(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list time entries: {}", e)))?;

        Ok(Page::new(entries, pagination, total))
    }

    /// Every entry matching the filter, oldest first, for export.
    pub async fn list_all(&self, filter: &TimeLogFilter) -> Result<Vec<TimeLog>, AppError> {
        let mut query = QueryBuilder::<Postgres>::new(TIME_LOG_SELECT);
        push_time_filters(&mut query, filter);
        query.push(" ORDER BY t.start_time ASC");
        query
            .build_query_as::<TimeLog>()
            .fetch_all(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to export time entries: {}", e)))
    }

    /// Totals over finished entries only.
    pub async fn totals(&self, filter: &TimeLogFilter) -> Result<TimeTotals, AppError> {
        let mut query = QueryBuilder::<Postgres>::new(
            r#"
            SELECT
                COALESCE(SUM(EXTRACT(EPOCH FROM (t.end_time - t.start_time)) / 60), 0)::BIGINT AS total_minutes,
                COALESCE(SUM(EXTRACT(EPOCH FROM (t.end_time - t.start_time)) / 60) FILTER (WHERE t.billable), 0)::BIGINT AS billable_minutes
            FROM employee_time_logs t
            WHERE t.end_time IS NOT NULL
            "#,
        );
        push_time_filters(&mut query, filter);
        query
            .build_query_as::<TimeTotals>()
            .fetch_one(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to total time entries: {}", e)))
    }
}

fn push_time_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &TimeLogFilter) {
    if let Some(employee_id) = filter.employee_id {
        query.push(" AND t.employee_id = ").push_bind(employee_id);
    }
    if let Some(client_id) = filter.client_id {
        query.push(" AND t.client_id = ").push_bind(client_id);
    }
    if let Some(start) = filter.range.start_bound() {
        query.push(" AND t.start_time >= ").push_bind(start);
    }
    if let Some(end) = filter.range.end_bound() {
        query.push(" AND t.start_time < ").push_bind(end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_range_bounds_where_clause() {
        let mut query = QueryBuilder::<Postgres>::new("SELECT 1 FROM employee_time_logs t WHERE 1=1");
        push_time_filters(
            &mut query,
            &TimeLogFilter {
                employee_id: None,
                client_id: None,
                range: DateRange::from_query(Some("2026-03-01"), Some("2026-03-31")),
            },
        );
        let sql = query.sql();
        assert!(sql.contains("t.start_time >= $1"));
        assert!(sql.contains("t.start_time < $2"));
    }

    #[test]
    fn test_open_range_adds_no_bounds() {
        let mut query = QueryBuilder::<Postgres>::new("SELECT 1 FROM employee_time_logs t WHERE 1=1");
        push_time_filters(
            &mut query,
            &TimeLogFilter {
                employee_id: Some(Uuid::new_v4()),
                ..Default::default()
            },
        );
        let sql = query.sql();
        assert!(sql.contains("t.employee_id = $1"));
        assert!(!sql.contains("start_time"));
    }
}
