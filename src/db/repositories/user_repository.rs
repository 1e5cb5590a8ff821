use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{AuthenticatedUser, UserRole};
use crate::utils::pagination::{Page, Pagination};

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    #[sqlx(try_from = "String")]
    pub role: UserRole,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn to_authenticated(&self) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: self.id,
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            role: self.role,
        }
    }
}

/// Id and name pair for select boxes.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserOption {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    pub search: Option<String>,
    pub include_inactive: bool,
}

const USER_COLUMNS: &str = "id, email, password_hash, full_name, role, is_active, last_login_at, created_at, updated_at";

pub struct UserRepository {
    db_pool: PgPool,
}

impl UserRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn get_by_id(&self, id: &Uuid) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_one(&self.db_pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => AppError::NotFound(format!("User not found: {}", id)),
                _ => AppError::Database(format!("Failed to fetch user: {}", e)),
            })
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE lower(email) = lower($1)",
            USER_COLUMNS
        ))
        .bind(email.trim())
        .fetch_optional(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch user by email: {}", e)))
    }

    /// Fetches a user and checks the role, for forms that pick a client or
    /// an employee by id.
    pub async fn get_with_role(&self, id: &Uuid, role: UserRole) -> Result<User, AppError> {
        let user = self.get_by_id(id).await?;
        if user.role != role {
            return Err(AppError::Validation(format!(
                "{} is not a {}",
                user.full_name,
                role.label().to_lowercase()
            )));
        }
        Ok(user)
    }

    pub async fn list(&self, filter: &UserFilter, pagination: Pagination) -> Result<Page<User>, AppError> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users WHERE 1=1");
        push_user_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to count users: {}", e)))?;

        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM users WHERE 1=1", USER_COLUMNS));
        push_user_filters(&mut query, filter);
        query
            .push(" ORDER BY full_name ASC LIMIT ")
            .push_bind(pagination.limit())
            .push(" OFFSET ")
            .push_bind(pagination.offset());

        let users = query
            .build_query_as::<User>()
            .fetch_all(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list users: {}", e)))?;

        Ok(Page::new(users, pagination, total))
    }

    /// Active users with `role`, for select boxes.
    pub async fn options_for_role(&self, role: UserRole) -> Result<Vec<UserOption>, AppError> {
        sqlx::query_as::<_, UserOption>(
            "SELECT id, full_name, email FROM users WHERE role = $1 AND is_active ORDER BY full_name",
        )
        .bind(role.as_str())
        .fetch_all(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to list {} options: {}", role, e)))
    }

    pub async fn count_admins(&self) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE role = 'admin' AND is_active")
            .fetch_one(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to count admins: {}", e)))
    }

    pub async fn count_active_by_role(&self, role: UserRole) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE role = $1 AND is_active")
            .bind(role.as_str())
            .fetch_one(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to count users: {}", e)))
    }

    /// Creates the user; a client also gets its CRM row in the same
    /// transaction.
    pub async fn create(
        &self,
        email: &str,
        password_hash: &str,
        full_name: &str,
        role: UserRole,
    ) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        let mut tx = self
            .db_pool
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, full_name, role, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, TRUE, now(), now())
            "#,
        )
        .bind(id)
        .bind(email.trim())
        .bind(password_hash)
        .bind(full_name.trim())
        .bind(role.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict(format!("A user with email {} already exists", email.trim())),
            other => other,
        })?;

        if role == UserRole::Client {
            sqlx::query("INSERT INTO client_crm (client_id, status, updated_at) VALUES ($1, 'active', now())")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::Database(format!("Failed to create CRM record: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit user creation: {}", e)))?;

        Ok(id)
    }

    pub async fn update_profile(
        &self,
        id: &Uuid,
        email: &str,
        full_name: &str,
        role: UserRole,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = $1, full_name = $2, role = $3, updated_at = now()
            WHERE id = $4
            "#,
        )
        .bind(email.trim())
        .bind(full_name.trim())
        .bind(role.as_str())
        .bind(id)
        .execute(&self.db_pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict(format!("A user with email {} already exists", email.trim())),
            other => other,
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User not found: {}", id)));
        }

        if role == UserRole::Client {
            sqlx::query(
                "INSERT INTO client_crm (client_id, status, updated_at) VALUES ($1, 'active', now()) ON CONFLICT (client_id) DO NOTHING",
            )
            .bind(id)
            .execute(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to create CRM record: {}", e)))?;
        }
        Ok(())
    }

    pub async fn update_name(&self, id: &Uuid, full_name: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET full_name = $1, updated_at = now() WHERE id = $2")
            .bind(full_name.trim())
            .bind(id)
            .execute(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to update name: {}", e)))?;
        Ok(())
    }

    pub async fn set_password_hash(&self, id: &Uuid, password_hash: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = now() WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to update password: {}", e)))?;
        Ok(())
    }

    pub async fn set_active(&self, id: &Uuid, active: bool) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET is_active = $1, updated_at = now() WHERE id = $2")
            .bind(active)
            .bind(id)
            .execute(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to update user status: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User not found: {}", id)));
        }
        Ok(())
    }

    pub async fn record_login(&self, id: &Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_login_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to record login: {}", e)))?;
        Ok(())
    }
}

fn push_user_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    if let Some(role) = filter.role {
        query.push(" AND role = ").push_bind(role.as_str());
    }
    if !filter.include_inactive {
        query.push(" AND is_active");
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = format!("%{}%", escape_like(search.trim()));
        query
            .push(" AND (full_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

/// Escapes LIKE wildcards in user input.
pub fn escape_like(value: &str) -> String {
    value.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_done"), "100\\%\\_done");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_filters_bind_search_and_role() {
        let mut query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users WHERE 1=1");
        push_user_filters(
            &mut query,
            &UserFilter {
                role: Some(UserRole::Client),
                search: Some("acme".to_string()),
                include_inactive: false,
            },
        );
        let sql = query.sql();
        assert!(sql.contains("AND role = $1"));
        assert!(sql.contains("AND is_active"));
        assert!(sql.contains("full_name ILIKE $2 OR email ILIKE $3"));
    }
}
