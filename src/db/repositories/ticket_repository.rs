use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::db::repositories::user_repository::escape_like;
use crate::error::AppError;
use crate::models::{TicketPriority, TicketStatus, UserRole};
use crate::utils::pagination::{Page, Pagination};

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub ticket_number: i64,
    pub client_id: Uuid,
    pub client_name: String,
    pub created_by: Option<Uuid>,
    pub created_by_name: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub assignee_name: Option<String>,
    pub subject: String,
    pub description: String,
    #[sqlx(try_from = "String")]
    pub status: TicketStatus,
    #[sqlx(try_from = "String")]
    pub priority: TicketPriority,
    pub reply_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct TicketReply {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Option<Uuid>,
    pub author_name: Option<String>,
    pub author_role: Option<String>,
    pub body: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct TicketAttachment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub reply_id: Option<Uuid>,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

/// Metadata of a file already written to the upload directory.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
}

/// Which tickets a user may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TicketScope {
    #[default]
    All,
    /// Tickets of clients assigned to the employee, plus tickets assigned to them.
    Employee(Uuid),
    Client(Uuid),
}

impl TicketScope {
    pub fn for_user(user_id: Uuid, role: UserRole) -> Self {
        match role {
            UserRole::Admin => TicketScope::All,
            UserRole::Employee => TicketScope::Employee(user_id),
            UserRole::Client => TicketScope::Client(user_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssigneeFilter {
    Unassigned,
    User(Uuid),
}

#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub scope: TicketScope,
    pub status: Option<TicketStatus>,
    /// Excludes resolved and closed tickets when no status is chosen.
    pub open_only: bool,
    pub priority: Option<TicketPriority>,
    pub assignee: Option<AssigneeFilter>,
    pub client_id: Option<Uuid>,
    pub search: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub client_id: Uuid,
    pub created_by: Uuid,
    pub subject: String,
    pub description: String,
    pub priority: TicketPriority,
}

const TICKET_SELECT: &str = r#"
    SELECT t.id, t.ticket_number, t.client_id, cu.full_name AS client_name,
           t.created_by, cb.full_name AS created_by_name,
           t.assigned_to, au.full_name AS assignee_name,
           t.subject, t.description, t.status, t.priority,
           (SELECT COUNT(*) FROM ticket_replies r WHERE r.ticket_id = t.id) AS reply_count,
           t.created_at, t.updated_at, t.closed_at
    FROM support_tickets t
    JOIN users cu ON cu.id = t.client_id
    LEFT JOIN users cb ON cb.id = t.created_by
    LEFT JOIN users au ON au.id = t.assigned_to
    WHERE 1=1
"#;

const ATTACHMENT_COLUMNS: &str =
    "id, ticket_id, reply_id, original_name, stored_name, mime_type, size_bytes, created_at";

/// SQL fragment maintaining `closed_at` when the status column is set from `$1`.
const CLOSED_AT_FOR_STATUS: &str =
    "closed_at = CASE WHEN $1 IN ('resolved', 'closed') THEN COALESCE(closed_at, now()) ELSE NULL END";

pub struct TicketRepository {
    db_pool: PgPool,
}

impl TicketRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn list(&self, filter: &TicketFilter, pagination: Pagination) -> Result<Page<Ticket>, AppError> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM support_tickets t WHERE 1=1");
        push_ticket_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to count tickets: {}", e)))?;

        let mut query = QueryBuilder::<Postgres>::new(TICKET_SELECT);
        push_ticket_filters(&mut query, filter);
        query
            .push(" ORDER BY t.updated_at DESC LIMIT ")
            .push_bind(pagination.limit())
            .push(" OFFSET ")
            .push_bind(pagination.offset());

        let tickets = query
            .build_query_as::<Ticket>()
            .fetch_all(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list tickets: {}", e)))?;

        Ok(Page::new(tickets, pagination, total))
    }

    pub async fn list_all(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, AppError> {
        let mut query = QueryBuilder::<Postgres>::new(TICKET_SELECT);
        push_ticket_filters(&mut query, filter);
        query.push(" ORDER BY t.ticket_number ASC");
        query
            .build_query_as::<Ticket>()
            .fetch_all(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to export tickets: {}", e)))
    }

    pub async fn count(&self, filter: &TicketFilter) -> Result<i64, AppError> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM support_tickets t WHERE 1=1");
        push_ticket_filters(&mut query, filter);
        query
            .build_query_scalar::<i64>()
            .fetch_one(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to count tickets: {}", e)))
    }

    pub async fn get(&self, id: &Uuid) -> Result<Ticket, AppError> {
        sqlx::query_as::<_, Ticket>(&format!("{} AND t.id = $1", TICKET_SELECT))
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch ticket: {}", e)))?
            .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))
    }

    /// Whether `scope` can see the ticket.
    pub async fn is_visible(&self, id: &Uuid, scope: TicketScope) -> Result<bool, AppError> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT EXISTS (SELECT 1 FROM support_tickets t WHERE t.id = ");
        query.push_bind(*id);
        push_scope(&mut query, scope);
        query.push(")");
        query
            .build_query_scalar::<bool>()
            .fetch_one(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to check ticket access: {}", e)))
    }

    /// Inserts the ticket and returns its id and human-readable number.
    pub async fn create(&self, new: &NewTicket, attachments: &[NewAttachment]) -> Result<(Uuid, i64), AppError> {
        let id = Uuid::new_v4();
        let mut tx = self
            .db_pool
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let number: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO support_tickets (id, client_id, created_by, subject, description, status, priority)
            VALUES ($1, $2, $3, $4, $5, 'open', $6)
            RETURNING ticket_number
            "#,
        )
        .bind(id)
        .bind(new.client_id)
        .bind(new.created_by)
        .bind(new.subject.trim())
        .bind(new.description.trim())
        .bind(new.priority.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to create ticket: {}", e)))?;

        for attachment in attachments {
            insert_attachment(&mut tx, &id, None, &new.created_by, attachment).await?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit ticket: {}", e)))?;
        Ok((id, number))
    }

    pub async fn replies(&self, ticket_id: &Uuid, include_internal: bool) -> Result<Vec<TicketReply>, AppError> {
        sqlx::query_as::<_, TicketReply>(
            r#"
            SELECT r.id, r.ticket_id, r.author_id, u.full_name AS author_name, u.role AS author_role,
                   r.body, r.is_internal, r.created_at
            FROM ticket_replies r
            LEFT JOIN users u ON u.id = r.author_id
            WHERE r.ticket_id = $1 AND ($2 OR NOT r.is_internal)
            ORDER BY r.created_at ASC
            "#,
        )
        .bind(ticket_id)
        .bind(include_internal)
        .fetch_all(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to list replies: {}", e)))
    }

    /// Stores a reply with its attachments and applies the status change the
    /// reply implies, all in one transaction.
    pub async fn add_reply(
        &self,
        ticket_id: &Uuid,
        author_id: &Uuid,
        body: &str,
        is_internal: bool,
        new_status: Option<TicketStatus>,
        attachments: &[NewAttachment],
    ) -> Result<Uuid, AppError> {
        let reply_id = Uuid::new_v4();
        let mut tx = self
            .db_pool
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        sqlx::query(
            "INSERT INTO ticket_replies (id, ticket_id, author_id, body, is_internal) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(reply_id)
        .bind(ticket_id)
        .bind(author_id)
        .bind(body.trim())
        .bind(is_internal)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to add reply: {}", e)))?;

        for attachment in attachments {
            insert_attachment(&mut tx, ticket_id, Some(reply_id), author_id, attachment).await?;
        }

        match new_status {
            Some(status) => {
                sqlx::query(&format!(
                    "UPDATE support_tickets SET status = $1, {}, updated_at = now() WHERE id = $2",
                    CLOSED_AT_FOR_STATUS
                ))
                .bind(status.as_str())
                .bind(ticket_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::Database(format!("Failed to update ticket status: {}", e)))?;
            }
            None => {
                sqlx::query("UPDATE support_tickets SET updated_at = now() WHERE id = $1")
                    .bind(ticket_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| AppError::Database(format!("Failed to touch ticket: {}", e)))?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit reply: {}", e)))?;
        Ok(reply_id)
    }

    pub async fn set_status(&self, id: &Uuid, status: TicketStatus) -> Result<(), AppError> {
        let result = sqlx::query(&format!(
            "UPDATE support_tickets SET status = $1, {}, updated_at = now() WHERE id = $2",
            CLOSED_AT_FOR_STATUS
        ))
        .bind(status.as_str())
        .bind(id)
        .execute(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to update ticket status: {}", e)))?;
        not_found_if_unchanged(result.rows_affected())
    }

    pub async fn set_priority(&self, id: &Uuid, priority: TicketPriority) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE support_tickets SET priority = $1, updated_at = now() WHERE id = $2")
            .bind(priority.as_str())
            .bind(id)
            .execute(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to update ticket priority: {}", e)))?;
        not_found_if_unchanged(result.rows_affected())
    }

    pub async fn assign(&self, id: &Uuid, assignee: Option<Uuid>) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE support_tickets SET assigned_to = $1, updated_at = now() WHERE id = $2")
            .bind(assignee)
            .bind(id)
            .execute(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to assign ticket: {}", e)))?;
        not_found_if_unchanged(result.rows_affected())
    }

    /// Deletes the ticket and returns the stored names of its attachments so
    /// the files can be removed.
    pub async fn delete(&self, id: &Uuid) -> Result<Vec<String>, AppError> {
        let stored: Vec<String> = sqlx::query_scalar("SELECT stored_name FROM ticket_attachments WHERE ticket_id = $1")
            .bind(id)
            .fetch_all(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list attachments: {}", e)))?;

        let result = sqlx::query("DELETE FROM support_tickets WHERE id = $1")
            .bind(id)
            .execute(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete ticket: {}", e)))?;
        not_found_if_unchanged(result.rows_affected())?;
        Ok(stored)
    }

    pub async fn attachments(&self, ticket_id: &Uuid) -> Result<Vec<TicketAttachment>, AppError> {
        sqlx::query_as::<_, TicketAttachment>(&format!(
            "SELECT {} FROM ticket_attachments WHERE ticket_id = $1 ORDER BY created_at",
            ATTACHMENT_COLUMNS
        ))
        .bind(ticket_id)
        .fetch_all(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to list attachments: {}", e)))
    }

    pub async fn reply_is_internal(&self, reply_id: &Uuid) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>("SELECT is_internal FROM ticket_replies WHERE id = $1")
            .bind(reply_id)
            .fetch_optional(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch reply: {}", e)))
            .map(|internal| internal.unwrap_or(false))
    }

    pub async fn get_attachment(&self, id: &Uuid) -> Result<TicketAttachment, AppError> {
        sqlx::query_as::<_, TicketAttachment>(&format!(
            "SELECT {} FROM ticket_attachments WHERE id = $1",
            ATTACHMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch attachment: {}", e)))?
        .ok_or_else(|| AppError::NotFound("Attachment not found".to_string()))
    }
}

async fn insert_attachment(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    ticket_id: &Uuid,
    reply_id: Option<Uuid>,
    uploaded_by: &Uuid,
    attachment: &NewAttachment,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO ticket_attachments (id, ticket_id, reply_id, original_name, stored_name, mime_type, size_bytes, uploaded_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(ticket_id)
    .bind(reply_id)
    .bind(&attachment.original_name)
    .bind(&attachment.stored_name)
    .bind(&attachment.mime_type)
    .bind(attachment.size_bytes)
    .bind(uploaded_by)
    .execute(&mut **tx)
    .await
    .map_err(|e| AppError::Database(format!("Failed to save attachment: {}", e)))?;
    Ok(())
}

fn not_found_if_unchanged(rows: u64) -> Result<(), AppError> {
    if rows == 0 {
        Err(AppError::NotFound("Ticket not found".to_string()))
    } else {
        Ok(())
    }
}

fn push_scope(query: &mut QueryBuilder<'_, Postgres>, scope: TicketScope) {
    match scope {
        TicketScope::All => {}
        TicketScope::Client(client_id) => {
            query.push(" AND t.client_id = ").push_bind(client_id);
        }
        TicketScope::Employee(employee_id) => {
            query
                .push(" AND (t.assigned_to = ")
                .push_bind(employee_id)
                .push(" OR t.client_id IN (SELECT a.client_id FROM employee_client_assignments a WHERE a.employee_id = ")
                .push_bind(employee_id)
                .push("))");
        }
    }
}

fn push_ticket_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &TicketFilter) {
    push_scope(query, filter.scope);

    match filter.status {
        Some(status) => {
            query.push(" AND t.status = ").push_bind(status.as_str());
        }
        None if filter.open_only => {
            query.push(" AND t.status NOT IN ('resolved', 'closed')");
        }
        None => {}
    }
    if let Some(priority) = filter.priority {
        query.push(" AND t.priority = ").push_bind(priority.as_str());
    }
    match filter.assignee {
        Some(AssigneeFilter::Unassigned) => {
            query.push(" AND t.assigned_to IS NULL");
        }
        Some(AssigneeFilter::User(user_id)) => {
            query.push(" AND t.assigned_to = ").push_bind(user_id);
        }
        None => {}
    }
    if let Some(client_id) = filter.client_id {
        query.push(" AND t.client_id = ").push_bind(client_id);
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", escape_like(search));
        query
            .push(" AND (t.subject ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR t.description ILIKE ")
            .push_bind(pattern)
            .push(" OR t.ticket_number::text = ")
            .push_bind(search.trim_start_matches('#').to_string())
            .push(")");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_sql(filter: &TicketFilter) -> String {
        let mut query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM support_tickets t WHERE 1=1");
        push_ticket_filters(&mut query, filter);
        query.sql().to_string()
    }

    #[test]
    fn test_client_scope_limits_to_own_tickets() {
        let sql = filter_sql(&TicketFilter {
            scope: TicketScope::Client(Uuid::new_v4()),
            ..Default::default()
        });
        assert!(sql.contains("t.client_id = $1"));
        assert!(!sql.contains("employee_client_assignments"));
    }

    #[test]
    fn test_employee_scope_uses_assignments() {
        let sql = filter_sql(&TicketFilter {
            scope: TicketScope::Employee(Uuid::new_v4()),
            status: Some(TicketStatus::Open),
            ..Default::default()
        });
        assert!(sql.contains("employee_client_assignments a WHERE a.employee_id = $2"));
        assert!(sql.contains("t.status = $3"));
    }

    #[test]
    fn test_open_only_and_unassigned() {
        let sql = filter_sql(&TicketFilter {
            open_only: true,
            assignee: Some(AssigneeFilter::Unassigned),
            ..Default::default()
        });
        assert!(sql.contains("NOT IN ('resolved', 'closed')"));
        assert!(sql.contains("t.assigned_to IS NULL"));
    }

    #[test]
    fn test_scope_for_role() {
        let id = Uuid::new_v4();
        assert_eq!(TicketScope::for_user(id, UserRole::Admin), TicketScope::All);
        assert_eq!(TicketScope::for_user(id, UserRole::Client), TicketScope::Client(id));
    }
}
