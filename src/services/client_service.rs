use std::sync::Arc;

use uuid::Uuid;

use crate::db::repositories::{
    Assignment, AssignmentFilter, AssignmentRepository, ClientCrmRepository, ClientFilter, ClientRecord,
    ClientSubscription, CrmUpdate, SubscriptionFilter, SubscriptionRepository, Ticket, TicketFilter,
    TicketRepository, TicketScope, TimeLog, TimeLogFilter, TimeLogRepository,
};
use crate::error::AppError;
use crate::models::{AuthenticatedUser, CrmStatus, UserRole};
use crate::utils::form::FormFields;
use crate::utils::pagination::{Page, Pagination};

const RECENT_ITEMS: i64 = 10;
const MAX_FIELD_CHARS: usize = 500;

/// Everything the client detail page shows.
#[derive(Debug, Clone)]
pub struct ClientDetail {
    pub record: ClientRecord,
    pub assignments: Vec<Assignment>,
    pub subscriptions: Vec<ClientSubscription>,
    pub recent_tickets: Vec<Ticket>,
    pub recent_time: Vec<TimeLog>,
}

pub fn crm_update_from_form(form: &FormFields) -> Result<CrmUpdate, AppError> {
    let field = |key: &str, label: &str| -> Result<Option<String>, AppError> {
        match form.optional_string(key) {
            Some(value) if value.chars().count() > MAX_FIELD_CHARS => Err(AppError::Validation(format!(
                "{} must be at most {} characters",
                label, MAX_FIELD_CHARS
            ))),
            other => Ok(other),
        }
    };

    let website = field("website", "Website")?;
    if let Some(site) = website.as_deref() {
        let parsed = url::Url::parse(site)
            .map_err(|_| AppError::Validation(format!("{} is not a valid URL", site)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::Validation("Website must start with http:// or https://".to_string()));
        }
    }

    Ok(CrmUpdate {
        company_name: field("company_name", "Company")?,
        phone: field("phone", "Phone")?,
        address: field("address", "Address")?,
        website,
        notes: form.optional_string("notes"),
        status: form.parse_optional::<CrmStatus>("status", "Status")?.unwrap_or(CrmStatus::Active),
    })
}

pub struct ClientService {
    clients: Arc<ClientCrmRepository>,
    assignments: Arc<AssignmentRepository>,
    subscriptions: Arc<SubscriptionRepository>,
    tickets: Arc<TicketRepository>,
    time_logs: Arc<TimeLogRepository>,
}

impl ClientService {
    pub fn new(
        clients: Arc<ClientCrmRepository>,
        assignments: Arc<AssignmentRepository>,
        subscriptions: Arc<SubscriptionRepository>,
        tickets: Arc<TicketRepository>,
        time_logs: Arc<TimeLogRepository>,
    ) -> Self {
        Self {
            clients,
            assignments,
            subscriptions,
            tickets,
            time_logs,
        }
    }

    /// Employees only reach clients assigned to them; other clients look
    /// missing.
    async fn ensure_visible(&self, user: &AuthenticatedUser, client_id: &Uuid) -> Result<(), AppError> {
        user.require_staff()?;
        if user.role == UserRole::Employee && !self.assignments.is_assigned(&user.user_id, client_id).await? {
            return Err(AppError::NotFound("Client not found".to_string()));
        }
        Ok(())
    }

    pub async fn list(
        &self,
        user: &AuthenticatedUser,
        mut filter: ClientFilter,
        pagination: Pagination,
    ) -> Result<Page<ClientRecord>, AppError> {
        user.require_staff()?;
        if user.role == UserRole::Employee {
            filter.assigned_to = Some(user.user_id);
        }
        self.clients.list(&filter, pagination).await
    }

    pub async fn detail(&self, user: &AuthenticatedUser, client_id: &Uuid) -> Result<ClientDetail, AppError> {
        self.ensure_visible(user, client_id).await?;
        let record = self.clients.get(client_id).await?;
        let assignments = self
            .assignments
            .list(&AssignmentFilter {
                client_id: Some(*client_id),
                ..Default::default()
            })
            .await?;
        let subscriptions = self
            .subscriptions
            .list(&SubscriptionFilter {
                client_id: Some(*client_id),
                ..Default::default()
            })
            .await?;
        let recent_tickets = self
            .tickets
            .list(
                &TicketFilter {
                    scope: TicketScope::for_user(user.user_id, user.role),
                    client_id: Some(*client_id),
                    ..Default::default()
                },
                Pagination::new(Some(1), RECENT_ITEMS),
            )
            .await?
            .items;
        let recent_time = self
            .time_logs
            .list(
                &TimeLogFilter {
                    client_id: Some(*client_id),
                    employee_id: (user.role == UserRole::Employee).then_some(user.user_id),
                    ..Default::default()
                },
                Pagination::new(Some(1), RECENT_ITEMS),
            )
            .await?
            .items;

        Ok(ClientDetail {
            record,
            assignments,
            subscriptions,
            recent_tickets,
            recent_time,
        })
    }

    /// Admins edit every CRM field.
    pub async fn update(&self, user: &AuthenticatedUser, client_id: &Uuid, update: &CrmUpdate) -> Result<(), AppError> {
        user.require_admin()?;
        self.clients.get(client_id).await?;
        self.clients.update(client_id, update).await
    }

    /// Assigned employees may keep notes on their clients.
    pub async fn update_notes(&self, user: &AuthenticatedUser, client_id: &Uuid, notes: Option<&str>) -> Result<(), AppError> {
        self.ensure_visible(user, client_id).await?;
        self.clients.update_notes(client_id, notes).await
    }
}
