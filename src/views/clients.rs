use serde::Serialize;
use tera::Context;

use crate::db::repositories::ClientRecord;
use crate::error::AppError;
use crate::models::{AuthenticatedUser, CrmStatus};
use crate::services::client_service::ClientDetail;
use crate::utils::pagination::Page;
use crate::views::layout::{Options, PageContext, Pager};

#[derive(Debug, Default, Serialize)]
pub struct ClientListFilters {
    pub status: String,
    pub q: String,
}

fn status_options() -> Options {
    CrmStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), s.label().to_string()))
        .collect()
}

pub fn render_list(
    page: &PageContext,
    clients: &Page<ClientRecord>,
    filters: &ClientListFilters,
) -> Result<String, AppError> {
    let pairs = [("status", filters.status.clone()), ("q", filters.q.clone())];
    let mut context = Context::new();
    context.insert("clients", clients);
    context.insert("filters", filters);
    context.insert("status_options", &status_options());
    context.insert("pager", &Pager::new(clients, "/clients", &pairs));
    page.render("clients/list.html", context)
}

pub fn render_detail(page: &PageContext, user: &AuthenticatedUser, detail: &ClientDetail) -> Result<String, AppError> {
    let mut context = Context::new();
    context.insert("url", &format!("/clients/{}", detail.record.client_id));
    context.insert("is_admin", &user.is_admin());
    context.insert("record", &detail.record);
    context.insert("status_options", &status_options());
    context.insert("assignments", &detail.assignments);
    context.insert("subscriptions", &detail.subscriptions);
    context.insert("recent_tickets", &detail.recent_tickets);
    context.insert("recent_time", &detail.recent_time);
    page.render("clients/detail.html", context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use crate::views::layout::tests::{page_for, user};
    use chrono::Utc;
    use uuid::Uuid;

    fn detail() -> ClientDetail {
        ClientDetail {
            record: ClientRecord {
                client_id: Uuid::new_v4(),
                full_name: "Cleo Client".to_string(),
                email: "cleo@example.com".to_string(),
                is_active: true,
                company_name: Some("Acme <Ltd>".to_string()),
                phone: None,
                address: None,
                website: None,
                notes: Some("Prefers email".to_string()),
                status: CrmStatus::Active,
                updated_at: Utc::now(),
            },
            assignments: Vec::new(),
            subscriptions: Vec::new(),
            recent_tickets: Vec::new(),
            recent_time: Vec::new(),
        }
    }

    #[test]
    fn test_employee_sees_contact_and_notes_form_only() {
        let employee = user(UserRole::Employee);
        let html = render_detail(&page_for(Some(employee.clone())), &employee, &detail()).unwrap();
        assert!(html.contains("Acme &lt;Ltd&gt;"));
        assert!(html.contains(r#"name="action" value="notes""#));
        assert!(html.contains(">Prefers email</textarea>"));
        assert!(!html.contains("Manage assignments"));
        assert!(html.contains("Nobody assigned"));
    }

    #[test]
    fn test_admin_edits_full_record() {
        let admin = user(UserRole::Admin);
        let html = render_detail(&page_for(Some(admin.clone())), &admin, &detail()).unwrap();
        assert!(html.contains(r#"name="action" value="update""#));
        assert!(html.contains(r#"<option value="active" selected>"#));
        assert!(html.contains("Manage assignments"));
    }
}
