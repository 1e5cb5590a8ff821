use tera::Context;

use crate::db::repositories::Assignment;
use crate::error::AppError;
use crate::views::layout::PageContext;

pub struct AssignmentsView<'a> {
    pub assignments: &'a [Assignment],
    pub employees: &'a [(String, String)],
    pub clients: &'a [(String, String)],
    pub employee_filter: &'a str,
    pub client_filter: &'a str,
}

pub fn render(page: &PageContext, view: &AssignmentsView<'_>) -> Result<String, AppError> {
    let mut context = Context::new();
    context.insert("assignments", view.assignments);
    context.insert("employees", view.employees);
    context.insert("clients", view.clients);
    context.insert("employee_filter", view.employee_filter);
    context.insert("client_filter", view.client_filter);
    page.render("assignments.html", context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use crate::views::layout::tests::{page_for, user};
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_client_filter_preselects_assign_form() {
        let client_id = Uuid::new_v4();
        let clients = vec![(client_id.to_string(), "Cleo Client".to_string())];
        let assignments = vec![Assignment {
            id: Uuid::new_v4(),
            employee_id: Uuid::new_v4(),
            employee_name: "Eve Employee".to_string(),
            client_id,
            client_name: "Cleo Client".to_string(),
            company_name: Some("Acme".to_string()),
            assigned_by_name: None,
            assigned_at: Utc::now(),
        }];
        let client_filter = client_id.to_string();
        let view = AssignmentsView {
            assignments: &assignments,
            employees: &[],
            clients: &clients,
            employee_filter: "",
            client_filter: &client_filter,
        };
        let html = render(&page_for(Some(user(UserRole::Admin))), &view).unwrap();
        assert_eq!(html.matches(&format!(r#"<option value="{}" selected>"#, client_id)).count(), 2);
        assert!(html.contains("Cleo Client (Acme)</a>"));
    }
}
