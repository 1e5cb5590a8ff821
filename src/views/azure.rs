use serde::Serialize;
use tera::Context;

use crate::db::repositories::AzureContainer;
use crate::error::AppError;
use crate::models::AuthenticatedUser;
use crate::views::layout::PageContext;

/// Permission letters with their labels, in the order SAS tokens list them.
const PERMISSIONS: &[(&str, &str)] = &[
    ("r", "Read"),
    ("a", "Add"),
    ("c", "Create"),
    ("w", "Write"),
    ("d", "Delete"),
    ("l", "List"),
];

pub struct AzureView<'a> {
    pub user: &'a AuthenticatedUser,
    pub configured: bool,
    pub account_name: Option<&'a str>,
    pub max_hours: i64,
    pub containers: &'a [AzureContainer],
    pub clients: &'a [(String, String)],
}

#[derive(Serialize)]
struct PermissionChoice {
    letter: &'static str,
    label: &'static str,
    default: bool,
}

/// Read and list are pre-checked; clients get nothing else.
fn permission_choices(user: &AuthenticatedUser) -> Vec<PermissionChoice> {
    PERMISSIONS
        .iter()
        .map(|(letter, label)| PermissionChoice {
            letter,
            label,
            default: matches!(*letter, "r" | "l"),
        })
        .filter(|p| user.is_staff() || p.default)
        .collect()
}

pub fn render(page: &PageContext, view: &AzureView<'_>) -> Result<String, AppError> {
    let mut context = Context::new();
    context.insert("configured", &view.configured);
    context.insert("account_name", &view.account_name);
    context.insert("max_hours", &view.max_hours);
    context.insert("containers", view.containers);
    context.insert("clients", view.clients);
    context.insert("is_admin", &view.user.is_admin());
    context.insert("permissions", &permission_choices(view.user));
    page.render("azure.html", context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use crate::views::layout::tests::{page_for, user};
    use chrono::Utc;
    use uuid::Uuid;

    fn container() -> AzureContainer {
        AzureContainer {
            id: Uuid::new_v4(),
            name: "acme-files".to_string(),
            client_id: None,
            client_name: None,
            description: None,
            created_by_name: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_clients_only_get_read_and_list() {
        let client = user(UserRole::Client);
        let containers = [container()];
        let view = AzureView {
            user: &client,
            configured: true,
            account_name: Some("portalstore"),
            max_hours: 24,
            containers: &containers,
            clients: &[],
        };
        let html = render(&page_for(Some(client.clone())), &view).unwrap();
        assert!(html.contains(r#"value="r" checked> Read"#));
        assert!(html.contains(r#"value="l" checked> List"#));
        assert!(!html.contains(r#"value="w""#));
        assert!(!html.contains("Add container"));
        assert!(html.contains(r#"max="24""#));
    }

    #[test]
    fn test_unconfigured_storage_hides_actions() {
        let admin = user(UserRole::Admin);
        let containers = [container()];
        let view = AzureView {
            user: &admin,
            configured: false,
            account_name: None,
            max_hours: 1,
            containers: &containers,
            clients: &[],
        };
        let html = render(&page_for(Some(admin.clone())), &view).unwrap();
        assert!(html.contains("Azure storage is not configured."));
        assert!(!html.contains("Generate SAS"));
    }
}
