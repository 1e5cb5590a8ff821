use serde::Serialize;
use tera::Context;

use crate::db::repositories::User;
use crate::error::AppError;
use crate::models::UserRole;
use crate::utils::pagination::Page;
use crate::views::layout::{Options, PageContext, Pager};

const PATH: &str = "/admin/users";

#[derive(Debug, Default, Serialize)]
pub struct UserListFilters {
    pub role: String,
    pub q: String,
    pub include_inactive: bool,
}

fn role_options() -> Options {
    UserRole::ALL
        .iter()
        .map(|r| (r.as_str().to_string(), r.label().to_string()))
        .collect()
}

pub fn render_list(page: &PageContext, users: &Page<User>, filters: &UserListFilters) -> Result<String, AppError> {
    let pairs = [
        ("role", filters.role.clone()),
        ("q", filters.q.clone()),
        ("inactive", if filters.include_inactive { "1".to_string() } else { String::new() }),
    ];
    let mut context = Context::new();
    context.insert("users", users);
    context.insert("filters", filters);
    context.insert("role_options", &role_options());
    context.insert("pager", &Pager::new(users, PATH, &pairs));
    page.render("admin_users/list.html", context)
}

pub fn render_edit(page: &PageContext, user: &User) -> Result<String, AppError> {
    let mut context = Context::new();
    context.insert("url", &format!("{}/{}", PATH, user.id));
    context.insert("account", user);
    context.insert("role_options", &role_options());
    page.render("admin_users/edit.html", context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::layout::tests::{page_for, user};
    use chrono::Utc;
    use uuid::Uuid;

    fn account(is_active: bool) -> User {
        User {
            id: Uuid::new_v4(),
            email: "eve@example.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            full_name: "Eve Employee".to_string(),
            role: UserRole::Employee,
            is_active,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_edit_never_renders_password_hash() {
        let html = render_edit(&page_for(Some(user(UserRole::Admin))), &account(true)).unwrap();
        assert!(!html.contains("argon2id"));
        assert!(html.contains(r#"<option value="employee" selected>"#));
        assert!(html.contains("last login - &middot; active"));
        assert!(html.contains("Deactivate account"));
    }

    #[test]
    fn test_list_pager_keeps_inactive_flag() {
        let users = Page::new(
            vec![account(false)],
            crate::utils::pagination::Pagination::new(Some(1), 1),
            3,
        );
        let filters = UserListFilters {
            include_inactive: true,
            ..Default::default()
        };
        let html = render_list(&page_for(Some(user(UserRole::Admin))), &users, &filters).unwrap();
        assert!(html.contains("deactivated"));
        assert!(html.contains("&#x2F;admin&#x2F;users?inactive=1&amp;page=2"));
    }
}
