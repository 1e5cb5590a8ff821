use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use serde::Serialize;
use tera::{Context, Tera};

use crate::error::AppError;
use crate::models::{AuthenticatedUser, FlashMessage, UserRole};
use crate::utils::pagination::Page;
use crate::views::templates::{self, ERROR_TEMPLATE, STYLESHEET};

/// Value/label pairs for select boxes; serialized as `[value, label]`.
pub type Options = Vec<(String, String)>;

type NavLink = (&'static str, &'static str);

const ADMIN_NAV: &[NavLink] = &[
    ("/", "Dashboard"),
    ("/time-tracking", "Time"),
    ("/tickets", "Tickets"),
    ("/clients", "Clients"),
    ("/care-plans", "Care plans"),
    ("/subscriptions", "Subscriptions"),
    ("/media", "Media"),
    ("/assignments", "Assignments"),
    ("/azure", "Storage"),
    ("/admin/users", "Users"),
    ("/admin/settings", "Settings"),
];

const EMPLOYEE_NAV: &[NavLink] = &[
    ("/", "Dashboard"),
    ("/time-tracking", "Time"),
    ("/tickets", "Tickets"),
    ("/clients", "My clients"),
    ("/media", "Media"),
];

const CLIENT_NAV: &[NavLink] = &[
    ("/", "Dashboard"),
    ("/tickets", "Support"),
    ("/my-plan", "My plan"),
    ("/azure", "Storage"),
];

fn nav_for(user: Option<&AuthenticatedUser>) -> &'static [NavLink] {
    match user.map(|u| u.role) {
        Some(UserRole::Admin) => ADMIN_NAV,
        Some(UserRole::Employee) => EMPLOYEE_NAV,
        Some(UserRole::Client) => CLIENT_NAV,
        None => &[],
    }
}

/// Page chrome as base.html sees it under `page`.
#[derive(Serialize)]
struct Chrome<'a> {
    title: &'a str,
    csrf_token: &'a str,
    user: Option<&'a AuthenticatedUser>,
    nav: &'static [NavLink],
    flashes: &'a [FlashMessage],
}

/// Everything the page shell needs besides the body.
#[derive(Clone)]
pub struct PageContext {
    pub title: String,
    pub user: Option<AuthenticatedUser>,
    pub csrf_token: String,
    pub flashes: Vec<FlashMessage>,
    templates: web::Data<Tera>,
}

impl PageContext {
    pub fn new(
        title: impl Into<String>,
        user: Option<AuthenticatedUser>,
        csrf_token: String,
        flashes: Vec<FlashMessage>,
        templates: web::Data<Tera>,
    ) -> Self {
        Self {
            title: title.into(),
            user,
            csrf_token,
            flashes,
            templates,
        }
    }

    /// Renders a page template with the chrome inserted as `page`.
    pub fn render(&self, template: &str, mut context: Context) -> Result<String, AppError> {
        let chrome = Chrome {
            title: &self.title,
            csrf_token: &self.csrf_token,
            user: self.user.as_ref(),
            nav: nav_for(self.user.as_ref()),
            flashes: &self.flashes,
        };
        context.insert("page", &chrome);
        templates::render(&self.templates, template, &context)
    }

    pub fn respond(&self, html: &str) -> HttpResponse {
        HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(html.to_string())
    }
}

/// Previous/next links that keep the current filters.
#[derive(Debug, Serialize)]
pub struct Pager {
    pub page: i64,
    pub total: i64,
    pub total_pages: i64,
    pub previous: Option<String>,
    pub next: Option<String>,
}

impl Pager {
    pub fn new<T>(page: &Page<T>, base_path: &str, filters: &[(&str, String)]) -> Self {
        let link = |target: i64| {
            let mut query: Vec<String> = filters
                .iter()
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
                .collect();
            query.push(format!("page={}", target));
            format!("{}?{}", base_path, query.join("&"))
        };
        Self {
            page: page.page,
            total: page.total,
            total_pages: page.total_pages(),
            previous: page.has_previous().then(|| link(page.page - 1)),
            next: page.has_next().then(|| link(page.page + 1)),
        }
    }
}

/// Query string of the non-empty filter values, for export links.
pub fn query_string(pairs: &[(&str, String)]) -> String {
    pairs
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Minimal standalone page for errors raised before a handler could render.
pub fn render_error_page(status: StatusCode, message: &str) -> String {
    let mut context = Context::new();
    context.insert("code", &status.as_u16());
    context.insert("reason", status.canonical_reason().unwrap_or("Error"));
    context.insert("message", message);
    context.insert("css", STYLESHEET);
    Tera::one_off(ERROR_TEMPLATE, &context, true).unwrap_or_else(|e| {
        log::error!("Error page could not be rendered: {}", e);
        format!("{} {}", status.as_u16(), status.canonical_reason().unwrap_or("Error"))
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::utils::pagination::Pagination;
    use uuid::Uuid;

    pub fn user(role: UserRole) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            email: "a@example.com".to_string(),
            full_name: "Ada <Admin>".to_string(),
            role,
        }
    }

    pub fn page_for(user: Option<AuthenticatedUser>) -> PageContext {
        PageContext::new(
            "Page",
            user,
            "tok123".to_string(),
            Vec::new(),
            web::Data::new(templates::build().unwrap()),
        )
    }

    #[test]
    fn test_chrome_escapes_flash_and_title() {
        let mut page = page_for(None);
        page.title = "<b>Tickets</b>".to_string();
        page.flashes = vec![FlashMessage::error("<img src=x>")];
        let html = page.render("profile.html", profile_context()).unwrap();
        assert!(html.contains("&lt;b&gt;Tickets&lt;&#x2F;b&gt;"));
        assert!(html.contains(r#"<div class="flash flash-error">&lt;img src=x&gt;</div>"#));
        assert!(!html.contains(r#"action="/logout""#));
    }

    #[test]
    fn test_nav_follows_role() {
        let html = page_for(Some(user(UserRole::Client)))
            .render("profile.html", profile_context())
            .unwrap();
        assert!(html.contains(r#"<a href="/my-plan">My plan</a>"#));
        assert!(!html.contains(r#"href="/admin/users""#));
        assert!(html.contains(r#"action="/logout""#));
        assert!(html.contains(r#"name="_csrf" value="tok123""#));
        assert!(html.contains("Ada &lt;Admin&gt;"));
    }

    fn profile_context() -> Context {
        let mut context = Context::new();
        context.insert("user", &user(UserRole::Client));
        context
    }

    #[test]
    fn test_pager_keeps_filters() {
        let page: Page<u8> = Page::new(vec![], Pagination::new(Some(2), 10), 30);
        let pager = Pager::new(&page, "/tickets", &[("status", "open".to_string()), ("q", String::new())]);
        assert_eq!(pager.previous.as_deref(), Some("/tickets?status=open&page=1"));
        assert_eq!(pager.next.as_deref(), Some("/tickets?status=open&page=3"));
        assert_eq!(pager.total_pages, 3);
    }

    #[test]
    fn test_query_string_skips_empty_values() {
        let pairs = [("status", "open".to_string()), ("assignee", String::new()), ("q", "vpn down".to_string())];
        assert_eq!(query_string(&pairs), "status=open&q=vpn%20down");
    }

    #[test]
    fn test_error_page_escapes_message() {
        let html = render_error_page(StatusCode::NOT_FOUND, "<script>x</script>");
        assert!(html.contains("404 Not Found"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
