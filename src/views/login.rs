use actix_web::web;
use tera::{Context, Tera};

use crate::error::AppError;
use crate::views::layout::PageContext;

/// Sign-in form. The CSRF token here is the double-submit value that was
/// also set as a cookie, since there is no session yet.
pub fn render_login(
    templates: &web::Data<Tera>,
    csrf_token: &str,
    next: &str,
    error: Option<&str>,
    email: &str,
) -> Result<String, AppError> {
    let page = PageContext::new("Sign in", None, csrf_token.to_string(), Vec::new(), templates.clone());
    let mut context = Context::new();
    context.insert("next", next);
    context.insert("error", &error);
    context.insert("email", email);
    page.render("login.html", context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::templates;

    #[test]
    fn test_login_page_keeps_next_and_escapes_email() {
        let templates = web::Data::new(templates::build().unwrap());
        let html = render_login(
            &templates,
            "tok",
            "/tickets?status=open",
            Some("Invalid email or password"),
            "\"x\"@example.com",
        )
        .unwrap();
        assert!(html.contains(r#"name="next" value="&#x2F;tickets?status=open""#));
        assert!(html.contains("&quot;x&quot;@example.com"));
        assert!(html.contains("Invalid email or password"));
        assert!(html.contains(r#"name="_csrf" value="tok""#));
        assert!(!html.contains(r#"action="/logout""#));
    }
}
