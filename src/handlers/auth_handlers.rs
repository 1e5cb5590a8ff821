use actix_web::cookie::{Cookie, SameSite};
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use tera::Tera;

use crate::error::AppError;
use crate::middleware::request_context::{see_other, ActiveSession, VerifiedForm, CSRF_FIELD};
use crate::middleware::session_auth::{sanitize_next, SESSION_COOKIE};
use crate::models::AppState;
use crate::security::tokens::{generate_token, verify_csrf};
use crate::services::session_store::SessionStore;
use crate::views::login::render_login;

pub const LOGIN_CSRF_COOKIE: &str = "portal_login_csrf";

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub next: Option<String>,
    #[serde(rename = "_csrf")]
    pub csrf: Option<String>,
}

fn cookie<'c>(name: &'c str, value: String, secure: bool) -> Cookie<'c> {
    Cookie::build(name, value)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .finish()
}

fn removal(name: &str) -> Cookie<'_> {
    let mut cookie = Cookie::build(name, "").path("/").finish();
    cookie.make_removal();
    cookie
}

/// Renders the form with a fresh double-submit token in both the cookie and
/// the hidden field.
fn login_page(
    state: &AppState,
    templates: &web::Data<Tera>,
    next: &str,
    error: Option<&str>,
    email: &str,
) -> Result<HttpResponse, AppError> {
    let token = generate_token();
    let body = render_login(templates, &token, next, error, email)?;
    let status = if error.is_some() {
        actix_web::http::StatusCode::UNPROCESSABLE_ENTITY
    } else {
        actix_web::http::StatusCode::OK
    };
    Ok(HttpResponse::build(status)
        .cookie(cookie(LOGIN_CSRF_COOKIE, token, state.settings.session.secure_cookie))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .content_type("text/html; charset=utf-8")
        .body(body))
}

pub async fn login_form(
    req: HttpRequest,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    templates: web::Data<Tera>,
    query: web::Query<LoginQuery>,
) -> Result<HttpResponse, AppError> {
    let next = sanitize_next(query.next.as_deref());
    let signed_in = req
        .cookie(SESSION_COOKIE)
        .and_then(|c| sessions.authenticate(c.value()))
        .is_some();
    if signed_in {
        return Ok(see_other(&next));
    }
    login_page(&state, &templates, &next, None, "")
}

pub async fn login(
    req: HttpRequest,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    templates: web::Data<Tera>,
    form: web::Form<LoginForm>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let next = sanitize_next(form.next.as_deref());

    let expected = req.cookie(LOGIN_CSRF_COOKIE).map(|c| c.value().to_string()).unwrap_or_default();
    if !verify_csrf(&expected, form.csrf.as_deref()) {
        log::warn!("Login rejected: {} did not match the login cookie", CSRF_FIELD);
        let expired = AppError::CsrfRejected {
            redirect_to: "/login".to_string(),
        };
        return login_page(&state, &templates, &next, Some(&expired.user_message()), &form.email);
    }

    match state.users.authenticate(&form.email, &form.password).await {
        Ok(user) => {
            log::info!("User {} signed in", user.user_id);
            let session_id = sessions.create(user);
            Ok(HttpResponse::SeeOther()
                .cookie(cookie(SESSION_COOKIE, session_id, state.settings.session.secure_cookie))
                .cookie(removal(LOGIN_CSRF_COOKIE))
                .insert_header((header::LOCATION, next))
                .finish())
        }
        Err(error) => {
            if error.is_server_fault() {
                log::error!("Login failed: {}", error);
            }
            login_page(&state, &templates, &next, Some(&error.user_message()), &form.email)
        }
    }
}

pub async fn logout(session: ActiveSession, _form: VerifiedForm) -> HttpResponse {
    session.store().destroy(&session.id);
    log::info!("User {} signed out", session.user.user_id);
    HttpResponse::SeeOther()
        .cookie(removal(SESSION_COOKIE))
        .insert_header((header::LOCATION, "/login"))
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_flags() {
        let c = cookie(SESSION_COOKIE, "abc".to_string(), true);
        assert_eq!(c.http_only(), Some(true));
        assert_eq!(c.same_site(), Some(SameSite::Lax));
        assert_eq!(c.secure(), Some(true));
        assert_eq!(c.path(), Some("/"));
    }

    #[test]
    fn test_removal_cookie_expires() {
        let c = removal(SESSION_COOKIE);
        assert_eq!(c.value(), "");
        assert!(c.max_age().is_some());
    }
}
