use actix_multipart::Multipart;
use actix_web::{
    dev::Payload, http::header, web, FromRequest, HttpMessage, HttpRequest, HttpResponse,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use tera::Tera;

use crate::error::AppError;
use crate::middleware::session_auth::SessionId;
use crate::models::{AuthenticatedUser, FlashMessage, UserRole};
use crate::security::tokens::verify_csrf;
use crate::services::session_store::SessionStore;
use crate::utils::form::FormFields;
use crate::utils::multipart_utils::{read_upload_form, UploadForm, UploadLimits};
use crate::views::layout::PageContext;

pub const CSRF_FIELD: &str = "_csrf";

/// Outcome of a form action: the flash to show, or the error to report.
pub type ActionOutcome = Result<FlashMessage, AppError>;

/// The authenticated session behind the current request.
#[derive(Clone)]
pub struct ActiveSession {
    pub id: String,
    pub user: AuthenticatedUser,
    store: web::Data<SessionStore>,
    templates: web::Data<Tera>,
}

impl ActiveSession {
    pub fn new(id: String, user: AuthenticatedUser, store: web::Data<SessionStore>, templates: web::Data<Tera>) -> Self {
        Self { id, user, store, templates }
    }

    pub fn require_any(&self, roles: &[UserRole]) -> Result<(), AppError> {
        self.user.require_any(roles)
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        self.user.require_admin()
    }

    pub fn require_staff(&self) -> Result<(), AppError> {
        self.user.require_staff()
    }

    pub fn csrf_token(&self) -> String {
        self.store.csrf_token(&self.id).unwrap_or_default()
    }

    pub fn flash(&self, flash: FlashMessage) {
        self.store.push_flash(&self.id, flash);
    }

    /// Page chrome for a GET render; consumes pending flashes.
    pub fn page(&self, title: impl Into<String>) -> PageContext {
        PageContext::new(
            title,
            Some(self.user.clone()),
            self.csrf_token(),
            self.store.take_flashes(&self.id),
            self.templates.clone(),
        )
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Turns an action outcome into a flash and a redirect-after-POST.
    pub fn finish(&self, outcome: ActionOutcome, location: &str) -> HttpResponse {
        match outcome {
            Ok(flash) => self.flash(flash),
            Err(error) => {
                if error.is_server_fault() {
                    log::error!("Form action by user {} failed: {}", self.user.user_id, error);
                } else {
                    log::info!("Form action by user {} rejected: {}", self.user.user_id, error);
                }
                self.flash(FlashMessage::error(error.user_message()));
            }
        }
        see_other(location)
    }

    /// Checks a CSRF token that arrived outside an urlencoded body
    /// (multipart uploads).
    pub fn verify_csrf(&self, submitted: Option<&str>, back: &str) -> Result<(), AppError> {
        check_csrf(&self.store, &self.id, submitted, back)
    }

    /// Reads a multipart form whose `_csrf` field is checked before any
    /// file part reaches disk.
    pub async fn read_upload(
        &self,
        req: &HttpRequest,
        payload: Multipart,
        limits: UploadLimits,
    ) -> Result<UploadForm, AppError> {
        let back = referer_path(req);
        read_upload_form(payload, limits, |fields: &FormFields| {
            self.verify_csrf(fields.raw(CSRF_FIELD), &back)
        })
        .await
    }
}

impl FromRequest for ActiveSession {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let extensions = req.extensions();
        let user = extensions.get::<AuthenticatedUser>().cloned();
        let session_id = extensions.get::<SessionId>().cloned();
        let store = req.app_data::<web::Data<SessionStore>>().cloned();
        let templates = req.app_data::<web::Data<Tera>>().cloned();

        ready(match (user, session_id, store, templates) {
            (Some(user), Some(SessionId(id)), Some(store), Some(templates)) => {
                Ok(ActiveSession::new(id, user, store, templates))
            }
            (_, _, _, None) => {
                log::error!("Template registry missing for path {}", req.path());
                Err(AppError::Internal("Template registry not configured".to_string()))
            }
            _ => {
                log::error!("Session context missing for path {}", req.path());
                Err(AppError::Unauthorized("Session context not found".to_string()))
            }
        })
    }
}

/// Urlencoded form body whose `_csrf` field matched the session token.
/// Extraction fails before the handler runs, so no mutation happens on a
/// forged or stale submission.
pub struct VerifiedForm(pub FormFields);

impl std::ops::Deref for VerifiedForm {
    type Target = FormFields;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequest for VerifiedForm {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let session_id = req.extensions().get::<SessionId>().cloned();
        let store = req.app_data::<web::Data<SessionStore>>().cloned();
        let back = referer_path(req);
        let body = web::Bytes::from_request(req, payload);

        Box::pin(async move {
            let body = body
                .await
                .map_err(|e| AppError::BadRequest(format!("Could not read form body: {}", e)))?;
            let fields = FormFields::parse(&body);

            let (Some(SessionId(id)), Some(store)) = (session_id, store) else {
                return Err(AppError::Unauthorized("Form submitted without a session".to_string()));
            };

            check_csrf(&store, &id, fields.raw(CSRF_FIELD), &back)?;
            Ok(VerifiedForm(fields))
        })
    }
}

fn check_csrf(store: &SessionStore, session_id: &str, submitted: Option<&str>, back: &str) -> Result<(), AppError> {
    let expected = store.csrf_token(session_id).unwrap_or_default();
    if verify_csrf(&expected, submitted) {
        return Ok(());
    }
    log::warn!("CSRF token mismatch; redirecting to {}", back);
    let error = AppError::CsrfRejected {
        redirect_to: back.to_string(),
    };
    store.push_flash(session_id, FlashMessage::error(error.user_message()));
    Err(error)
}

/// Local path of the Referer header, falling back to the dashboard. Only the
/// path and query are kept so a forged header cannot redirect off-site.
pub fn referer_path(req: &HttpRequest) -> String {
    req.headers()
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| url::Url::parse(value).ok())
        .map(|url| match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        })
        .unwrap_or_else(|| "/".to_string())
}

pub fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location))
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_referer_path_strips_origin() {
        let req = TestRequest::default()
            .insert_header((header::REFERER, "https://evil.example/tickets?status=open"))
            .to_http_request();
        assert_eq!(referer_path(&req), "/tickets?status=open");

        let req = TestRequest::default().to_http_request();
        assert_eq!(referer_path(&req), "/");
    }

    #[test]
    fn test_see_other_sets_location() {
        let response = see_other("/media");
        assert_eq!(response.status(), actix_web::http::StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/media");
    }
}
