use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::LOCATION,
    web, Error, HttpMessage, HttpResponse,
};
use futures_util::future::{ok, Ready};
use log::debug;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use crate::services::session_store::SessionStore;

pub const SESSION_COOKIE: &str = "portal_session";

/// Id of the session that authenticated the current request.
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

/// Resolves the session cookie to an `AuthenticatedUser` and stores it in
/// request extensions. Requests without a live session are redirected to
/// the login page with the original path in `next`.
#[derive(Clone, Default)]
pub struct SessionAuthentication;

impl<S, B> Transform<S, ServiceRequest> for SessionAuthentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = SessionAuthenticationMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(SessionAuthenticationMiddleware {
            service: Rc::new(service),
        })
    }
}

pub struct SessionAuthenticationMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for SessionAuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let store = req.app_data::<web::Data<SessionStore>>().cloned();
        let session_id = req.cookie(SESSION_COOKIE).map(|c| c.value().to_string());

        let resolved = match (store, session_id) {
            (Some(store), Some(id)) => store.authenticate(&id).map(|user| (id, user)),
            (None, _) => {
                log::error!("SessionStore missing from app data; every request will be unauthenticated");
                None
            }
            _ => None,
        };

        match resolved {
            Some((id, user)) => {
                debug!("Session resolved for user {} on {} {}", user.user_id, req.method(), req.path());
                req.extensions_mut().insert(user);
                req.extensions_mut().insert(SessionId(id));
                let service = self.service.clone();
                Box::pin(async move {
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                })
            }
            None => {
                debug!("No live session for {} {}; redirecting to login", req.method(), req.path());
                let location = login_redirect_target(req.method() == actix_web::http::Method::GET, req.path(), req.query_string());
                let response = HttpResponse::SeeOther()
                    .insert_header((LOCATION, location))
                    .finish();
                Box::pin(async move { Ok(req.into_response(response).map_into_right_body()) })
            }
        }
    }
}

/// GET requests come back to where they started after login; form posts
/// cannot be replayed so they go to the plain login page.
pub fn login_redirect_target(is_get: bool, path: &str, query: &str) -> String {
    if !is_get || path == "/" {
        return "/login".to_string();
    }
    let next = if query.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, query)
    };
    format!("/login?next={}", urlencoding::encode(&next))
}

/// Accepts only local absolute paths as post-login targets.
pub fn sanitize_next(next: Option<&str>) -> String {
    match next.map(str::trim) {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_redirect_keeps_get_target() {
        assert_eq!(
            login_redirect_target(true, "/tickets", "status=open"),
            "/login?next=%2Ftickets%3Fstatus%3Dopen"
        );
        assert_eq!(login_redirect_target(false, "/tickets", ""), "/login");
        assert_eq!(login_redirect_target(true, "/", ""), "/login");
    }

    #[test]
    fn test_sanitize_next_rejects_external_targets() {
        assert_eq!(sanitize_next(Some("/time-tracking")), "/time-tracking");
        assert_eq!(sanitize_next(Some("https://evil.example")), "/");
        assert_eq!(sanitize_next(Some("//evil.example")), "/");
        assert_eq!(sanitize_next(Some("/\\evil.example")), "/");
        assert_eq!(sanitize_next(None), "/");
    }
}
