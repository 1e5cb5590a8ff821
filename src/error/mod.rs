use actix_web::{error::ResponseError, http::header, http::StatusCode, HttpResponse};
use sqlx::error::Error as SqlxError;
use thiserror::Error;

use crate::views::layout::render_error_page;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("External service error: {0}")]
    External(String),
    #[error("Invalid security token")]
    CsrfRejected { redirect_to: String },
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
}

impl AppError {
    /// Message safe to show to the person who submitted the form.
    /// Database and internal details stay in the log.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::PayloadTooLarge(msg) => msg.clone(),
            AppError::Forbidden(_) => "You are not allowed to do that.".to_string(),
            AppError::Unauthorized(_) => "Please sign in again.".to_string(),
            AppError::CsrfRejected { .. } => {
                "Your form expired. Please reload the page and try again.".to_string()
            }
            AppError::External(_) => {
                "The storage service did not accept the request. Please try again later.".to_string()
            }
            AppError::Database(_) | AppError::Internal(_) | AppError::Configuration(_) => {
                "Something went wrong. The error has been logged.".to_string()
            }
        }
    }

    /// Whether the error reflects a fault on our side rather than bad input.
    pub fn is_server_fault(&self) -> bool {
        matches!(
            self,
            AppError::Database(_) | AppError::Internal(_) | AppError::Configuration(_) | AppError::External(_)
        )
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::Unauthorized(_) => HttpResponse::SeeOther()
                .insert_header((header::LOCATION, "/login"))
                .finish(),
            AppError::Forbidden(_) => HttpResponse::SeeOther()
                .insert_header((header::LOCATION, "/"))
                .finish(),
            AppError::CsrfRejected { redirect_to } => HttpResponse::SeeOther()
                .insert_header((header::LOCATION, redirect_to.as_str()))
                .finish(),
            _ => {
                let status = self.status_code();
                if self.is_server_fault() {
                    log::error!("Request failed: {}", self);
                }
                HttpResponse::build(status)
                    .content_type("text/html; charset=utf-8")
                    .body(render_error_page(status, &self.user_message()))
            }
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthorized(_) => StatusCode::SEE_OTHER,
            AppError::Forbidden(_) => StatusCode::SEE_OTHER,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::External(_) => StatusCode::BAD_GATEWAY,
            AppError::CsrfRejected { .. } => StatusCode::SEE_OTHER,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl From<SqlxError> for AppError {
    fn from(error: SqlxError) -> Self {
        match error {
            SqlxError::RowNotFound => AppError::NotFound("Record not found".to_string()),
            SqlxError::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict("A record with the same values already exists".to_string())
            }
            SqlxError::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                AppError::Conflict("The record is still referenced by other records".to_string())
            }
            _ => AppError::Database(error.to_string()),
        }
    }
}

impl From<actix_multipart::MultipartError> for AppError {
    fn from(error: actix_multipart::MultipartError) -> Self {
        AppError::BadRequest(format!("Multipart error: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON serialization error: {}", error))
    }
}

impl From<bigdecimal::ParseBigDecimalError> for AppError {
    fn from(error: bigdecimal::ParseBigDecimalError) -> Self {
        AppError::Validation(format!("Invalid decimal value: {}", error))
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        AppError::Internal(format!("I/O error: {}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::External(format!("HTTP request failed: {}", error))
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unauthorized_redirects_to_login() {
        let response = AppError::Unauthorized("no session".to_string()).error_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/login"
        );
    }

    #[test]
    fn forbidden_redirects_to_dashboard() {
        let response = AppError::Forbidden("admin only".to_string()).error_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/");
    }

    #[test]
    fn csrf_rejection_redirects_back() {
        let response = AppError::CsrfRejected {
            redirect_to: "/tickets".to_string(),
        }
        .error_response();
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/tickets");
    }

    #[test]
    fn database_details_are_not_shown_to_users() {
        let error = AppError::Database("relation \"users\" does not exist".to_string());
        assert!(!error.user_message().contains("relation"));
        assert!(error.is_server_fault());
    }

    #[test]
    fn validation_message_is_passed_through() {
        let error = AppError::Validation("End time must be after start time".to_string());
        assert_eq!(error.user_message(), "End time must be after start time");
        assert_eq!(error.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let error: AppError = SqlxError::RowNotFound.into();
        assert!(matches!(error, AppError::NotFound(_)));
    }
}
