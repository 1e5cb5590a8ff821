use std::path::Path;

use actix_files::NamedFile;
use actix_web::http::header::{self, ContentDisposition, DispositionParam, DispositionType, HeaderValue};
use actix_web::{HttpRequest, HttpResponse};
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::db::repositories::AssignmentFilter;
use crate::error::AppError;
use crate::models::{AppState, AuthenticatedUser, UserRole};
use crate::utils::mime_utils::is_inline_safe;
use crate::utils::multipart_utils::UploadLimits;

/// Value/label pairs for select boxes.
pub type SelectOptions = Vec<(String, String)>;

pub fn upload_limits(state: &AppState, max_files: usize) -> UploadLimits {
    let uploads = &state.settings.uploads;
    UploadLimits {
        max_file_bytes: uploads.max_bytes as u64,
        max_total_bytes: uploads.max_total_bytes as u64,
        max_files,
    }
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Ids from query strings; an unparseable id means "no filter".
pub fn query_uuid(value: Option<&str>) -> Option<Uuid> {
    value.and_then(|v| Uuid::parse_str(v.trim()).ok())
}

/// Clients the user may pick: every active client for admins, the assigned
/// ones for employees.
pub async fn client_options(state: &AppState, user: &AuthenticatedUser) -> Result<SelectOptions, AppError> {
    match user.role {
        UserRole::Employee => {
            let assignments = state
                .assignment_repository
                .list(&AssignmentFilter {
                    employee_id: Some(user.user_id),
                    ..Default::default()
                })
                .await?;
            Ok(assignments
                .into_iter()
                .map(|a| {
                    let label = match a.company_name.filter(|c| !c.is_empty()) {
                        Some(company) => format!("{} ({})", a.client_name, company),
                        None => a.client_name,
                    };
                    (a.client_id.to_string(), label)
                })
                .collect())
        }
        UserRole::Admin | UserRole::Client => role_options(state, UserRole::Client).await,
    }
}

pub async fn role_options(state: &AppState, role: UserRole) -> Result<SelectOptions, AppError> {
    Ok(state
        .user_repository
        .options_for_role(role)
        .await?
        .into_iter()
        .map(|u| (u.id.to_string(), u.full_name))
        .collect())
}

/// Admins and employees, for assignee pickers.
pub async fn staff_options(state: &AppState) -> Result<SelectOptions, AppError> {
    let mut staff = role_options(state, UserRole::Admin).await?;
    staff.extend(role_options(state, UserRole::Employee).await?);
    staff.sort_by(|a, b| a.1.to_lowercase().cmp(&b.1.to_lowercase()));
    Ok(staff)
}

/// Streams a stored upload under its original name. Only types browsers
/// render safely are served inline; everything else is an attachment.
pub async fn serve_file(
    req: &HttpRequest,
    path: &Path,
    original_name: &str,
    mime_type: &str,
) -> Result<HttpResponse, AppError> {
    let file = NamedFile::open_async(path).await.map_err(|e| {
        log::warn!("Stored file {} unreadable: {}", path.display(), e);
        AppError::NotFound("File not found".to_string())
    })?;

    let disposition = if is_inline_safe(mime_type) {
        DispositionType::Inline
    } else {
        DispositionType::Attachment
    };
    let mut response = file
        .set_content_disposition(ContentDisposition {
            disposition,
            parameters: vec![DispositionParam::Filename(original_name.to_string())],
        })
        .into_response(req);
    response
        .headers_mut()
        .insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    if let Ok(value) = HeaderValue::from_str(mime_type) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    Ok(response)
}
