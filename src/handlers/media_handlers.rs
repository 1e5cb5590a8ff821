use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::repositories::MediaKind;
use crate::error::AppError;
use crate::handlers::shared::{serve_file, upload_limits};
use crate::middleware::request_context::{ActionOutcome, ActiveSession, VerifiedForm};
use crate::models::{AppState, FlashMessage};
use crate::services::media_service::UploadOutcome;
use crate::utils::pagination::Pagination;
use crate::views::media::render;

const PAGE_PATH: &str = "/media";

#[derive(Debug, Default, Deserialize)]
pub struct MediaQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub page: Option<String>,
}

pub async fn index(
    session: ActiveSession,
    state: web::Data<AppState>,
    query: web::Query<MediaQuery>,
) -> Result<HttpResponse, AppError> {
    session.require_staff()?;
    let kind = query.kind.as_deref().and_then(MediaKind::parse);
    let per_page = state.app_settings.items_per_page().await;
    let pagination = Pagination::from_query(query.page.as_deref(), per_page);
    let items = state.media.repository().list(kind, pagination).await?;

    let page = session.page("Media library");
    let body = render(&page, &items, kind, state.settings.uploads.max_bytes)?;
    Ok(page.respond(&body))
}

pub async fn upload(
    session: ActiveSession,
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    session.require_staff()?;
    let mut upload = match session.read_upload(&req, payload, upload_limits(&state, 1)).await {
        Ok(upload) => upload,
        Err(e @ AppError::CsrfRejected { .. }) => return Err(e),
        Err(e) => return Ok(session.finish(Err(e), PAGE_PATH)),
    };

    let file = upload.take_files("file").into_iter().next();
    let fields = &upload.fields;
    let outcome: ActionOutcome = async {
        let file = file.ok_or_else(|| AppError::Validation("Choose a file to upload".to_string()))?;
        let original = file.original_name.clone();
        match state
            .media
            .upload(&session.user, file, fields.optional("title"), fields.optional("alt_text"))
            .await?
        {
            UploadOutcome::Stored(_) => Ok(FlashMessage::success(format!("Uploaded {}", original))),
            UploadOutcome::Duplicate(title) => Ok(FlashMessage::info(format!(
                "{} is already in the library as \"{}\"",
                original, title
            ))),
        }
    }
    .await;
    Ok(session.finish(outcome, PAGE_PATH))
}

pub async fn submit(session: ActiveSession, state: web::Data<AppState>, form: VerifiedForm) -> Result<HttpResponse, AppError> {
    session.require_staff()?;
    let outcome = dispatch(&state, &form).await;
    Ok(session.finish(outcome, PAGE_PATH))
}

async fn dispatch(state: &AppState, form: &VerifiedForm) -> ActionOutcome {
    let id = form.uuid("id", "File")?;
    match form.action()? {
        "update" => {
            state
                .media
                .update_details(&id, form.required("title", "Title")?, form.optional("alt_text"))
                .await?;
            Ok(FlashMessage::success("File details saved"))
        }
        "delete" => {
            let item = state.media.delete(&id).await?;
            Ok(FlashMessage::success(format!("{} deleted", item.title)))
        }
        "share" => {
            state.media.repository().get(&id).await?;
            let token = state.media.share_token(id)?;
            let base = state.settings.server.url.trim_end_matches('/');
            Ok(FlashMessage::info(format!(
                "Share link (valid {} hours): {}/share/{}",
                state.media.share_link_hours(),
                base,
                token
            )))
        }
        other => Err(AppError::BadRequest(format!("Unknown action: {}", other))),
    }
}

pub async fn file(
    session: ActiveSession,
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    session.require_staff()?;
    let (item, file_path) = state.media.file(&path.into_inner()).await?;
    serve_file(&req, &file_path, &item.original_name, &item.mime_type).await
}

/// Public download through a signed share link.
pub async fn shared(
    state: web::Data<AppState>,
    req: HttpRequest,
    token: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let (item, file_path) = state.media.shared_file(&token.into_inner()).await.map_err(|e| {
        log::info!("Share link rejected: {}", e);
        AppError::NotFound("This link is invalid or has expired".to_string())
    })?;
    serve_file(&req, &file_path, &item.original_name, &item.mime_type).await
}
