use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::repositories::ClientFilter;
use crate::error::AppError;
use crate::middleware::request_context::{ActionOutcome, ActiveSession, VerifiedForm};
use crate::models::{AppState, CrmStatus, FlashMessage, UserRole};
use crate::services::client_service::crm_update_from_form;
use crate::utils::pagination::Pagination;
use crate::views::clients::{render_detail, render_list, ClientListFilters};

#[derive(Debug, Default, Deserialize)]
pub struct ClientQuery {
    pub status: Option<String>,
    pub q: Option<String>,
    pub page: Option<String>,
}

pub async fn index(
    session: ActiveSession,
    state: web::Data<AppState>,
    query: web::Query<ClientQuery>,
) -> Result<HttpResponse, AppError> {
    session.require_staff()?;
    let filters = ClientListFilters {
        status: query.status.clone().unwrap_or_default(),
        q: query.q.clone().unwrap_or_default(),
    };
    let filter = ClientFilter {
        status: filters.status.parse::<CrmStatus>().ok(),
        search: Some(filters.q.trim().to_string()).filter(|q| !q.is_empty()),
        assigned_to: None,
    };
    let per_page = state.app_settings.items_per_page().await;
    let pagination = Pagination::from_query(query.page.as_deref(), per_page);
    let clients = state.clients.list(&session.user, filter, pagination).await?;

    let title = if session.user.role == UserRole::Employee { "My clients" } else { "Clients" };
    let page = session.page(title);
    let body = render_list(&page, &clients, &filters)?;
    Ok(page.respond(&body))
}

pub async fn show(
    session: ActiveSession,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    session.require_staff()?;
    let detail = state.clients.detail(&session.user, &path.into_inner()).await?;
    let page = session.page(detail.record.display_name());
    let body = render_detail(&page, &session.user, &detail)?;
    Ok(page.respond(&body))
}

pub async fn submit(
    session: ActiveSession,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    form: VerifiedForm,
) -> Result<HttpResponse, AppError> {
    session.require_staff()?;
    let client_id = path.into_inner();
    let outcome = dispatch(&session, &state, &client_id, &form).await;
    Ok(session.finish(outcome, &format!("/clients/{}", client_id)))
}

async fn dispatch(session: &ActiveSession, state: &AppState, client_id: &Uuid, form: &VerifiedForm) -> ActionOutcome {
    match form.action()? {
        "update" => {
            let update = crm_update_from_form(form)?;
            state.clients.update(&session.user, client_id, &update).await?;
            Ok(FlashMessage::success("Client details saved"))
        }
        "notes" => {
            state
                .clients
                .update_notes(&session.user, client_id, form.optional("notes"))
                .await?;
            Ok(FlashMessage::success("Notes saved"))
        }
        other => Err(AppError::BadRequest(format!("Unknown action: {}", other))),
    }
}
