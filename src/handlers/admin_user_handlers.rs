use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::repositories::UserFilter;
use crate::error::AppError;
use crate::middleware::request_context::{ActionOutcome, ActiveSession, VerifiedForm};
use crate::models::{AppState, FlashMessage, UserRole};
use crate::utils::pagination::Pagination;
use crate::views::admin_users::{render_edit, render_list, UserListFilters};

const LIST_PATH: &str = "/admin/users";

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub role: Option<String>,
    pub q: Option<String>,
    pub inactive: Option<String>,
    pub page: Option<String>,
}

pub async fn index(
    session: ActiveSession,
    state: web::Data<AppState>,
    query: web::Query<UserQuery>,
) -> Result<HttpResponse, AppError> {
    session.require_admin()?;
    let filters = UserListFilters {
        role: query.role.clone().unwrap_or_default(),
        q: query.q.clone().unwrap_or_default(),
        include_inactive: query.inactive.as_deref().is_some_and(|v| !v.is_empty()),
    };
    let filter = UserFilter {
        role: filters.role.parse::<UserRole>().ok(),
        search: Some(filters.q.trim().to_string()).filter(|q| !q.is_empty()),
        include_inactive: filters.include_inactive,
    };
    let per_page = state.app_settings.items_per_page().await;
    let pagination = Pagination::from_query(query.page.as_deref(), per_page);
    let users = state.user_repository.list(&filter, pagination).await?;

    let page = session.page("Users");
    let body = render_list(&page, &users, &filters)?;
    Ok(page.respond(&body))
}

pub async fn edit(
    session: ActiveSession,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    session.require_admin()?;
    let user = state.user_repository.get_by_id(&path.into_inner()).await?;
    let page = session.page(format!("User: {}", user.full_name));
    let body = render_edit(&page, &user)?;
    Ok(page.respond(&body))
}

pub async fn create(session: ActiveSession, state: web::Data<AppState>, form: VerifiedForm) -> Result<HttpResponse, AppError> {
    session.require_admin()?;
    let outcome: ActionOutcome = async {
        match form.action()? {
            "create" => {
                let role: UserRole = form.parse_required("role", "Role")?;
                let email = form.required("email", "Email")?;
                state
                    .users
                    .create(
                        email,
                        form.required("full_name", "Name")?,
                        role,
                        form.raw("password").unwrap_or_default(),
                    )
                    .await?;
                Ok(FlashMessage::success(format!("{} account created for {}", role.label(), email)))
            }
            other => Err(AppError::BadRequest(format!("Unknown action: {}", other))),
        }
    }
    .await;
    Ok(session.finish(outcome, LIST_PATH))
}

pub async fn update(
    session: ActiveSession,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    form: VerifiedForm,
) -> Result<HttpResponse, AppError> {
    session.require_admin()?;
    let id = path.into_inner();
    let outcome = dispatch(&session, &state, &id, &form).await;
    Ok(session.finish(outcome, &format!("{}/{}", LIST_PATH, id)))
}

async fn dispatch(session: &ActiveSession, state: &AppState, id: &Uuid, form: &VerifiedForm) -> ActionOutcome {
    let actor = &session.user;
    match form.action()? {
        "update" => {
            state
                .users
                .update(
                    actor,
                    id,
                    form.required("email", "Email")?,
                    form.required("full_name", "Name")?,
                    form.parse_required("role", "Role")?,
                )
                .await?;
            Ok(FlashMessage::success("User saved"))
        }
        "reset_password" => {
            let user = state.users.reset_password(id, form.raw("password").unwrap_or_default()).await?;
            Ok(FlashMessage::success(format!("Password for {} reset", user.email)))
        }
        "deactivate" => {
            let user = state.users.set_active(actor, id, false).await?;
            Ok(FlashMessage::success(format!("{} deactivated", user.email)))
        }
        "activate" => {
            let user = state.users.set_active(actor, id, true).await?;
            Ok(FlashMessage::success(format!("{} reactivated", user.email)))
        }
        other => Err(AppError::BadRequest(format!("Unknown action: {}", other))),
    }
}
