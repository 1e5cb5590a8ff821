use actix_web::{web, HttpResponse};

use crate::error::AppError;
use crate::handlers::shared::today;
use crate::middleware::request_context::ActiveSession;
use crate::models::AppState;
use crate::views::dashboard::render;

pub async fn index(session: ActiveSession, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let dashboard = state.dashboard.load(&session.user, today()).await?;
    let notice = state.app_settings.get("general.dashboard_notice").await;
    let page = session.page("Dashboard");
    let body = render(&page, &dashboard, Some(notice.trim()).filter(|n| !n.is_empty()))?;
    Ok(page.respond(&body))
}
