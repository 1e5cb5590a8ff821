use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::request_context::{ActionOutcome, ActiveSession, VerifiedForm};
use crate::models::{AppState, FlashMessage};
use crate::services::settings_service::SettingGroup;
use crate::views::settings::render;

#[derive(Debug, Default, Deserialize)]
pub struct SettingsQuery {
    pub tab: Option<String>,
}

pub async fn index(
    session: ActiveSession,
    state: web::Data<AppState>,
    query: web::Query<SettingsQuery>,
) -> Result<HttpResponse, AppError> {
    session.require_admin()?;
    let group = SettingGroup::from_query(query.tab.as_deref());
    let values = state.app_settings.tab(group).await?;
    let pending_legacy = state.app_settings.pending_legacy_count().await?;

    let page = session.page("Settings");
    let body = render(&page, group, &values, pending_legacy)?;
    Ok(page.respond(&body))
}

pub async fn submit(session: ActiveSession, state: web::Data<AppState>, form: VerifiedForm) -> Result<HttpResponse, AppError> {
    session.require_admin()?;
    let group = SettingGroup::from_query(form.optional("tab"));
    let outcome: ActionOutcome = async {
        match form.action()? {
            "save" => {
                let saved = state.app_settings.save_tab(group, &form, &session.user.user_id).await?;
                Ok(FlashMessage::success(format!("{} settings saved ({} values)", group.label(), saved)))
            }
            "migrate_legacy" => match state.app_settings.migrate_legacy().await? {
                0 => Ok(FlashMessage::info("Nothing to migrate")),
                moved => Ok(FlashMessage::success(format!("Migrated {} legacy setting(s)", moved))),
            },
            other => Err(AppError::BadRequest(format!("Unknown action: {}", other))),
        }
    }
    .await;
    Ok(session.finish(outcome, &format!("/admin/settings?tab={}", group.as_str())))
}
