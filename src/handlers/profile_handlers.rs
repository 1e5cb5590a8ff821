use actix_web::{web, HttpResponse};

use crate::error::AppError;
use crate::middleware::request_context::{ActionOutcome, ActiveSession, VerifiedForm};
use crate::models::{AppState, FlashMessage};
use crate::views::profile::render;

const PROFILE_PATH: &str = "/profile";

pub async fn show(session: ActiveSession) -> Result<HttpResponse, AppError> {
    let page = session.page("Profile");
    let body = render(&page, &session.user)?;
    Ok(page.respond(&body))
}

pub async fn submit(session: ActiveSession, state: web::Data<AppState>, form: VerifiedForm) -> Result<HttpResponse, AppError> {
    let outcome: ActionOutcome = async {
        match form.action()? {
            "update" => {
                let new_password = form.optional("new_password");
                state
                    .users
                    .update_own_profile(
                        &session.user,
                        form.required("full_name", "Name")?,
                        form.optional("current_password"),
                        new_password,
                    )
                    .await?;
                Ok(FlashMessage::success(if new_password.is_some() {
                    "Profile and password updated"
                } else {
                    "Profile updated"
                }))
            }
            other => Err(AppError::BadRequest(format!("Unknown action: {}", other))),
        }
    }
    .await;
    Ok(session.finish(outcome, PROFILE_PATH))
}
