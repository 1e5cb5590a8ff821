use actix_web::{web, HttpResponse};

use crate::error::AppError;
use crate::handlers::shared::role_options;
use crate::middleware::request_context::{ActionOutcome, ActiveSession, VerifiedForm};
use crate::models::{AppState, FlashMessage, UserRole};
use crate::views::azure::{render, AzureView};

const PAGE_PATH: &str = "/azure";

pub async fn index(session: ActiveSession, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    session.require_any(&[UserRole::Admin, UserRole::Client])?;
    let containers = state.azure.visible_containers(&session.user).await?;
    let clients = if session.user.is_admin() {
        role_options(&state, UserRole::Client).await?
    } else {
        Vec::new()
    };
    let client = state.azure.client();

    let page = session.page("Storage containers");
    let body = render(
        &page,
        &AzureView {
            user: &session.user,
            configured: state.azure.is_configured(),
            account_name: client.map(|c| c.account_name()),
            max_hours: client.map(|c| c.sas_max_hours()).unwrap_or(1),
            containers: &containers,
            clients: &clients,
        },
    )?;
    Ok(page.respond(&body))
}

pub async fn submit(session: ActiveSession, state: web::Data<AppState>, form: VerifiedForm) -> Result<HttpResponse, AppError> {
    session.require_any(&[UserRole::Admin, UserRole::Client])?;
    let outcome = dispatch(&session, &state, &form).await;
    Ok(session.finish(outcome, PAGE_PATH))
}

async fn dispatch(session: &ActiveSession, state: &AppState, form: &VerifiedForm) -> ActionOutcome {
    let user = &session.user;
    match form.action()? {
        "add" => {
            let name = form.required("name", "Container name")?;
            state
                .azure
                .add(user, name, form.optional_uuid("client_id", "Client")?, form.optional("description"))
                .await?;
            Ok(FlashMessage::success(format!("Container {} created", name.trim())))
        }
        "delete" => {
            let container = state.azure.delete(user, &form.uuid("id", "Container")?).await?;
            Ok(FlashMessage::success(format!("Container {} deleted", container.name)))
        }
        "generate_sas" => {
            let permissions: String = form.all("permissions").concat();
            let hours = form.parse_optional::<i64>("hours", "Hours")?.unwrap_or(1);
            let (container, sas) = state
                .azure
                .generate_sas(user, &form.uuid("id", "Container")?, &permissions, hours)
                .await?;
            Ok(FlashMessage::info(format!(
                "SAS URL for {} (expires {}; copy it now, it is not shown again): {}",
                container.name,
                sas.expires_at.format("%Y-%m-%d %H:%M UTC"),
                sas.url
            )))
        }
        other => Err(AppError::BadRequest(format!("Unknown action: {}", other))),
    }
}
