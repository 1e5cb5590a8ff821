use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::db::repositories::{AssignOutcome, AssignmentFilter};
use crate::error::AppError;
use crate::handlers::shared::{query_uuid, role_options};
use crate::middleware::request_context::{ActionOutcome, ActiveSession, VerifiedForm};
use crate::models::{AppState, FlashMessage, UserRole};
use crate::views::assignments::{render, AssignmentsView};

const PAGE_PATH: &str = "/assignments";

#[derive(Debug, Default, Deserialize)]
pub struct AssignmentQuery {
    pub employee_id: Option<String>,
    pub client_id: Option<String>,
}

pub async fn index(
    session: ActiveSession,
    state: web::Data<AppState>,
    query: web::Query<AssignmentQuery>,
) -> Result<HttpResponse, AppError> {
    session.require_admin()?;
    let filter = AssignmentFilter {
        employee_id: query_uuid(query.employee_id.as_deref()),
        client_id: query_uuid(query.client_id.as_deref()),
    };
    let assignments = state.assignment_repository.list(&filter).await?;
    let employees = role_options(&state, UserRole::Employee).await?;
    let clients = role_options(&state, UserRole::Client).await?;
    let employee_filter = filter.employee_id.map(|id| id.to_string()).unwrap_or_default();
    let client_filter = filter.client_id.map(|id| id.to_string()).unwrap_or_default();

    let page = session.page("Assignments");
    let body = render(
        &page,
        &AssignmentsView {
            assignments: &assignments,
            employees: &employees,
            clients: &clients,
            employee_filter: &employee_filter,
            client_filter: &client_filter,
        },
    )?;
    Ok(page.respond(&body))
}

pub async fn submit(session: ActiveSession, state: web::Data<AppState>, form: VerifiedForm) -> Result<HttpResponse, AppError> {
    session.require_admin()?;
    let outcome = dispatch(&session, &state, &form).await;
    Ok(session.finish(outcome, PAGE_PATH))
}

async fn dispatch(session: &ActiveSession, state: &AppState, form: &VerifiedForm) -> ActionOutcome {
    match form.action()? {
        "assign" => {
            let employee = state
                .user_repository
                .get_with_role(&form.uuid("employee_id", "Employee")?, UserRole::Employee)
                .await?;
            let client = state
                .user_repository
                .get_with_role(&form.uuid("client_id", "Client")?, UserRole::Client)
                .await?;
            match state
                .assignment_repository
                .assign(&employee.id, &client.id, &session.user.user_id)
                .await?
            {
                AssignOutcome::Created => {
                    log::info!("{} assigned to client {} by {}", employee.email, client.email, session.user.user_id);
                    Ok(FlashMessage::success(format!("{} now looks after {}", employee.full_name, client.full_name)))
                }
                AssignOutcome::AlreadyAssigned => Ok(FlashMessage::info(format!(
                    "{} is already assigned to {}",
                    employee.full_name, client.full_name
                ))),
            }
        }
        "unassign" => {
            state.assignment_repository.unassign(&form.uuid("id", "Assignment")?).await?;
            Ok(FlashMessage::success("Assignment removed"))
        }
        other => Err(AppError::BadRequest(format!("Unknown action: {}", other))),
    }
}
