use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::repositories::TimeLogFilter;
use crate::error::AppError;
use crate::handlers::shared::{client_options, query_uuid, role_options};
use crate::middleware::request_context::{ActionOutcome, ActiveSession, VerifiedForm};
use crate::models::{AppState, FlashMessage, UserRole};
use crate::services::time_tracking_service::{billable_value, entry_from_form};
use crate::utils::csv_export::{datetime_cell, CsvWriter};
use crate::utils::date_range::DateRange;
use crate::utils::pagination::Pagination;
use crate::views::templates::format_minutes;
use crate::views::time_tracking::{render_edit, render_index, TimeTrackingView};

const PAGE_PATH: &str = "/time-tracking";

#[derive(Debug, Default, Deserialize)]
pub struct TimeQuery {
    pub employee_id: Option<String>,
    pub client_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub page: Option<String>,
}

impl TimeQuery {
    /// Employees only ever see their own entries.
    fn filter(&self, session: &ActiveSession) -> TimeLogFilter {
        let employee_id = match session.user.role {
            UserRole::Admin => query_uuid(self.employee_id.as_deref()),
            _ => Some(session.user.user_id),
        };
        TimeLogFilter {
            employee_id,
            client_id: query_uuid(self.client_id.as_deref()),
            range: DateRange::from_query(self.from.as_deref(), self.to.as_deref()),
        }
    }
}

pub async fn index(
    session: ActiveSession,
    state: web::Data<AppState>,
    query: web::Query<TimeQuery>,
) -> Result<HttpResponse, AppError> {
    session.require_staff()?;
    let user = &session.user;
    let filter = query.filter(&session);
    let per_page = state.app_settings.items_per_page().await;
    let pagination = Pagination::from_query(query.page.as_deref(), per_page);

    let logs = state.time_log_repository.list(&filter, pagination).await?;
    let totals = state.time_log_repository.totals(&filter).await?;
    let active = state.time_tracking.active_timer(user).await?;
    let clients = client_options(&state, user).await?;
    let employees = if user.is_admin() {
        let mut staff = role_options(&state, UserRole::Employee).await?;
        staff.extend(role_options(&state, UserRole::Admin).await?);
        Some(staff)
    } else {
        None
    };
    let default_billable = state.app_settings.get_bool("time_tracking.default_billable").await;
    let billable_value = if user.is_admin() {
        billable_value(totals.billable_minutes, &state.app_settings.default_hourly_rate().await)
    } else {
        None
    };

    let page = session.page("Time tracking");
    let body = render_index(
        &page,
        &TimeTrackingView {
            active: active.as_ref(),
            clients: &clients,
            employees: employees.as_deref(),
            filter: &filter,
            logs: &logs,
            totals,
            billable_value,
            default_billable,
            current_user: user.user_id,
            is_admin: user.is_admin(),
        },
    )?;
    Ok(page.respond(&body))
}

pub async fn edit(
    session: ActiveSession,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    session.require_staff()?;
    let entry = state.time_tracking.get_for_edit(&session.user, &path.into_inner()).await?;
    let clients = client_options(&state, &session.user).await?;
    let page = session.page("Edit time entry");
    let body = render_edit(&page, &entry, &clients)?;
    Ok(page.respond(&body))
}

pub async fn submit(
    session: ActiveSession,
    state: web::Data<AppState>,
    form: VerifiedForm,
) -> Result<HttpResponse, AppError> {
    session.require_staff()?;
    let outcome = dispatch(&session, &state, &form).await;
    Ok(session.finish(outcome, PAGE_PATH))
}

async fn dispatch(session: &ActiveSession, state: &AppState, form: &VerifiedForm) -> ActionOutcome {
    let user = &session.user;
    match form.action()? {
        "start" => {
            state
                .time_tracking
                .start(
                    user,
                    form.optional_uuid("client_id", "Client")?,
                    form.optional("description").unwrap_or_default(),
                    form.checkbox("billable"),
                )
                .await?;
            Ok(FlashMessage::success("Timer started"))
        }
        "stop" => {
            let entry = state.time_tracking.stop(user).await?;
            Ok(FlashMessage::success(format!("Timer stopped after {}", format_minutes(entry.duration_minutes))))
        }
        "add" => {
            let entry = entry_from_form(form)?;
            state.time_tracking.add_manual(user, &entry).await?;
            Ok(FlashMessage::success("Time entry added"))
        }
        "update" => {
            let id = form.uuid("id", "Entry")?;
            let entry = entry_from_form(form)?;
            state.time_tracking.edit(user, &id, &entry).await?;
            Ok(FlashMessage::success("Time entry updated"))
        }
        "delete" => {
            state.time_tracking.delete(user, &form.uuid("id", "Entry")?).await?;
            Ok(FlashMessage::success("Time entry deleted"))
        }
        other => Err(AppError::BadRequest(format!("Unknown action: {}", other))),
    }
}

/// The filtered range as CSV, without pagination.
pub async fn export(
    session: ActiveSession,
    state: web::Data<AppState>,
    query: web::Query<TimeQuery>,
) -> Result<HttpResponse, AppError> {
    session.require_staff()?;
    let filter = query.filter(&session);
    let logs = state.time_log_repository.list_all(&filter).await?;

    let mut csv = CsvWriter::with_header(&[
        "Employee",
        "Client",
        "Description",
        "Start",
        "End",
        "Minutes",
        "Billable",
    ]);
    for log in &logs {
        csv.push_row([
            log.employee_name.clone(),
            log.client_name.clone().unwrap_or_default(),
            log.description.clone(),
            datetime_cell(Some(&log.start_time)),
            datetime_cell(log.end_time.as_ref()),
            log.duration_minutes.to_string(),
            if log.billable { "yes" } else { "no" }.to_string(),
        ]);
    }
    log::info!("User {} exported {} time entries", session.user.user_id, logs.len());
    Ok(csv.into_response("time-entries.csv"))
}
