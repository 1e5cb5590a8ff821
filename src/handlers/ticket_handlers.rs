use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::repositories::{AssigneeFilter, TicketFilter, TicketScope};
use crate::error::AppError;
use crate::handlers::shared::{client_options, query_uuid, serve_file, staff_options, upload_limits};
use crate::middleware::request_context::{see_other, ActionOutcome, ActiveSession, VerifiedForm};
use crate::models::{AppState, AuthenticatedUser, FlashMessage, TicketPriority, TicketStatus};
use crate::services::ticket_service::BatchAction;
use crate::utils::csv_export::{datetime_cell, CsvWriter};
use crate::utils::pagination::Pagination;
use crate::views::tickets::{render_detail, render_list, render_new, TicketDetailView, TicketListFilters, TicketListView};

const LIST_PATH: &str = "/tickets";
const NEW_PATH: &str = "/tickets/new";
/// Status filter value meaning "everything not resolved or closed".
const OPEN_WORK: &str = "open_work";

#[derive(Debug, Default, Deserialize)]
pub struct TicketQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assignee: Option<String>,
    pub client_id: Option<String>,
    pub q: Option<String>,
    pub page: Option<String>,
}

impl TicketQuery {
    /// Echo of the submitted filters. A first visit without a status filter
    /// shows open work only.
    fn filters(&self) -> TicketListFilters {
        TicketListFilters {
            status: self.status.clone().unwrap_or_else(|| OPEN_WORK.to_string()),
            priority: self.priority.clone().unwrap_or_default(),
            assignee: self.assignee.clone().unwrap_or_default(),
            client_id: self.client_id.clone().unwrap_or_default(),
            q: self.q.clone().unwrap_or_default(),
        }
    }

    fn filter(&self, user: &AuthenticatedUser) -> TicketFilter {
        let echo = self.filters();
        let assignee = match echo.assignee.as_str() {
            "unassigned" => Some(AssigneeFilter::Unassigned),
            other => query_uuid(Some(other)).map(AssigneeFilter::User),
        };
        TicketFilter {
            scope: TicketScope::for_user(user.user_id, user.role),
            status: echo.status.parse::<TicketStatus>().ok(),
            open_only: echo.status == OPEN_WORK,
            priority: echo.priority.parse::<TicketPriority>().ok(),
            assignee,
            client_id: query_uuid(Some(&echo.client_id)),
            search: Some(echo.q.trim().to_string()).filter(|q| !q.is_empty()),
        }
    }
}

pub async fn index(
    session: ActiveSession,
    state: web::Data<AppState>,
    query: web::Query<TicketQuery>,
) -> Result<HttpResponse, AppError> {
    let user = &session.user;
    let filter = query.filter(&session.user);
    let per_page = state.app_settings.items_per_page().await;
    let pagination = Pagination::from_query(query.page.as_deref(), per_page);
    let tickets = state.tickets.repository().list(&filter, pagination).await?;

    let (clients, staff) = if user.is_staff() {
        (client_options(&state, user).await?, staff_options(&state).await?)
    } else {
        (Vec::new(), Vec::new())
    };

    let page = session.page(if user.is_staff() { "Support tickets" } else { "Support" });
    let body = render_list(
        &page,
        &TicketListView {
            user,
            tickets: &tickets,
            filters: &query.filters(),
            clients: &clients,
            staff: &staff,
        },
    )?;
    Ok(page.respond(&body))
}

pub async fn new_form(session: ActiveSession, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let clients = if session.user.is_staff() {
        client_options(&state, &session.user).await?
    } else {
        Vec::new()
    };
    let max_attachments = state.app_settings.max_attachments().await;
    let page = session.page("New ticket");
    let body = render_new(&page, &session.user, &clients, max_attachments)?;
    Ok(page.respond(&body))
}

pub async fn create(
    session: ActiveSession,
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let limits = upload_limits(&state, state.app_settings.max_attachments().await);
    let mut upload = match session.read_upload(&req, payload, limits).await {
        Ok(upload) => upload,
        Err(e @ AppError::CsrfRejected { .. }) => return Err(e),
        Err(e) => return Ok(session.finish(Err(e), NEW_PATH)),
    };

    let files = upload.take_files("attachments");
    let fields = &upload.fields;
    let outcome = async {
        let priority = fields
            .parse_optional::<TicketPriority>("priority", "Priority")?
            .unwrap_or(TicketPriority::Normal);
        state
            .tickets
            .create(
                &session.user,
                fields.optional_uuid("client_id", "Client")?,
                fields.optional("subject").unwrap_or_default(),
                fields.optional("description").unwrap_or_default(),
                priority,
                files,
            )
            .await
    }
    .await;

    match outcome {
        Ok((id, number)) => {
            session.flash(FlashMessage::success(format!("Ticket #{} opened", number)));
            if !session.user.is_staff() {
                if let Some(text) = state.app_settings.ticket_auto_reply().await {
                    session.flash(FlashMessage::info(text));
                }
            }
            Ok(see_other(&format!("{}/{}", LIST_PATH, id)))
        }
        Err(e) => Ok(session.finish(Err(e), NEW_PATH)),
    }
}

pub async fn show(
    session: ActiveSession,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let user = &session.user;
    let ticket = state.tickets.get_visible(user, &path.into_inner()).await?;
    let repository = state.tickets.repository();
    let replies = repository.replies(&ticket.id, user.is_staff()).await?;
    let mut attachments = repository.attachments(&ticket.id).await?;
    if !user.is_staff() {
        // Files on internal notes stay hidden along with the note.
        attachments.retain(|a| a.reply_id.is_none_or(|rid| replies.iter().any(|r| r.id == rid)));
    }
    let staff = if user.is_admin() { staff_options(&state).await? } else { Vec::new() };
    let clients_can_close = state.app_settings.get_bool("tickets.clients_can_close").await;

    let page = session.page(format!("#{} {}", ticket.ticket_number, ticket.subject));
    let body = render_detail(
        &page,
        &TicketDetailView {
            user,
            ticket: &ticket,
            replies: &replies,
            attachments: &attachments,
            staff: &staff,
            clients_can_close,
        },
    )?;
    Ok(page.respond(&body))
}

pub async fn reply(
    session: ActiveSession,
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let ticket_id = path.into_inner();
    let ticket_path = format!("{}/{}", LIST_PATH, ticket_id);
    let limits = upload_limits(&state, state.app_settings.max_attachments().await);
    let mut upload = match session.read_upload(&req, payload, limits).await {
        Ok(upload) => upload,
        Err(e @ AppError::CsrfRejected { .. }) => return Err(e),
        Err(e) => return Ok(session.finish(Err(e), &ticket_path)),
    };

    let files = upload.take_files("attachments");
    let fields = &upload.fields;
    let outcome: ActionOutcome = async {
        let moved_to = state
            .tickets
            .reply(
                &session.user,
                &ticket_id,
                fields.optional("body").unwrap_or_default(),
                fields.checkbox("internal"),
                files,
            )
            .await?;
        Ok(match moved_to {
            Some(status) => FlashMessage::success(format!("Reply added; ticket is now {}", status.label())),
            None => FlashMessage::success("Reply added"),
        })
    }
    .await;
    Ok(session.finish(outcome, &ticket_path))
}

pub async fn update(
    session: ActiveSession,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    form: VerifiedForm,
) -> Result<HttpResponse, AppError> {
    let ticket_id = path.into_inner();
    let outcome = dispatch(&session, &state, &ticket_id, &form).await;
    let location = match (&outcome, form.action()) {
        (Ok(_), Ok("delete")) => LIST_PATH.to_string(),
        _ => format!("{}/{}", LIST_PATH, ticket_id),
    };
    Ok(session.finish(outcome, &location))
}

async fn dispatch(session: &ActiveSession, state: &AppState, ticket_id: &Uuid, form: &VerifiedForm) -> ActionOutcome {
    let user = &session.user;
    let tickets = &state.tickets;
    match form.action()? {
        "status" => {
            let status: TicketStatus = form.parse_required("status", "Status")?;
            let clients_can_close = state.app_settings.get_bool("tickets.clients_can_close").await;
            tickets.change_status(user, ticket_id, status, clients_can_close).await?;
            Ok(FlashMessage::success(format!("Status set to {}", status.label())))
        }
        "close" => {
            let clients_can_close = state.app_settings.get_bool("tickets.clients_can_close").await;
            tickets.change_status(user, ticket_id, TicketStatus::Closed, clients_can_close).await?;
            Ok(FlashMessage::success("Ticket closed"))
        }
        "priority" => {
            let priority: TicketPriority = form.parse_required("priority", "Priority")?;
            tickets.change_priority(user, ticket_id, priority).await?;
            Ok(FlashMessage::success(format!("Priority set to {}", priority.label())))
        }
        "assign" => {
            let assignee = form.optional_uuid("assignee", "Assignee")?;
            tickets.assign(user, ticket_id, assignee).await?;
            Ok(match assignee {
                Some(_) => FlashMessage::success("Ticket assigned"),
                None => FlashMessage::success("Ticket unassigned"),
            })
        }
        "take" => {
            tickets.assign(user, ticket_id, Some(user.user_id)).await?;
            Ok(FlashMessage::success("Ticket assigned to you"))
        }
        "release" => {
            tickets.assign(user, ticket_id, None).await?;
            Ok(FlashMessage::success("Ticket released"))
        }
        "delete" => {
            tickets.delete(user, ticket_id).await?;
            Ok(FlashMessage::success("Ticket deleted"))
        }
        other => Err(AppError::BadRequest(format!("Unknown action: {}", other))),
    }
}

pub async fn batch(session: ActiveSession, state: web::Data<AppState>, form: VerifiedForm) -> Result<HttpResponse, AppError> {
    session.require_staff()?;
    let outcome: ActionOutcome = async {
        let action = BatchAction::from_form(&form)?;
        let ids = form.all_uuids("ticket_ids")?;
        let result = state.tickets.batch(&session.user, action, &ids).await?;
        Ok(if result.failed == 0 {
            FlashMessage::success(result.to_string())
        } else {
            FlashMessage::error(result.to_string())
        })
    }
    .await;
    Ok(session.finish(outcome, LIST_PATH))
}

pub async fn attachment(
    session: ActiveSession,
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let (attachment, file_path) = state
        .tickets
        .attachment_for_download(&session.user, &path.into_inner())
        .await?;
    serve_file(&req, &file_path, &attachment.original_name, &attachment.mime_type).await
}

pub async fn export(
    session: ActiveSession,
    state: web::Data<AppState>,
    query: web::Query<TicketQuery>,
) -> Result<HttpResponse, AppError> {
    let filter = query.filter(&session.user);
    let tickets = state.tickets.repository().list_all(&filter).await?;

    let mut csv = CsvWriter::with_header(&[
        "Number", "Subject", "Client", "Status", "Priority", "Assignee", "Replies", "Created", "Updated", "Closed",
    ]);
    for ticket in &tickets {
        csv.push_row([
            ticket.ticket_number.to_string(),
            ticket.subject.clone(),
            ticket.client_name.clone(),
            ticket.status.label().to_string(),
            ticket.priority.label().to_string(),
            ticket.assignee_name.clone().unwrap_or_default(),
            ticket.reply_count.to_string(),
            datetime_cell(Some(&ticket.created_at)),
            datetime_cell(Some(&ticket.updated_at)),
            datetime_cell(ticket.closed_at.as_ref()),
        ]);
    }
    log::info!("User {} exported {} tickets", session.user.user_id, tickets.len());
    Ok(csv.into_response("tickets.csv"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;

    fn filter_for(query: TicketQuery, role: UserRole) -> TicketFilter {
        let user = AuthenticatedUser {
            user_id: Uuid::new_v4(),
            email: "u@example.com".to_string(),
            full_name: "U".to_string(),
            role,
        };
        query.filter(&user)
    }

    #[test]
    fn test_first_visit_shows_open_work() {
        let filter = filter_for(TicketQuery::default(), UserRole::Admin);
        assert!(filter.open_only);
        assert_eq!(filter.status, None);
        assert_eq!(filter.scope, TicketScope::All);
    }

    #[test]
    fn test_explicit_filters() {
        let filter = filter_for(
            TicketQuery {
                status: Some("".to_string()),
                priority: Some("urgent".to_string()),
                assignee: Some("unassigned".to_string()),
                q: Some("  printer ".to_string()),
                ..Default::default()
            },
            UserRole::Client,
        );
        assert!(!filter.open_only);
        assert_eq!(filter.priority, Some(TicketPriority::Urgent));
        assert_eq!(filter.assignee, Some(AssigneeFilter::Unassigned));
        assert_eq!(filter.search.as_deref(), Some("printer"));
        assert!(matches!(filter.scope, TicketScope::Client(_)));
    }
}
