use std::collections::HashMap;

use serde::Serialize;
use tera::Context;
use uuid::Uuid;

use crate::db::repositories::{Ticket, TicketAttachment, TicketReply};
use crate::error::AppError;
use crate::models::{AuthenticatedUser, TicketPriority, TicketStatus};
use crate::utils::pagination::Page;
use crate::views::layout::{query_string, Options, PageContext, Pager};

/// Current list filters as submitted, echoed back into the form and pager.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TicketListFilters {
    pub status: String,
    pub priority: String,
    pub assignee: String,
    pub client_id: String,
    pub q: String,
}

impl TicketListFilters {
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("status", self.status.clone()),
            ("priority", self.priority.clone()),
            ("assignee", self.assignee.clone()),
            ("client_id", self.client_id.clone()),
            ("q", self.q.clone()),
        ]
    }

    pub fn query_string(&self) -> String {
        query_string(&self.pairs())
    }
}

fn status_options() -> Options {
    TicketStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), s.label().to_string()))
        .collect()
}

fn priority_options() -> Options {
    TicketPriority::ALL
        .iter()
        .map(|p| (p.as_str().to_string(), p.label().to_string()))
        .collect()
}

pub struct TicketListView<'a> {
    pub user: &'a AuthenticatedUser,
    pub tickets: &'a Page<Ticket>,
    pub filters: &'a TicketListFilters,
    pub clients: &'a [(String, String)],
    pub staff: &'a [(String, String)],
}

pub fn render_list(page: &PageContext, view: &TicketListView<'_>) -> Result<String, AppError> {
    let mut status_filter_options = vec![("open_work".to_string(), "All open".to_string())];
    status_filter_options.extend(status_options());
    let mut assignee_options = vec![("unassigned".to_string(), "Unassigned".to_string())];
    assignee_options.extend(view.staff.iter().cloned());
    let mut batch_actions = vec![
        ("close".to_string(), "Close".to_string()),
        ("status".to_string(), "Set status".to_string()),
        ("priority".to_string(), "Set priority".to_string()),
        ("assign".to_string(), "Assign".to_string()),
    ];
    if view.user.is_admin() {
        batch_actions.push(("delete".to_string(), "Delete".to_string()));
    }

    let mut context = Context::new();
    context.insert("is_staff", &view.user.is_staff());
    context.insert("tickets", view.tickets);
    context.insert("filters", view.filters);
    context.insert("export_query", &view.filters.query_string());
    context.insert("status_filter_options", &status_filter_options);
    context.insert("status_options", &status_options());
    context.insert("priority_options", &priority_options());
    context.insert("assignee_options", &assignee_options);
    context.insert("clients", view.clients);
    context.insert("staff", view.staff);
    context.insert("batch_actions", &batch_actions);
    context.insert("pager", &Pager::new(view.tickets, "/tickets", &view.filters.pairs()));
    page.render("tickets/list.html", context)
}

pub fn render_new(
    page: &PageContext,
    user: &AuthenticatedUser,
    clients: &[(String, String)],
    max_attachments: usize,
) -> Result<String, AppError> {
    let mut context = Context::new();
    context.insert("is_staff", &user.is_staff());
    context.insert("clients", clients);
    context.insert("priority_options", &priority_options());
    context.insert("max_attachments", &max_attachments);
    page.render("tickets/new.html", context)
}

pub struct TicketDetailView<'a> {
    pub user: &'a AuthenticatedUser,
    pub ticket: &'a Ticket,
    pub replies: &'a [TicketReply],
    pub attachments: &'a [TicketAttachment],
    pub staff: &'a [(String, String)],
    pub clients_can_close: bool,
}

#[derive(Serialize)]
struct ReplyEntry<'a> {
    #[serde(flatten)]
    reply: &'a TicketReply,
    attachments: Vec<&'a TicketAttachment>,
}

pub fn render_detail(page: &PageContext, view: &TicketDetailView<'_>) -> Result<String, AppError> {
    let ticket = view.ticket;
    let url = format!("/tickets/{}", ticket.id);
    let mut by_reply: HashMap<Option<Uuid>, Vec<&TicketAttachment>> = HashMap::new();
    for attachment in view.attachments {
        by_reply.entry(attachment.reply_id).or_default().push(attachment);
    }
    let replies: Vec<ReplyEntry<'_>> = view
        .replies
        .iter()
        .map(|reply| ReplyEntry {
            reply,
            attachments: by_reply.get(&Some(reply.id)).cloned().unwrap_or_default(),
        })
        .collect();

    let mut context = Context::new();
    context.insert("ticket", ticket);
    context.insert("ticket_attachments", &by_reply.get(&None).cloned().unwrap_or_default());
    context.insert("replies", &replies);
    context.insert("reply_url", &format!("{}/reply", url));
    context.insert("url", &url);
    context.insert("is_staff", &view.user.is_staff());
    context.insert("is_admin", &view.user.is_admin());
    context.insert("staff", view.staff);
    context.insert("status_options", &status_options());
    context.insert("priority_options", &priority_options());
    context.insert("assignee", &ticket.assigned_to.map(|id| id.to_string()).unwrap_or_default());
    context.insert("assigned_to_me", &(ticket.assigned_to == Some(view.user.user_id)));
    context.insert("user_id", &view.user.user_id.to_string());
    context.insert("can_close", &(view.clients_can_close && !ticket.status.is_finished()));
    page.render("tickets/detail.html", context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use crate::utils::pagination::Pagination;
    use crate::views::layout::tests::{page_for, user};
    use chrono::Utc;

    fn ticket(status: TicketStatus) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: Uuid::new_v4(),
            ticket_number: 1042,
            client_id: Uuid::new_v4(),
            client_name: "Acme & Sons".to_string(),
            created_by: None,
            created_by_name: Some("Cleo Client".to_string()),
            assigned_to: None,
            assignee_name: None,
            subject: "VPN <down>".to_string(),
            description: "Line one\n<script>x</script>".to_string(),
            status,
            priority: TicketPriority::High,
            reply_count: 0,
            created_at: now,
            updated_at: now,
            closed_at: None,
        }
    }

    #[test]
    fn test_filters_query_string() {
        let filters = TicketListFilters {
            status: "open".to_string(),
            q: "vpn down".to_string(),
            ..Default::default()
        };
        assert_eq!(filters.query_string(), "status=open&q=vpn%20down");
    }

    #[test]
    fn test_list_hides_batch_form_from_clients() {
        let client = user(UserRole::Client);
        let tickets = Page::new(vec![ticket(TicketStatus::Open)], Pagination::new(Some(1), 20), 1);
        let filters = TicketListFilters {
            priority: "high".to_string(),
            ..Default::default()
        };
        let view = TicketListView {
            user: &client,
            tickets: &tickets,
            filters: &filters,
            clients: &[],
            staff: &[],
        };
        let html = render_list(&page_for(Some(client.clone())), &view).unwrap();
        assert!(html.contains("VPN &lt;down&gt;"));
        assert!(html.contains(r#"<option value="high" selected>High</option>"#));
        assert!(!html.contains("ticket_ids[]"));
    }

    #[test]
    fn test_detail_escapes_description_and_offers_close() {
        let client = user(UserRole::Client);
        let ticket = ticket(TicketStatus::Open);
        let view = TicketDetailView {
            user: &client,
            ticket: &ticket,
            replies: &[],
            attachments: &[],
            staff: &[],
            clients_can_close: true,
        };
        let html = render_detail(&page_for(Some(client.clone())), &view).unwrap();
        assert!(html.contains("Line one<br>&lt;script&gt;x&lt;&#x2F;script&gt;"));
        assert!(html.contains("Close ticket"));
        assert!(!html.contains("Update status"));
    }
}
