use serde::Serialize;
use tera::Context;

use crate::error::AppError;
use crate::services::dashboard_service::{Dashboard, DashboardSummary};
use crate::views::layout::PageContext;
use crate::views::templates::format_minutes;

#[derive(Serialize)]
struct Stat {
    label: &'static str,
    value: String,
    href: &'static str,
}

fn stat(label: &'static str, value: impl ToString, href: &'static str) -> Stat {
    Stat {
        label,
        value: value.to_string(),
        href,
    }
}

pub fn render(page: &PageContext, dashboard: &Dashboard, notice: Option<&str>) -> Result<String, AppError> {
    let mut context = Context::new();
    context.insert("show_timer", &false);
    context.insert("ask_for_support", &false);
    let stats = match &dashboard.summary {
        DashboardSummary::Admin {
            open_tickets,
            active_subscriptions,
            clients,
            minutes_this_week,
        } => vec![
            stat("Open tickets", open_tickets, "/tickets"),
            stat("Active subscriptions", active_subscriptions, "/subscriptions"),
            stat("Clients", clients, "/clients"),
            stat("Hours logged this week", format_minutes(*minutes_this_week), "/time-tracking"),
        ],
        DashboardSummary::Employee {
            active_timer,
            minutes_this_week,
            my_open_tickets,
            assigned_clients,
        } => {
            context.insert("show_timer", &true);
            context.insert("timer", active_timer);
            vec![
                stat("My hours this week", format_minutes(*minutes_this_week), "/time-tracking"),
                stat("My open tickets", my_open_tickets, "/tickets"),
                stat("Assigned clients", assigned_clients, "/clients"),
            ]
        }
        DashboardSummary::Client {
            open_tickets,
            active_subscriptions,
        } => {
            context.insert("ask_for_support", &true);
            vec![
                stat("Open tickets", open_tickets, "/tickets"),
                stat("Active plans", active_subscriptions, "/my-plan"),
            ]
        }
    };
    context.insert("notice", &notice);
    context.insert("stats", &stats);
    context.insert("recent_tickets", &dashboard.recent_tickets);
    page.render("dashboard.html", context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use crate::views::layout::tests::{page_for, user};

    #[test]
    fn test_employee_dashboard_without_timer() {
        let dashboard = Dashboard {
            summary: DashboardSummary::Employee {
                active_timer: None,
                minutes_this_week: 150,
                my_open_tickets: 3,
                assigned_clients: 2,
            },
            recent_tickets: Vec::new(),
        };
        let html = render(&page_for(Some(user(UserRole::Employee))), &dashboard, Some("Office closed <Friday>")).unwrap();
        assert!(html.contains("No timer running."));
        assert!(html.contains("<strong>2h 30m</strong>"));
        assert!(html.contains("Office closed &lt;Friday&gt;"));
        assert!(html.contains("Nothing here yet."));
    }

    #[test]
    fn test_client_dashboard_links_support() {
        let dashboard = Dashboard {
            summary: DashboardSummary::Client {
                open_tickets: 1,
                active_subscriptions: 1,
            },
            recent_tickets: Vec::new(),
        };
        let html = render(&page_for(Some(user(UserRole::Client))), &dashboard, None).unwrap();
        assert!(html.contains("Ask for support"));
        assert!(!html.contains("Timer running"));
    }
}
