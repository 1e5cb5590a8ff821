use std::sync::Arc;

use chrono::NaiveDate;

use crate::db::repositories::{
    AssigneeFilter, AssignmentRepository, SubscriptionRepository, Ticket, TicketFilter, TicketRepository,
    TicketScope, TimeLog, TimeLogFilter, TimeLogRepository, UserRepository,
};
use crate::error::AppError;
use crate::models::{AuthenticatedUser, SubscriptionStatus, UserRole};
use crate::utils::date_range::DateRange;
use crate::utils::pagination::Pagination;

const RECENT_TICKETS: i64 = 5;

#[derive(Debug, Clone)]
pub enum DashboardSummary {
    Admin {
        open_tickets: i64,
        active_subscriptions: i64,
        clients: i64,
        minutes_this_week: i64,
    },
    Employee {
        active_timer: Option<TimeLog>,
        minutes_this_week: i64,
        my_open_tickets: i64,
        assigned_clients: usize,
    },
    Client {
        open_tickets: i64,
        active_subscriptions: i64,
    },
}

#[derive(Debug, Clone)]
pub struct Dashboard {
    pub summary: DashboardSummary,
    pub recent_tickets: Vec<Ticket>,
}

pub struct DashboardService {
    tickets: Arc<TicketRepository>,
    subscriptions: Arc<SubscriptionRepository>,
    users: Arc<UserRepository>,
    time_logs: Arc<TimeLogRepository>,
    assignments: Arc<AssignmentRepository>,
}

impl DashboardService {
    pub fn new(
        tickets: Arc<TicketRepository>,
        subscriptions: Arc<SubscriptionRepository>,
        users: Arc<UserRepository>,
        time_logs: Arc<TimeLogRepository>,
        assignments: Arc<AssignmentRepository>,
    ) -> Self {
        Self {
            tickets,
            subscriptions,
            users,
            time_logs,
            assignments,
        }
    }

    pub async fn load(&self, user: &AuthenticatedUser, today: NaiveDate) -> Result<Dashboard, AppError> {
        let scope = TicketScope::for_user(user.user_id, user.role);
        let open_in_scope = TicketFilter {
            scope,
            open_only: true,
            ..Default::default()
        };
        let week = DateRange::week_of(today);

        let summary = match user.role {
            UserRole::Admin => DashboardSummary::Admin {
                open_tickets: self.tickets.count(&open_in_scope).await?,
                active_subscriptions: self.subscriptions.count_with_status(SubscriptionStatus::Active, None).await?,
                clients: self.users.count_active_by_role(UserRole::Client).await?,
                minutes_this_week: self
                    .time_logs
                    .totals(&TimeLogFilter {
                        range: week,
                        ..Default::default()
                    })
                    .await?
                    .total_minutes,
            },
            UserRole::Employee => DashboardSummary::Employee {
                active_timer: self.time_logs.active_for(&user.user_id).await?,
                minutes_this_week: self
                    .time_logs
                    .totals(&TimeLogFilter {
                        employee_id: Some(user.user_id),
                        range: week,
                        ..Default::default()
                    })
                    .await?
                    .total_minutes,
                my_open_tickets: self
                    .tickets
                    .count(&TicketFilter {
                        assignee: Some(AssigneeFilter::User(user.user_id)),
                        ..open_in_scope.clone()
                    })
                    .await?,
                assigned_clients: self.assignments.client_ids_for(&user.user_id).await?.len(),
            },
            UserRole::Client => DashboardSummary::Client {
                open_tickets: self.tickets.count(&open_in_scope).await?,
                active_subscriptions: self
                    .subscriptions
                    .count_with_status(SubscriptionStatus::Active, Some(user.user_id))
                    .await?,
            },
        };

        let recent_tickets = self
            .tickets
            .list(&open_in_scope, Pagination::new(Some(1), RECENT_TICKETS))
            .await?
            .items;

        Ok(Dashboard { summary, recent_tickets })
    }
}
