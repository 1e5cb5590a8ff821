use serde::Serialize;
use tera::Context;

use crate::db::repositories::{ClientSubscription, DocumentCategory};
use crate::error::AppError;
use crate::models::{BillingCycle, SubscriptionStatus};
use crate::services::care_plan_service::SubscriptionOverview;
use crate::views::layout::{Options, PageContext};

/// Select options shared by the subscription pages.
pub struct SubscriptionChoices<'a> {
    pub clients: &'a [(String, String)],
    pub plans: &'a [(String, String)],
    /// Tier ids labelled "Plan / Tier".
    pub tiers: &'a [(String, String)],
}

#[derive(Debug, Default, Serialize)]
pub struct SubscriptionFilters {
    pub status: String,
    pub client_id: String,
    pub plan_id: String,
}

fn status_options() -> Options {
    SubscriptionStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), s.label().to_string()))
        .collect()
}

fn cycle_options() -> Options {
    BillingCycle::ALL
        .iter()
        .map(|c| (c.as_str().to_string(), c.label().to_string()))
        .collect()
}

#[derive(Serialize)]
struct Transition {
    status: &'static str,
    label: &'static str,
    confirm: &'static str,
}

/// A subscription with the status changes it currently allows.
#[derive(Serialize)]
struct SubscriptionRow<'a> {
    #[serde(flatten)]
    subscription: &'a ClientSubscription,
    transitions: Vec<Transition>,
}

impl<'a> SubscriptionRow<'a> {
    fn new(subscription: &'a ClientSubscription) -> Self {
        let transitions = SubscriptionStatus::ALL
            .iter()
            .filter(|next| subscription.status.can_transition_to(**next))
            .map(|next| Transition {
                status: next.as_str(),
                label: match next {
                    SubscriptionStatus::Active => "Resume",
                    SubscriptionStatus::Paused => "Pause",
                    SubscriptionStatus::Cancelled => "Cancel",
                },
                confirm: match next {
                    SubscriptionStatus::Cancelled => "Cancelling cannot be undone. Continue?",
                    _ => "",
                },
            })
            .collect();
        Self {
            subscription,
            transitions,
        }
    }
}

pub fn render_list(
    page: &PageContext,
    subscriptions: &[ClientSubscription],
    filters: &SubscriptionFilters,
    choices: &SubscriptionChoices<'_>,
) -> Result<String, AppError> {
    let rows: Vec<SubscriptionRow<'_>> = subscriptions.iter().map(SubscriptionRow::new).collect();
    let mut context = Context::new();
    context.insert("subscriptions", &rows);
    context.insert("filters", filters);
    context.insert("status_options", &status_options());
    context.insert("cycle_options", &cycle_options());
    context.insert("clients", choices.clients);
    context.insert("plans", choices.plans);
    context.insert("tiers", choices.tiers);
    page.render("subscriptions/list.html", context)
}

pub struct SubscriptionDetailView<'a> {
    pub overview: &'a SubscriptionOverview,
    pub tiers: &'a [(String, String)],
    pub categories: &'a [DocumentCategory],
    pub media: &'a [(String, String)],
}

pub fn render_detail(page: &PageContext, view: &SubscriptionDetailView<'_>) -> Result<String, AppError> {
    let sub = &view.overview.subscription;
    let categories: Options = view
        .categories
        .iter()
        .map(|c| (c.id.to_string(), c.name.clone()))
        .collect();

    let mut context = Context::new();
    context.insert("url", &format!("/subscriptions/{}", sub.id));
    context.insert("sub", &SubscriptionRow::new(sub));
    context.insert("services", &view.overview.services);
    context.insert("documents", &view.overview.documents);
    context.insert("tiers", view.tiers);
    context.insert("categories", &categories);
    context.insert("media", view.media);
    page.render("subscriptions/detail.html", context)
}

/// A client's own plans.
pub fn render_client_plans(page: &PageContext, overviews: &[SubscriptionOverview]) -> Result<String, AppError> {
    let mut context = Context::new();
    context.insert("overviews", overviews);
    page.render("subscriptions/my_plan.html", context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use crate::views::layout::tests::{page_for, user};
    use bigdecimal::BigDecimal;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn subscription(status: SubscriptionStatus) -> ClientSubscription {
        ClientSubscription {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            client_name: "Cleo Client".to_string(),
            plan_id: Uuid::new_v4(),
            plan_name: "Website care".to_string(),
            tier_id: Uuid::new_v4(),
            tier_name: "Basic".to_string(),
            monthly_price: BigDecimal::from(49),
            included_hours: BigDecimal::from(2),
            status,
            billing_cycle: BillingCycle::Yearly,
            start_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            renewal_date: NaiveDate::from_ymd_opt(2027, 1, 15).unwrap(),
            notes: None,
            cancelled_at: None,
            created_at: Utc::now(),
        }
    }

    fn choices() -> SubscriptionChoices<'static> {
        SubscriptionChoices {
            clients: &[],
            plans: &[],
            tiers: &[],
        }
    }

    #[test]
    fn test_list_offers_allowed_transitions() {
        let subs = [subscription(SubscriptionStatus::Active)];
        let html = render_list(
            &page_for(Some(user(UserRole::Admin))),
            &subs,
            &SubscriptionFilters::default(),
            &choices(),
        )
        .unwrap();
        assert!(html.contains(r#"name="status" value="paused""#));
        assert!(html.contains("Cancelling cannot be undone. Continue?"));
        assert!(!html.contains(">Resume</button>"));
        assert!(html.contains("<td>2027-01-15</td>"));
    }

    #[test]
    fn test_cancelled_subscription_has_no_renewal_or_actions() {
        let subs = [subscription(SubscriptionStatus::Cancelled)];
        let html = render_list(
            &page_for(Some(user(UserRole::Admin))),
            &subs,
            &SubscriptionFilters::default(),
            &choices(),
        )
        .unwrap();
        assert!(html.contains("<td>-</td>"));
        assert!(!html.contains(r#"value="transition""#));
    }

    #[test]
    fn test_client_plans_show_renewal_for_active_plans() {
        let overviews = [SubscriptionOverview {
            subscription: subscription(SubscriptionStatus::Active),
            services: vec!["Backups".to_string()],
            documents: Vec::new(),
        }];
        let html = render_client_plans(&page_for(Some(user(UserRole::Client))), &overviews).unwrap();
        assert!(html.contains("billed yearly"));
        assert!(html.contains("Next renewal: 2027-01-15"));
        assert!(html.contains("<li>Backups</li>"));
        assert!(!html.contains(r#"value="delete_document""#));
    }
}
