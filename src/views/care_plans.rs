use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tera::Context;
use uuid::Uuid;

use crate::db::repositories::{DocumentCategory, PlanTier, Service, ServicePlan};
use crate::error::AppError;
use crate::views::layout::PageContext;

pub struct CarePlansView<'a> {
    pub services: &'a [Service],
    pub plans: &'a [ServicePlan],
    pub tiers: &'a [PlanTier],
    /// Service ids linked to each tier.
    pub tier_services: &'a HashMap<Uuid, HashSet<Uuid>>,
    pub categories: &'a [DocumentCategory],
}

#[derive(Serialize)]
struct ServiceChoice<'a> {
    id: Uuid,
    name: &'a str,
    checked: bool,
}

/// Tier editor values; blank for the "add tier" form.
#[derive(Serialize)]
struct TierForm<'a> {
    id: Option<Uuid>,
    name: &'a str,
    monthly_price: String,
    included_hours: String,
    sort_order: String,
    subscription_count: i64,
    services: Vec<ServiceChoice<'a>>,
}

#[derive(Serialize)]
struct PlanEntry<'a> {
    plan: &'a ServicePlan,
    tiers: Vec<TierForm<'a>>,
    new_tier: TierForm<'a>,
}

/// Active services plus inactive ones still linked to the tier.
fn service_choices<'a>(services: &'a [Service], linked: Option<&HashSet<Uuid>>) -> Vec<ServiceChoice<'a>> {
    services
        .iter()
        .filter(|s| s.is_active || linked.is_some_and(|l| l.contains(&s.id)))
        .map(|s| ServiceChoice {
            id: s.id,
            name: &s.name,
            checked: linked.is_some_and(|l| l.contains(&s.id)),
        })
        .collect()
}

fn tier_form<'a>(view: &CarePlansView<'a>, tier: Option<&'a PlanTier>) -> TierForm<'a> {
    match tier {
        Some(tier) => TierForm {
            id: Some(tier.id),
            name: &tier.name,
            monthly_price: tier.monthly_price.to_string(),
            included_hours: tier.included_hours.to_string(),
            sort_order: tier.sort_order.to_string(),
            subscription_count: tier.subscription_count,
            services: service_choices(view.services, view.tier_services.get(&tier.id)),
        },
        None => TierForm {
            id: None,
            name: "",
            monthly_price: String::new(),
            included_hours: String::new(),
            sort_order: String::new(),
            subscription_count: 0,
            services: service_choices(view.services, None),
        },
    }
}

pub fn render(page: &PageContext, view: &CarePlansView<'_>) -> Result<String, AppError> {
    let plans: Vec<PlanEntry<'_>> = view
        .plans
        .iter()
        .map(|plan| PlanEntry {
            plan,
            tiers: view
                .tiers
                .iter()
                .filter(|t| t.plan_id == plan.id)
                .map(|t| tier_form(view, Some(t)))
                .collect(),
            new_tier: tier_form(view, None),
        })
        .collect();

    let mut context = Context::new();
    context.insert("services", view.services);
    context.insert("plans", &plans);
    context.insert("categories", view.categories);
    page.render("care_plans.html", context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use crate::views::layout::tests::{page_for, user};
    use bigdecimal::BigDecimal;
    use chrono::Utc;
    use std::str::FromStr;

    fn service(name: &str, is_active: bool) -> Service {
        Service {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            is_active,
            tier_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_tier_lists_active_and_linked_services() {
        let services = vec![service("Backups", true), service("Legacy hosting", false), service("Fax", false)];
        let plan = ServicePlan {
            id: Uuid::new_v4(),
            name: "Website care".to_string(),
            description: None,
            is_active: true,
            tier_count: 1,
            subscription_count: 0,
            created_at: Utc::now(),
        };
        let tier = PlanTier {
            id: Uuid::new_v4(),
            plan_id: plan.id,
            name: "Basic".to_string(),
            monthly_price: BigDecimal::from_str("49.00").unwrap(),
            included_hours: BigDecimal::from_str("2.50").unwrap(),
            sort_order: 1,
            subscription_count: 0,
        };
        let mut tier_services = HashMap::new();
        tier_services.insert(tier.id, HashSet::from([services[1].id]));
        let plans = [plan];
        let tiers = [tier];
        let view = CarePlansView {
            services: &services,
            plans: &plans,
            tiers: &tiers,
            tier_services: &tier_services,
            categories: &[],
        };
        let html = render(&page_for(Some(user(UserRole::Admin))), &view).unwrap();
        assert!(html.contains(r#"name="monthly_price" value="49.00""#));
        assert!(html.contains(&format!(r#"value="{}" checked> Legacy hosting"#, services[1].id)));
        assert!(!html.contains("> Fax</label>"));
        assert!(html.contains("No categories yet."));
    }
}
