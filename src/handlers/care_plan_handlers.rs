use std::collections::{HashMap, HashSet};

use actix_web::{web, HttpResponse};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::request_context::{ActionOutcome, ActiveSession, VerifiedForm};
use crate::models::{AppState, FlashMessage};
use crate::services::care_plan_service::tier_from_form;
use crate::views::care_plans::{render, CarePlansView};

const PAGE_PATH: &str = "/care-plans";

pub async fn index(session: ActiveSession, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    session.require_admin()?;
    let services = state.service_repository.list().await?;
    let plans = state.service_plan_repository.list().await?;
    let tiers = state.service_plan_repository.all_tiers().await?;
    let tier_ids: Vec<Uuid> = tiers.iter().map(|t| t.id).collect();
    let mut tier_services: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
    for link in state.service_plan_repository.services_for_tiers(&tier_ids).await? {
        tier_services.entry(link.tier_id).or_default().insert(link.service_id);
    }
    let categories = state.plan_document_repository.list_categories().await?;

    let page = session.page("Care plans");
    let body = render(
        &page,
        &CarePlansView {
            services: &services,
            plans: &plans,
            tiers: &tiers,
            tier_services: &tier_services,
            categories: &categories,
        },
    )?;
    Ok(page.respond(&body))
}

pub async fn submit(session: ActiveSession, state: web::Data<AppState>, form: VerifiedForm) -> Result<HttpResponse, AppError> {
    session.require_admin()?;
    let outcome = dispatch(&state, &form).await;
    Ok(session.finish(outcome, PAGE_PATH))
}

async fn dispatch(state: &AppState, form: &VerifiedForm) -> ActionOutcome {
    let services = &state.service_repository;
    let plans = &state.service_plan_repository;
    let documents = &state.plan_document_repository;
    let description = form.optional("description");

    match form.action()? {
        "service_create" => {
            services.create(form.required("name", "Name")?, description).await?;
            Ok(FlashMessage::success("Service added"))
        }
        "service_update" => {
            services.update(&form.uuid("id", "Service")?, form.required("name", "Name")?, description).await?;
            Ok(FlashMessage::success("Service saved"))
        }
        "service_toggle" => {
            let active = services.toggle_active(&form.uuid("id", "Service")?).await?;
            Ok(FlashMessage::success(if active { "Service activated" } else { "Service deactivated" }))
        }
        "service_delete" => {
            services.delete(&form.uuid("id", "Service")?).await?;
            Ok(FlashMessage::success("Service deleted"))
        }
        "plan_create" => {
            plans.create(form.required("name", "Name")?, description).await?;
            Ok(FlashMessage::success("Plan added"))
        }
        "plan_update" => {
            plans.update(&form.uuid("id", "Plan")?, form.required("name", "Name")?, description).await?;
            Ok(FlashMessage::success("Plan saved"))
        }
        "plan_toggle" => {
            let active = plans.toggle_active(&form.uuid("id", "Plan")?).await?;
            Ok(FlashMessage::success(if active { "Plan is offered again" } else { "Plan is no longer offered" }))
        }
        "plan_delete" => {
            plans.delete(&form.uuid("id", "Plan")?).await?;
            Ok(FlashMessage::success("Plan deleted"))
        }
        "tier_create" => {
            let plan_id = form.uuid("plan_id", "Plan")?;
            plans.get(&plan_id).await?;
            plans.create_tier(&plan_id, &tier_from_form(form)?).await?;
            Ok(FlashMessage::success("Tier added"))
        }
        "tier_update" => {
            plans.update_tier(&form.uuid("id", "Tier")?, &tier_from_form(form)?).await?;
            Ok(FlashMessage::success("Tier saved"))
        }
        "tier_delete" => {
            plans.delete_tier(&form.uuid("id", "Tier")?).await?;
            Ok(FlashMessage::success("Tier deleted"))
        }
        "category_create" => {
            let sort_order = form.parse_optional::<i32>("sort_order", "Order")?.unwrap_or(0);
            documents.create_category(form.required("name", "Name")?, description, sort_order).await?;
            Ok(FlashMessage::success("Category added"))
        }
        "category_update" => {
            let sort_order = form.parse_optional::<i32>("sort_order", "Order")?.unwrap_or(0);
            documents
                .update_category(&form.uuid("id", "Category")?, form.required("name", "Name")?, description, sort_order)
                .await?;
            Ok(FlashMessage::success("Category saved"))
        }
        "category_delete" => {
            documents.delete_category(&form.uuid("id", "Category")?).await?;
            Ok(FlashMessage::success("Category deleted"))
        }
        other => Err(AppError::BadRequest(format!("Unknown action: {}", other))),
    }
}
