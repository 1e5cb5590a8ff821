use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::repositories::SubscriptionFilter;
use crate::error::AppError;
use crate::handlers::shared::{query_uuid, role_options, serve_file, today, SelectOptions};
use crate::middleware::request_context::{ActionOutcome, ActiveSession, VerifiedForm};
use crate::models::{AppState, BillingCycle, FlashMessage, SubscriptionStatus, UserRole};
use crate::views::subscriptions::{
    render_client_plans, render_detail, render_list, SubscriptionChoices, SubscriptionDetailView, SubscriptionFilters,
};

const LIST_PATH: &str = "/subscriptions";
const MEDIA_CHOICES: i64 = 200;

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionQuery {
    pub status: Option<String>,
    pub client_id: Option<String>,
    pub plan_id: Option<String>,
}

async fn plan_options(state: &AppState) -> Result<SelectOptions, AppError> {
    Ok(state
        .service_plan_repository
        .list()
        .await?
        .into_iter()
        .map(|p| (p.id.to_string(), p.name))
        .collect())
}

/// Tiers labelled with their plan, optionally limited to one plan.
async fn tier_options(state: &AppState, plan_id: Option<Uuid>) -> Result<SelectOptions, AppError> {
    let plans = state.service_plan_repository.list().await?;
    let tiers = state.service_plan_repository.all_tiers().await?;
    Ok(tiers
        .into_iter()
        .filter(|t| plan_id.is_none_or(|id| t.plan_id == id))
        .map(|t| {
            let plan = plans
                .iter()
                .find(|p| p.id == t.plan_id)
                .map(|p| p.name.as_str())
                .unwrap_or("?");
            (t.id.to_string(), format!("{} / {} ({} per month)", plan, t.name, t.monthly_price))
        })
        .collect())
}

pub async fn index(
    session: ActiveSession,
    state: web::Data<AppState>,
    query: web::Query<SubscriptionQuery>,
) -> Result<HttpResponse, AppError> {
    session.require_admin()?;
    let filters = SubscriptionFilters {
        status: query.status.clone().unwrap_or_default(),
        client_id: query.client_id.clone().unwrap_or_default(),
        plan_id: query.plan_id.clone().unwrap_or_default(),
    };
    let filter = SubscriptionFilter {
        client_id: query_uuid(Some(&filters.client_id)),
        status: filters.status.parse::<SubscriptionStatus>().ok(),
        plan_id: query_uuid(Some(&filters.plan_id)),
    };
    let subscriptions = state.care_plans.list(&filter, today()).await?;
    let clients = role_options(&state, UserRole::Client).await?;
    let plans = plan_options(&state).await?;
    let tiers = tier_options(&state, None).await?;

    let page = session.page("Subscriptions");
    let body = render_list(
        &page,
        &subscriptions,
        &filters,
        &SubscriptionChoices {
            clients: &clients,
            plans: &plans,
            tiers: &tiers,
        },
    )?;
    Ok(page.respond(&body))
}

pub async fn show(
    session: ActiveSession,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    session.require_admin()?;
    let id = path.into_inner();
    let subscription = state.subscription_repository.get(&id).await?;
    let overview = state
        .care_plans
        .client_overview(&subscription.client_id, today())
        .await?
        .into_iter()
        .find(|o| o.subscription.id == id)
        .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;
    let tiers = tier_options(&state, Some(subscription.plan_id)).await?;
    let categories = state.plan_document_repository.list_categories().await?;
    let media: SelectOptions = state
        .media
        .repository()
        .recent(MEDIA_CHOICES)
        .await?
        .into_iter()
        .map(|m| (m.id.to_string(), format!("{} ({})", m.title, m.original_name)))
        .collect();

    let page = session.page(format!("{}: {}", subscription.client_name, subscription.plan_name));
    let body = render_detail(
        &page,
        &SubscriptionDetailView {
            overview: &overview,
            tiers: &tiers,
            categories: &categories,
            media: &media,
        },
    )?;
    Ok(page.respond(&body))
}

pub async fn submit(session: ActiveSession, state: web::Data<AppState>, form: VerifiedForm) -> Result<HttpResponse, AppError> {
    session.require_admin()?;
    let outcome = match form.action() {
        Ok("create") => create(&state, &form).await,
        Ok(_) => match form.uuid("id", "Subscription") {
            Ok(id) => dispatch(&state, &id, &form).await,
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };
    Ok(session.finish(outcome, LIST_PATH))
}

pub async fn submit_detail(
    session: ActiveSession,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    form: VerifiedForm,
) -> Result<HttpResponse, AppError> {
    session.require_admin()?;
    let id = path.into_inner();
    let outcome = dispatch(&state, &id, &form).await;
    Ok(session.finish(outcome, &format!("{}/{}", LIST_PATH, id)))
}

async fn create(state: &AppState, form: &VerifiedForm) -> ActionOutcome {
    let billing_cycle: BillingCycle = form.parse_required("billing_cycle", "Billing cycle")?;
    state
        .care_plans
        .subscribe(
            &form.uuid("client_id", "Client")?,
            &form.uuid("plan_id", "Plan")?,
            &form.uuid("tier_id", "Tier")?,
            billing_cycle,
            form.date("start_date", "Start date")?,
            form.optional_string("notes"),
            today(),
        )
        .await?;
    Ok(FlashMessage::success("Subscription created"))
}

async fn dispatch(state: &AppState, id: &Uuid, form: &VerifiedForm) -> ActionOutcome {
    match form.action()? {
        "update" => {
            state
                .care_plans
                .update_details(id, &form.uuid("tier_id", "Tier")?, form.optional("notes"))
                .await?;
            Ok(FlashMessage::success("Subscription saved"))
        }
        "transition" => {
            let next: SubscriptionStatus = form.parse_required("status", "Status")?;
            let previous = state.care_plans.transition(id, next).await?;
            Ok(FlashMessage::success(format!(
                "{}'s {} subscription is now {}",
                previous.client_name,
                previous.plan_name,
                next.label().to_lowercase()
            )))
        }
        "attach_document" => {
            state
                .care_plans
                .attach_document(
                    id,
                    &form.uuid("category_id", "Category")?,
                    &form.uuid("media_id", "File")?,
                    form.optional("title"),
                )
                .await?;
            Ok(FlashMessage::success("Document attached"))
        }
        "delete_document" => {
            let document_id = form.uuid("document_id", "Document")?;
            let document = state.care_plans.document_for(None, &document_id).await?;
            if document.subscription_id != *id {
                return Err(AppError::NotFound("Document not found".to_string()));
            }
            state.plan_document_repository.delete_document(&document_id).await?;
            Ok(FlashMessage::success("Document removed"))
        }
        other => Err(AppError::BadRequest(format!("Unknown action: {}", other))),
    }
}

/// The signed-in client's plans.
pub async fn my_plan(session: ActiveSession, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    session.require_any(&[UserRole::Client])?;
    let overviews = state.care_plans.client_overview(&session.user.user_id, today()).await?;
    let page = session.page("My plan");
    let body = render_client_plans(&page, &overviews)?;
    Ok(page.respond(&body))
}

/// Plan document download: staff see all, clients only their own.
pub async fn document(
    session: ActiveSession,
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let scope = (!session.user.is_staff()).then_some(session.user.user_id);
    let document = state.care_plans.document_for(scope, &path.into_inner()).await?;
    let (media, file_path) = state.media.file(&document.media_id).await?;
    serve_file(&req, &file_path, &media.original_name, &media.mime_type).await
}
