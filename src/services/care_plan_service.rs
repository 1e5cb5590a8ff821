use std::collections::HashMap;
use std::sync::Arc;

use bigdecimal::{BigDecimal, RoundingMode, Zero};
use chrono::NaiveDate;
use uuid::Uuid;

use crate::db::repositories::{
    ClientSubscription, MediaRepository, NewSubscription, PlanDocument, PlanDocumentRepository, PlanTier,
    ServicePlanRepository, SubscriptionFilter, SubscriptionRepository, TierInput, UserRepository,
};
use crate::error::AppError;
use crate::models::{BillingCycle, SubscriptionStatus, UserRole};
use crate::utils::form::FormFields;

/// Reads and checks the tier form.
pub fn tier_from_form(form: &FormFields) -> Result<TierInput, AppError> {
    let name = form.required("name", "Tier name")?.to_string();
    let monthly_price = form.decimal("monthly_price", "Monthly price")?;
    let included_hours = match form.optional("included_hours") {
        Some(_) => form.decimal("included_hours", "Included hours")?,
        None => BigDecimal::zero(),
    };
    if monthly_price < BigDecimal::zero() {
        return Err(AppError::Validation("Monthly price must not be negative".to_string()));
    }
    if included_hours < BigDecimal::zero() {
        return Err(AppError::Validation("Included hours must not be negative".to_string()));
    }

    Ok(TierInput {
        name,
        monthly_price: monthly_price.with_scale_round(2, RoundingMode::HalfUp),
        included_hours: included_hours.with_scale_round(2, RoundingMode::HalfUp),
        sort_order: form.parse_optional::<i32>("sort_order", "Sort order")?.unwrap_or(0),
        service_ids: form.all_uuids("service_ids")?,
    })
}

/// A subscription with the services of its tier and its documents.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SubscriptionOverview {
    pub subscription: ClientSubscription,
    pub services: Vec<String>,
    pub documents: Vec<PlanDocument>,
}

pub struct CarePlanService {
    plans: Arc<ServicePlanRepository>,
    subscriptions: Arc<SubscriptionRepository>,
    documents: Arc<PlanDocumentRepository>,
    users: Arc<UserRepository>,
    media: Arc<MediaRepository>,
}

impl CarePlanService {
    pub fn new(
        plans: Arc<ServicePlanRepository>,
        subscriptions: Arc<SubscriptionRepository>,
        documents: Arc<PlanDocumentRepository>,
        users: Arc<UserRepository>,
        media: Arc<MediaRepository>,
    ) -> Self {
        Self { plans, subscriptions, documents, users, media }
    }

    async fn tier_of_plan(&self, plan_id: &Uuid, tier_id: &Uuid) -> Result<PlanTier, AppError> {
        let tier = self.plans.get_tier(tier_id).await?;
        if tier.plan_id != *plan_id {
            return Err(AppError::Validation("The selected tier does not belong to that plan".to_string()));
        }
        Ok(tier)
    }

    pub async fn subscribe(
        &self,
        client_id: &Uuid,
        plan_id: &Uuid,
        tier_id: &Uuid,
        billing_cycle: BillingCycle,
        start_date: NaiveDate,
        notes: Option<String>,
        today: NaiveDate,
    ) -> Result<Uuid, AppError> {
        let client = self.users.get_with_role(client_id, UserRole::Client).await?;
        let plan = self.plans.get(plan_id).await?;
        if !plan.is_active {
            return Err(AppError::Validation(format!("{} is not offered at the moment", plan.name)));
        }
        self.tier_of_plan(plan_id, tier_id).await?;

        let renewal_date = billing_cycle.next_renewal(start_date, today)?;
        let id = self
            .subscriptions
            .create(&NewSubscription {
                client_id: *client_id,
                plan_id: *plan_id,
                tier_id: *tier_id,
                billing_cycle,
                start_date,
                renewal_date,
                notes,
            })
            .await?;
        log::info!("Subscription {} to {} created for {}", id, plan.name, client.email);
        Ok(id)
    }

    pub async fn update_details(&self, id: &Uuid, tier_id: &Uuid, notes: Option<&str>) -> Result<(), AppError> {
        let subscription = self.subscriptions.get(id).await?;
        if subscription.status == SubscriptionStatus::Cancelled {
            return Err(AppError::Validation("A cancelled subscription cannot be changed".to_string()));
        }
        self.tier_of_plan(&subscription.plan_id, tier_id).await?;
        self.subscriptions.update_details(id, tier_id, notes).await
    }

    pub async fn transition(&self, id: &Uuid, next: SubscriptionStatus) -> Result<ClientSubscription, AppError> {
        let subscription = self.subscriptions.get(id).await?;
        let next = subscription.status.transition_to(next)?;
        self.subscriptions.set_status(id, subscription.status, next).await?;
        log::info!("Subscription {} moved from {} to {}", id, subscription.status, next);
        Ok(subscription)
    }

    /// Moves renewal dates that have passed to the next cycle. Only active
    /// subscriptions renew.
    pub async fn roll_renewals(&self, subscriptions: &mut [ClientSubscription], today: NaiveDate) -> Result<(), AppError> {
        for subscription in subscriptions.iter_mut() {
            if subscription.status != SubscriptionStatus::Active || subscription.renewal_date > today {
                continue;
            }
            let next = subscription.billing_cycle.next_renewal(subscription.start_date, today)?;
            self.subscriptions.set_renewal_date(&subscription.id, next).await?;
            subscription.renewal_date = next;
        }
        Ok(())
    }

    pub async fn list(&self, filter: &SubscriptionFilter, today: NaiveDate) -> Result<Vec<ClientSubscription>, AppError> {
        let mut subscriptions = self.subscriptions.list(filter).await?;
        self.roll_renewals(&mut subscriptions, today).await?;
        Ok(subscriptions)
    }

    /// Everything a client sees on their plan page.
    pub async fn client_overview(&self, client_id: &Uuid, today: NaiveDate) -> Result<Vec<SubscriptionOverview>, AppError> {
        let subscriptions = self
            .list(
                &SubscriptionFilter {
                    client_id: Some(*client_id),
                    ..Default::default()
                },
                today,
            )
            .await?;

        let tier_ids: Vec<Uuid> = subscriptions.iter().map(|s| s.tier_id).collect();
        let subscription_ids: Vec<Uuid> = subscriptions.iter().map(|s| s.id).collect();

        let mut services_by_tier: HashMap<Uuid, Vec<String>> = HashMap::new();
        for link in self.plans.services_for_tiers(&tier_ids).await? {
            services_by_tier.entry(link.tier_id).or_default().push(link.service_name);
        }
        let mut documents_by_subscription: HashMap<Uuid, Vec<PlanDocument>> = HashMap::new();
        for document in self.documents.documents_for_subscriptions(&subscription_ids).await? {
            documents_by_subscription.entry(document.subscription_id).or_default().push(document);
        }

        Ok(subscriptions
            .into_iter()
            .map(|subscription| SubscriptionOverview {
                services: services_by_tier.remove(&subscription.tier_id).unwrap_or_default(),
                documents: documents_by_subscription.remove(&subscription.id).unwrap_or_default(),
                subscription,
            })
            .collect())
    }

    pub async fn attach_document(
        &self,
        subscription_id: &Uuid,
        category_id: &Uuid,
        media_id: &Uuid,
        title: Option<&str>,
    ) -> Result<Uuid, AppError> {
        self.subscriptions.get(subscription_id).await?;
        let media = self.media.get(media_id).await?;
        let title = title.map(str::to_string).unwrap_or(media.title);
        self.documents.attach(subscription_id, category_id, media_id, &title).await
    }

    /// A plan document the user may open: staff see all, clients only those
    /// on their own subscriptions.
    pub async fn document_for(&self, client_scope: Option<Uuid>, document_id: &Uuid) -> Result<PlanDocument, AppError> {
        let document = self.documents.get_document(document_id).await?;
        if let Some(client_id) = client_scope {
            let subscription = self.subscriptions.get(&document.subscription_id).await?;
            if subscription.client_id != client_id {
                return Err(AppError::NotFound("Document not found".to_string()));
            }
        }
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn form(pairs: &[(&str, &str)]) -> FormFields {
        FormFields::from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn test_tier_from_form() {
        let service_id = Uuid::new_v4();
        let input = tier_from_form(&form(&[
            ("name", "Pro"),
            ("monthly_price", "149.9"),
            ("included_hours", "4"),
            ("service_ids[]", &service_id.to_string()),
        ]))
        .unwrap();
        assert_eq!(input.name, "Pro");
        assert_eq!(input.monthly_price, BigDecimal::from_str("149.90").unwrap());
        assert_eq!(input.sort_order, 0);
        assert_eq!(input.service_ids, vec![service_id]);
    }

    #[test]
    fn test_tier_amounts_round_to_cents() {
        let input = tier_from_form(&form(&[
            ("name", "Pro"),
            ("monthly_price", "19.999"),
            ("included_hours", "2.494"),
        ]))
        .unwrap();
        assert_eq!(input.monthly_price.to_string(), "20.00");
        assert_eq!(input.included_hours.to_string(), "2.49");
    }

    #[test]
    fn test_tier_rejects_negative_price() {
        let result = tier_from_form(&form(&[("name", "Free"), ("monthly_price", "-5")]));
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_tier_requires_numeric_price() {
        assert!(tier_from_form(&form(&[("name", "Basic"), ("monthly_price", "cheap")])).is_err());
    }
}
