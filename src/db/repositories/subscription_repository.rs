use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{BillingCycle, SubscriptionStatus};

/// A client's subscription with plan and tier details joined in.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct ClientSubscription {
    pub id: Uuid,
    pub client_id: Uuid,
    pub client_name: String,
    pub plan_id: Uuid,
    pub plan_name: String,
    pub tier_id: Uuid,
    pub tier_name: String,
    pub monthly_price: BigDecimal,
    pub included_hours: BigDecimal,
    #[sqlx(try_from = "String")]
    pub status: SubscriptionStatus,
    #[sqlx(try_from = "String")]
    pub billing_cycle: BillingCycle,
    pub start_date: NaiveDate,
    pub renewal_date: NaiveDate,
    pub notes: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    pub client_id: Option<Uuid>,
    pub status: Option<SubscriptionStatus>,
    pub plan_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub client_id: Uuid,
    pub plan_id: Uuid,
    pub tier_id: Uuid,
    pub billing_cycle: BillingCycle,
    pub start_date: NaiveDate,
    pub renewal_date: NaiveDate,
    pub notes: Option<String>,
}

const SUBSCRIPTION_SELECT: &str = r#"
    SELECT s.id, s.client_id, u.full_name AS client_name,
           s.plan_id, p.name AS plan_name, s.tier_id, t.name AS tier_name,
           t.monthly_price, t.included_hours,
           s.status, s.billing_cycle, s.start_date, s.renewal_date, s.notes,
           s.cancelled_at, s.created_at
    FROM client_plan_subscriptions s
    JOIN users u ON u.id = s.client_id
    JOIN service_plans p ON p.id = s.plan_id
    JOIN plan_tiers t ON t.id = s.tier_id
    WHERE 1=1
"#;

pub struct SubscriptionRepository {
    db_pool: PgPool,
}

impl SubscriptionRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn list(&self, filter: &SubscriptionFilter) -> Result<Vec<ClientSubscription>, AppError> {
        let mut query = QueryBuilder::<Postgres>::new(SUBSCRIPTION_SELECT);
        if let Some(client_id) = filter.client_id {
            query.push(" AND s.client_id = ").push_bind(client_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND s.status = ").push_bind(status.as_str());
        }
        if let Some(plan_id) = filter.plan_id {
            query.push(" AND s.plan_id = ").push_bind(plan_id);
        }
        query.push(" ORDER BY u.full_name, s.start_date DESC");

        query
            .build_query_as::<ClientSubscription>()
            .fetch_all(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list subscriptions: {}", e)))
    }

    pub async fn get(&self, id: &Uuid) -> Result<ClientSubscription, AppError> {
        sqlx::query_as::<_, ClientSubscription>(&format!("{} AND s.id = $1", SUBSCRIPTION_SELECT))
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch subscription: {}", e)))?
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))
    }

    pub async fn create(&self, new: &NewSubscription) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO client_plan_subscriptions
                (id, client_id, plan_id, tier_id, status, billing_cycle, start_date, renewal_date, notes)
            VALUES ($1, $2, $3, $4, 'active', $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(new.client_id)
        .bind(new.plan_id)
        .bind(new.tier_id)
        .bind(new.billing_cycle.as_str())
        .bind(new.start_date)
        .bind(new.renewal_date)
        .bind(&new.notes)
        .execute(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to create subscription: {}", e)))?;
        Ok(id)
    }

    pub async fn update_details(&self, id: &Uuid, tier_id: &Uuid, notes: Option<&str>) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE client_plan_subscriptions SET tier_id = $1, notes = $2, updated_at = now() WHERE id = $3",
        )
        .bind(tier_id)
        .bind(notes)
        .bind(id)
        .execute(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to update subscription: {}", e)))?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Subscription not found".to_string()));
        }
        Ok(())
    }

    /// Writes a status that has already been checked against the current one.
    /// The WHERE clause on the previous status keeps two racing updates from
    /// both applying.
    pub async fn set_status(
        &self,
        id: &Uuid,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE client_plan_subscriptions
            SET status = $1,
                cancelled_at = CASE WHEN $1 = 'cancelled' THEN now() ELSE cancelled_at END,
                updated_at = now()
            WHERE id = $2 AND status = $3
            "#,
        )
        .bind(to.as_str())
        .bind(id)
        .bind(from.as_str())
        .execute(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to change subscription status: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(
                "The subscription changed in the meantime. Reload and try again.".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn set_renewal_date(&self, id: &Uuid, renewal_date: NaiveDate) -> Result<(), AppError> {
        sqlx::query("UPDATE client_plan_subscriptions SET renewal_date = $1, updated_at = now() WHERE id = $2")
            .bind(renewal_date)
            .bind(id)
            .execute(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to update renewal date: {}", e)))?;
        Ok(())
    }

    pub async fn count_with_status(&self, status: SubscriptionStatus, client_id: Option<Uuid>) -> Result<i64, AppError> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM client_plan_subscriptions WHERE status = ");
        query.push_bind(status.as_str());
        if let Some(client_id) = client_id {
            query.push(" AND client_id = ").push_bind(client_id);
        }
        query
            .build_query_scalar::<i64>()
            .fetch_one(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to count subscriptions: {}", e)))
    }
}
