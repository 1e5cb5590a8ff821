use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Paused,
    Cancelled,
}

impl SubscriptionStatus {
    pub const ALL: [SubscriptionStatus; 3] = [
        SubscriptionStatus::Active,
        SubscriptionStatus::Paused,
        SubscriptionStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "Active",
            SubscriptionStatus::Paused => "Paused",
            SubscriptionStatus::Cancelled => "Cancelled",
        }
    }

    /// Cancelled is terminal; active and paused may move between each other.
    pub fn can_transition_to(&self, next: SubscriptionStatus) -> bool {
        matches!(
            (self, next),
            (SubscriptionStatus::Active, SubscriptionStatus::Paused)
                | (SubscriptionStatus::Active, SubscriptionStatus::Cancelled)
                | (SubscriptionStatus::Paused, SubscriptionStatus::Active)
                | (SubscriptionStatus::Paused, SubscriptionStatus::Cancelled)
        )
    }

    pub fn transition_to(&self, next: SubscriptionStatus) -> Result<SubscriptionStatus, AppError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(AppError::Validation(format!(
                "A {} subscription cannot become {}",
                self.as_str(),
                next.as_str()
            )))
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubscriptionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| AppError::Validation(format!("Unknown subscription status: {}", s)))
    }
}

impl TryFrom<String> for SubscriptionStatus {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl BillingCycle {
    pub const ALL: [BillingCycle; 2] = [BillingCycle::Monthly, BillingCycle::Yearly];

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "Monthly",
            BillingCycle::Yearly => "Yearly",
        }
    }

    fn months(&self) -> u32 {
        match self {
            BillingCycle::Monthly => 1,
            BillingCycle::Yearly => 12,
        }
    }

    /// First renewal strictly after `today`, counted in whole cycles from
    /// `start`. Counting from `start` each time keeps month-end dates from
    /// drifting (Jan 31 renews Feb 28, then Mar 31).
    pub fn next_renewal(&self, start: NaiveDate, today: NaiveDate) -> Result<NaiveDate, AppError> {
        let mut cycles: u32 = 1;
        loop {
            let candidate = start
                .checked_add_months(Months::new(self.months() * cycles))
                .ok_or_else(|| AppError::Validation("Renewal date is out of range".to_string()))?;
            if candidate > today {
                return Ok(candidate);
            }
            cycles += 1;
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingCycle {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BillingCycle::ALL
            .into_iter()
            .find(|cycle| cycle.as_str() == s.trim())
            .ok_or_else(|| AppError::Validation(format!("Unknown billing cycle: {}", s)))
    }
}

impl TryFrom<String> for BillingCycle {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_cancelled_is_terminal() {
        for next in SubscriptionStatus::ALL {
            assert!(!SubscriptionStatus::Cancelled.can_transition_to(next));
        }
        assert!(SubscriptionStatus::Active.transition_to(SubscriptionStatus::Paused).is_ok());
        assert!(SubscriptionStatus::Paused.transition_to(SubscriptionStatus::Active).is_ok());
        assert!(SubscriptionStatus::Active.transition_to(SubscriptionStatus::Active).is_err());
    }

    #[test]
    fn test_monthly_renewal_after_today() {
        let renewal = BillingCycle::Monthly
            .next_renewal(date(2026, 1, 15), date(2026, 3, 20))
            .unwrap();
        assert_eq!(renewal, date(2026, 4, 15));
    }

    #[test]
    fn test_renewal_on_same_day_moves_forward() {
        let renewal = BillingCycle::Monthly
            .next_renewal(date(2026, 1, 15), date(2026, 2, 15))
            .unwrap();
        assert_eq!(renewal, date(2026, 3, 15));
    }

    #[test]
    fn test_month_end_does_not_drift() {
        let renewal = BillingCycle::Monthly
            .next_renewal(date(2026, 1, 31), date(2026, 3, 1))
            .unwrap();
        assert_eq!(renewal, date(2026, 3, 31));
    }

    #[test]
    fn test_future_start_renews_one_cycle_later() {
        let renewal = BillingCycle::Yearly
            .next_renewal(date(2026, 6, 1), date(2026, 1, 1))
            .unwrap();
        assert_eq!(renewal, date(2027, 6, 1));
    }
}
