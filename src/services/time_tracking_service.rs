use std::sync::Arc;

use bigdecimal::{BigDecimal, RoundingMode, Zero};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::db::repositories::{AssignmentRepository, TimeEntry, TimeLog, TimeLogRepository};
use crate::error::AppError;
use crate::models::{AuthenticatedUser, UserRole};
use crate::utils::form::FormFields;

pub const MAX_ENTRY_HOURS: i64 = 24;

const DATETIME_LOCAL_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parses a `datetime-local` form value as UTC.
pub fn parse_datetime_local(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    DATETIME_LOCAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|naive| naive.and_utc())
}

pub fn format_datetime_local(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%dT%H:%M").to_string()
}

/// A finished entry must end after it starts and span at most a day.
pub fn validate_span(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), AppError> {
    if end <= start {
        return Err(AppError::Validation("End time must be after start time".to_string()));
    }
    if end - start > Duration::hours(MAX_ENTRY_HOURS) {
        return Err(AppError::Validation(format!(
            "A single entry cannot be longer than {} hours",
            MAX_ENTRY_HOURS
        )));
    }
    Ok(())
}

/// Billable minutes priced at an hourly rate, rounded to cents. `None` when
/// no rate is configured.
pub fn billable_value(minutes: i64, hourly_rate: &BigDecimal) -> Option<BigDecimal> {
    if hourly_rate <= &BigDecimal::zero() {
        return None;
    }
    let value = BigDecimal::from(minutes) * hourly_rate / BigDecimal::from(60);
    Some(value.with_scale_round(2, RoundingMode::HalfUp))
}

/// Reads the manual entry form.
pub fn entry_from_form(form: &FormFields) -> Result<TimeEntry, AppError> {
    let start_time = parse_datetime_local(form.required("start_time", "Start time")?)
        .ok_or_else(|| AppError::Validation("Start time is not a valid date and time".to_string()))?;
    let end_time = parse_datetime_local(form.required("end_time", "End time")?)
        .ok_or_else(|| AppError::Validation("End time is not a valid date and time".to_string()))?;
    validate_span(start_time, end_time)?;

    Ok(TimeEntry {
        client_id: form.optional_uuid("client_id", "Client")?,
        description: form.optional("description").unwrap_or_default().to_string(),
        start_time,
        end_time,
        billable: form.checkbox("billable"),
    })
}

pub struct TimeTrackingService {
    logs: Arc<TimeLogRepository>,
    assignments: Arc<AssignmentRepository>,
}

impl TimeTrackingService {
    pub fn new(logs: Arc<TimeLogRepository>, assignments: Arc<AssignmentRepository>) -> Self {
        Self { logs, assignments }
    }

    /// Employees may only book time on clients assigned to them.
    async fn ensure_client_allowed(&self, employee: &AuthenticatedUser, client_id: Option<Uuid>) -> Result<(), AppError> {
        let Some(client_id) = client_id else {
            return Ok(());
        };
        if employee.role == UserRole::Employee && !self.assignments.is_assigned(&employee.user_id, &client_id).await? {
            return Err(AppError::Validation(
                "You can only log time for clients assigned to you".to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_can_modify(&self, user: &AuthenticatedUser, entry: &TimeLog) -> Result<(), AppError> {
        if user.is_admin() || entry.employee_id == user.user_id {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "User {} tried to modify time entry {} of {}",
                user.user_id, entry.id, entry.employee_id
            )))
        }
    }

    pub async fn active_timer(&self, user: &AuthenticatedUser) -> Result<Option<TimeLog>, AppError> {
        self.logs.active_for(&user.user_id).await
    }

    pub async fn start(
        &self,
        user: &AuthenticatedUser,
        client_id: Option<Uuid>,
        description: &str,
        billable: bool,
    ) -> Result<Uuid, AppError> {
        user.require_staff()?;
        self.ensure_client_allowed(user, client_id).await?;
        if self.logs.active_for(&user.user_id).await?.is_some() {
            return Err(AppError::Conflict("You already have a running timer. Stop it first.".to_string()));
        }
        let id = self.logs.start(&user.user_id, client_id, description, billable).await?;
        log::info!("Timer {} started by {}", id, user.user_id);
        Ok(id)
    }

    pub async fn stop(&self, user: &AuthenticatedUser) -> Result<TimeLog, AppError> {
        let entry = self.logs.stop(&user.user_id).await?;
        log::info!("Timer {} stopped by {} after {} minutes", entry.id, user.user_id, entry.duration_minutes);
        Ok(entry)
    }

    pub async fn add_manual(&self, user: &AuthenticatedUser, entry: &TimeEntry) -> Result<Uuid, AppError> {
        user.require_staff()?;
        validate_span(entry.start_time, entry.end_time)?;
        self.ensure_client_allowed(user, entry.client_id).await?;
        self.logs.create_manual(&user.user_id, entry).await
    }

    pub async fn edit(&self, user: &AuthenticatedUser, id: &Uuid, entry: &TimeEntry) -> Result<(), AppError> {
        let existing = self.logs.get(id).await?;
        self.ensure_can_modify(user, &existing)?;
        if existing.is_running() {
            return Err(AppError::Validation("Stop the running timer before editing it".to_string()));
        }
        validate_span(entry.start_time, entry.end_time)?;
        self.ensure_client_allowed(user, entry.client_id).await?;
        self.logs.update(id, entry).await
    }

    pub async fn delete(&self, user: &AuthenticatedUser, id: &Uuid) -> Result<(), AppError> {
        let existing = self.logs.get(id).await?;
        self.ensure_can_modify(user, &existing)?;
        self.logs.delete(id).await?;
        log::info!("Time entry {} deleted by {}", id, user.user_id);
        Ok(())
    }

    pub async fn get_for_edit(&self, user: &AuthenticatedUser, id: &Uuid) -> Result<TimeLog, AppError> {
        let entry = self.logs.get(id).await?;
        self.ensure_can_modify(user, &entry)?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_billable_value() {
        let rate = BigDecimal::from(90);
        assert_eq!(billable_value(90, &rate), Some(BigDecimal::from_str("135.00").unwrap()));
        assert_eq!(billable_value(1, &BigDecimal::from(100)), Some(BigDecimal::from_str("1.67").unwrap()));
        assert_eq!(billable_value(60, &BigDecimal::zero()), None);
    }

    use chrono::TimeZone;

    #[test]
    fn test_parse_datetime_local() {
        let parsed = parse_datetime_local("2026-03-02T09:30").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap());
        assert!(parse_datetime_local("yesterday").is_none());
        assert_eq!(format_datetime_local(&parsed), "2026-03-02T09:30");
    }

    #[test]
    fn test_validate_span() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        assert!(validate_span(start, start + Duration::minutes(30)).is_ok());
        assert!(validate_span(start, start).is_err());
        assert!(validate_span(start, start - Duration::minutes(5)).is_err());
        assert!(validate_span(start, start + Duration::hours(24)).is_ok());
        assert!(validate_span(start, start + Duration::hours(24) + Duration::minutes(1)).is_err());
    }

    #[test]
    fn test_entry_from_form() {
        let form = FormFields::from_pairs(vec![
            ("start_time".to_string(), "2026-03-02T09:00".to_string()),
            ("end_time".to_string(), "2026-03-02T10:15".to_string()),
            ("description".to_string(), " Server updates ".to_string()),
            ("billable".to_string(), "1".to_string()),
        ]);
        let entry = entry_from_form(&form).unwrap();
        assert_eq!(entry.description, "Server updates");
        assert!(entry.billable);
        assert!(entry.client_id.is_none());

        let reversed = FormFields::from_pairs(vec![
            ("start_time".to_string(), "2026-03-02T11:00".to_string()),
            ("end_time".to_string(), "2026-03-02T10:00".to_string()),
        ]);
        assert!(matches!(entry_from_form(&reversed), Err(AppError::Validation(_))));
    }
}
