use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::{BigDecimal, Zero};
use uuid::Uuid;

use crate::db::repositories::{LegacyKey, SettingsRepository};
use crate::error::AppError;
use crate::utils::form::FormFields;
use crate::utils::pagination::{DEFAULT_PER_PAGE, MAX_PER_PAGE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingGroup {
    General,
    Company,
    Tickets,
    TimeTracking,
    Email,
}

impl SettingGroup {
    pub const ALL: [SettingGroup; 5] = [
        SettingGroup::General,
        SettingGroup::Company,
        SettingGroup::Tickets,
        SettingGroup::TimeTracking,
        SettingGroup::Email,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingGroup::General => "general",
            SettingGroup::Company => "company",
            SettingGroup::Tickets => "tickets",
            SettingGroup::TimeTracking => "time_tracking",
            SettingGroup::Email => "email",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SettingGroup::General => "General",
            SettingGroup::Company => "Company",
            SettingGroup::Tickets => "Tickets",
            SettingGroup::TimeTracking => "Time tracking",
            SettingGroup::Email => "Email",
        }
    }

    /// Unknown tab names fall back to the general tab.
    pub fn from_query(value: Option<&str>) -> SettingGroup {
        value
            .and_then(|v| SettingGroup::ALL.into_iter().find(|g| g.as_str() == v))
            .unwrap_or(SettingGroup::General)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Text,
    Email,
    Url,
    /// Non-negative decimal such as a rate.
    Number,
    /// Whole number within inclusive bounds.
    Integer { min: i64, max: i64 },
    Boolean,
}

#[derive(Debug, Clone, Copy)]
pub struct SettingDefinition {
    pub key: &'static str,
    pub group: SettingGroup,
    pub label: &'static str,
    pub kind: SettingKind,
    pub default: &'static str,
}

const fn setting(
    key: &'static str,
    group: SettingGroup,
    label: &'static str,
    kind: SettingKind,
    default: &'static str,
) -> SettingDefinition {
    SettingDefinition { key, group, label, kind, default }
}

const MAX_ATTACHMENTS: i64 = 20;

pub const SETTINGS: &[SettingDefinition] = &[
    setting("general.site_name", SettingGroup::General, "Portal name", SettingKind::Text, "Client Portal"),
    setting("general.support_email", SettingGroup::General, "Support email", SettingKind::Email, ""),
    setting("general.items_per_page", SettingGroup::General, "Rows per page", SettingKind::Integer { min: 1, max: MAX_PER_PAGE }, "25"),
    setting("general.dashboard_notice", SettingGroup::General, "Dashboard notice", SettingKind::Text, ""),
    setting("company.name", SettingGroup::Company, "Company name", SettingKind::Text, ""),
    setting("company.email", SettingGroup::Company, "Company email", SettingKind::Email, ""),
    setting("company.phone", SettingGroup::Company, "Phone", SettingKind::Text, ""),
    setting("company.address", SettingGroup::Company, "Address", SettingKind::Text, ""),
    setting("company.website", SettingGroup::Company, "Website", SettingKind::Url, ""),
    setting(
        "tickets.auto_reply",
        SettingGroup::Tickets,
        "Confirmation shown after a client opens a ticket",
        SettingKind::Text,
        "Thanks, we received your request and will get back to you shortly.",
    ),
    setting("tickets.clients_can_close", SettingGroup::Tickets, "Clients may close their tickets", SettingKind::Boolean, "1"),
    setting("tickets.max_attachments", SettingGroup::Tickets, "Attachments per message", SettingKind::Integer { min: 0, max: MAX_ATTACHMENTS }, "5"),
    setting("time_tracking.default_hourly_rate", SettingGroup::TimeTracking, "Default hourly rate", SettingKind::Number, "0"),
    setting("time_tracking.default_billable", SettingGroup::TimeTracking, "New entries are billable", SettingKind::Boolean, "1"),
    setting("email.from_name", SettingGroup::Email, "Sender name", SettingKind::Text, "Client Portal"),
    setting("email.from_address", SettingGroup::Email, "Sender address", SettingKind::Email, ""),
    setting("email.notifications_enabled", SettingGroup::Email, "Send notifications", SettingKind::Boolean, "0"),
];

/// Ungrouped keys written by older installs and the keys replacing them.
pub const LEGACY_KEYS: &[LegacyKey] = &[
    LegacyKey { old_key: "site_name", new_key: "general.site_name", group: "general" },
    LegacyKey { old_key: "admin_email", new_key: "general.support_email", group: "general" },
    LegacyKey { old_key: "items_per_page", new_key: "general.items_per_page", group: "general" },
    LegacyKey { old_key: "company_name", new_key: "company.name", group: "company" },
    LegacyKey { old_key: "company_email", new_key: "company.email", group: "company" },
    LegacyKey { old_key: "company_phone", new_key: "company.phone", group: "company" },
    LegacyKey { old_key: "company_address", new_key: "company.address", group: "company" },
    LegacyKey { old_key: "company_website", new_key: "company.website", group: "company" },
    LegacyKey { old_key: "ticket_auto_reply", new_key: "tickets.auto_reply", group: "tickets" },
    LegacyKey { old_key: "default_hourly_rate", new_key: "time_tracking.default_hourly_rate", group: "time_tracking" },
    LegacyKey { old_key: "mail_from_name", new_key: "email.from_name", group: "email" },
    LegacyKey { old_key: "mail_from_address", new_key: "email.from_address", group: "email" },
];

pub fn definition(key: &str) -> Option<&'static SettingDefinition> {
    SETTINGS.iter().find(|d| d.key == key)
}

pub fn definitions_for(group: SettingGroup) -> impl Iterator<Item = &'static SettingDefinition> {
    SETTINGS.iter().filter(move |d| d.group == group)
}

/// Normalizes a submitted value for its kind or explains why it is invalid.
/// `None` is an unchecked checkbox or a missing field.
pub fn validate_value(definition: &SettingDefinition, raw: Option<&str>) -> Result<String, AppError> {
    let value = raw.map(str::trim).unwrap_or("");
    let invalid = |reason: &str| AppError::Validation(format!("{}: {}", definition.label, reason));

    match definition.kind {
        SettingKind::Boolean => Ok(if matches!(value, "1" | "on" | "true" | "yes") { "1" } else { "0" }.to_string()),
        SettingKind::Text => {
            if value.chars().count() > 2000 {
                return Err(invalid("must be at most 2000 characters"));
            }
            Ok(value.to_string())
        }
        SettingKind::Email => {
            if value.is_empty() {
                return Ok(String::new());
            }
            let valid = match value.split_once('@') {
                Some((local, domain)) => {
                    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.') && !domain.contains('@')
                }
                None => false,
            };
            if !valid || value.contains(char::is_whitespace) {
                return Err(invalid("is not a valid email address"));
            }
            Ok(value.to_string())
        }
        SettingKind::Url => {
            if value.is_empty() {
                return Ok(String::new());
            }
            match url::Url::parse(value) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some() => Ok(value.to_string()),
                _ => Err(invalid("must be a full http:// or https:// address")),
            }
        }
        SettingKind::Number => {
            // Plain notation only; BigDecimal would also take "1e3".
            if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-') {
                return Err(invalid("must be a number"));
            }
            let number = BigDecimal::from_str(value).map_err(|_| invalid("must be a number"))?;
            if number < BigDecimal::zero() {
                return Err(invalid("must not be negative"));
            }
            Ok(value.to_string())
        }
        SettingKind::Integer { min, max } => {
            let number = value.parse::<i64>().map_err(|_| invalid("must be a whole number"))?;
            if number < min || number > max {
                return Err(invalid(&format!("must be between {} and {}", min, max)));
            }
            Ok(number.to_string())
        }
    }
}

/// One row on a settings tab: its definition and the effective value.
#[derive(Debug, Clone)]
pub struct SettingValue {
    pub definition: &'static SettingDefinition,
    pub value: String,
}

pub struct SettingsService {
    repository: Arc<SettingsRepository>,
}

impl SettingsService {
    pub fn new(repository: Arc<SettingsRepository>) -> Self {
        Self { repository }
    }

    pub async fn tab(&self, group: SettingGroup) -> Result<Vec<SettingValue>, AppError> {
        let stored = self.repository.values_for_group(group.as_str()).await?;
        Ok(effective_values(group, &stored))
    }

    /// Validates every key of the tab first and saves only when all pass.
    pub async fn save_tab(&self, group: SettingGroup, form: &FormFields, updated_by: &Uuid) -> Result<usize, AppError> {
        let mut values = Vec::new();
        for definition in definitions_for(group) {
            let normalized = validate_value(definition, form.raw(definition.key))?;
            values.push((definition.key.to_string(), normalized));
        }
        self.repository.save_group(group.as_str(), &values, updated_by).await?;
        log::info!("Settings tab {} saved by {}", group.as_str(), updated_by);
        Ok(values.len())
    }

    pub async fn migrate_legacy(&self) -> Result<u64, AppError> {
        let moved = self.repository.migrate_legacy(LEGACY_KEYS).await?;
        log::info!("Legacy settings migration moved {} value(s)", moved);
        Ok(moved)
    }

    pub async fn pending_legacy_count(&self) -> Result<i64, AppError> {
        self.repository.count_legacy(LEGACY_KEYS).await
    }

    /// Stored value or the registry default. Lookup failures are logged
    /// and fall back to the default so a page can still render.
    pub async fn get(&self, key: &str) -> String {
        let default = definition(key).map(|d| d.default).unwrap_or("");
        match self.repository.get_value(key).await {
            Ok(Some(value)) => value,
            Ok(None) => default.to_string(),
            Err(e) => {
                log::error!("Falling back to default for setting {}: {}", key, e);
                default.to_string()
            }
        }
    }

    pub async fn get_bool(&self, key: &str) -> bool {
        self.get(key).await == "1"
    }

    pub async fn items_per_page(&self) -> i64 {
        self.get("general.items_per_page")
            .await
            .parse::<i64>()
            .map(|n| n.clamp(1, MAX_PER_PAGE))
            .unwrap_or(DEFAULT_PER_PAGE)
    }

    pub async fn default_hourly_rate(&self) -> BigDecimal {
        BigDecimal::from_str(&self.get("time_tracking.default_hourly_rate").await).unwrap_or_else(|_| BigDecimal::zero())
    }

    pub async fn ticket_auto_reply(&self) -> Option<String> {
        Some(self.get("tickets.auto_reply").await).filter(|s| !s.trim().is_empty())
    }

    pub async fn max_attachments(&self) -> usize {
        self.get("tickets.max_attachments")
            .await
            .parse::<usize>()
            .map(|n| n.min(MAX_ATTACHMENTS as usize))
            .unwrap_or(5)
    }
}

fn effective_values(group: SettingGroup, stored: &HashMap<String, String>) -> Vec<SettingValue> {
    definitions_for(group)
        .map(|definition| SettingValue {
            definition,
            value: stored
                .get(definition.key)
                .cloned()
                .unwrap_or_else(|| definition.default.to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn def(kind: SettingKind) -> SettingDefinition {
        setting("test.key", SettingGroup::General, "Test", kind, "")
    }

    #[test]
    fn test_registry_keys_are_unique_and_grouped() {
        let keys: HashSet<_> = SETTINGS.iter().map(|d| d.key).collect();
        assert_eq!(keys.len(), SETTINGS.len());
        for definition in SETTINGS {
            assert!(definition.key.starts_with(&format!("{}.", definition.group.as_str())));
        }
        for group in SettingGroup::ALL {
            assert!(definitions_for(group).count() > 0);
        }
    }

    #[test]
    fn test_legacy_keys_point_at_registered_settings() {
        for legacy in LEGACY_KEYS {
            let target = definition(legacy.new_key).unwrap();
            assert_eq!(target.group.as_str(), legacy.group);
            assert!(definition(legacy.old_key).is_none());
        }
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(validate_value(&def(SettingKind::Email), Some(" a@b.co ")).unwrap(), "a@b.co");
        assert_eq!(validate_value(&def(SettingKind::Email), None).unwrap(), "");
        assert!(validate_value(&def(SettingKind::Email), Some("not-an-email")).is_err());
        assert!(validate_value(&def(SettingKind::Email), Some("a@localhost")).is_err());
    }

    #[test]
    fn test_validate_url_and_number() {
        assert!(validate_value(&def(SettingKind::Url), Some("https://example.com")).is_ok());
        assert!(validate_value(&def(SettingKind::Url), Some("javascript:alert(1)")).is_err());
        assert!(validate_value(&def(SettingKind::Number), Some("12.50")).is_ok());
        assert!(validate_value(&def(SettingKind::Number), Some("-1")).is_err());
        assert!(validate_value(&def(SettingKind::Number), Some("")).is_err());
        assert!(validate_value(&def(SettingKind::Number), Some("1e3")).is_err());
    }

    #[test]
    fn test_validate_integer_rejects_fractions_and_out_of_range() {
        let per_page = definition("general.items_per_page").unwrap();
        assert_eq!(validate_value(per_page, Some(" 40 ")).unwrap(), "40");
        assert!(validate_value(per_page, Some("2.5")).is_err());
        assert!(validate_value(per_page, Some("1e3")).is_err());
        assert!(validate_value(per_page, Some("0")).is_err());
        assert!(validate_value(per_page, Some(&(MAX_PER_PAGE + 1).to_string())).is_err());

        let attachments = definition("tickets.max_attachments").unwrap();
        assert_eq!(validate_value(attachments, Some("0")).unwrap(), "0");
        assert!(validate_value(attachments, Some("2.5")).is_err());
        assert!(validate_value(attachments, Some("-1")).is_err());
    }

    #[test]
    fn test_unchecked_checkbox_is_false() {
        assert_eq!(validate_value(&def(SettingKind::Boolean), None).unwrap(), "0");
        assert_eq!(validate_value(&def(SettingKind::Boolean), Some("1")).unwrap(), "1");
    }

    #[test]
    fn test_effective_values_fall_back_to_defaults() {
        let mut stored = HashMap::new();
        stored.insert("general.site_name".to_string(), "Acme Portal".to_string());
        let values = effective_values(SettingGroup::General, &stored);
        let site = values.iter().find(|v| v.definition.key == "general.site_name").unwrap();
        let per_page = values.iter().find(|v| v.definition.key == "general.items_per_page").unwrap();
        assert_eq!(site.value, "Acme Portal");
        assert_eq!(per_page.value, "25");
    }

    #[test]
    fn test_group_from_query() {
        assert_eq!(SettingGroup::from_query(Some("email")), SettingGroup::Email);
        assert_eq!(SettingGroup::from_query(Some("bogus")), SettingGroup::General);
        assert_eq!(SettingGroup::from_query(None), SettingGroup::General);
    }
}
