use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::AppError;
use crate::utils::date_range::parse_date;

/// Decoded form body. Keeps every pair in order so repeated keys such as
/// `ticket_ids[]` survive, which typed form extraction would drop.
#[derive(Clone, Debug, Default)]
pub struct FormFields {
    pairs: Vec<(String, String)>,
}

impl FormFields {
    pub fn parse(body: &[u8]) -> Self {
        Self {
            pairs: url::form_urlencoded::parse(body).into_owned().collect(),
        }
    }

    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Last value for `key`, raw.
    pub fn raw(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Trimmed value; empty strings count as absent.
    pub fn optional(&self, key: &str) -> Option<&str> {
        self.raw(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn optional_string(&self, key: &str) -> Option<String> {
        self.optional(key).map(str::to_string)
    }

    pub fn required(&self, key: &str, label: &str) -> Result<&str, AppError> {
        self.optional(key)
            .ok_or_else(|| AppError::Validation(format!("{} is required", label)))
    }

    pub fn action(&self) -> Result<&str, AppError> {
        self.optional("action")
            .ok_or_else(|| AppError::BadRequest("Missing form action".to_string()))
    }

    pub fn parse_required<T: FromStr>(&self, key: &str, label: &str) -> Result<T, AppError> {
        let value = self.required(key, label)?;
        value
            .parse::<T>()
            .map_err(|_| AppError::Validation(format!("{} is not valid", label)))
    }

    pub fn parse_optional<T: FromStr>(&self, key: &str, label: &str) -> Result<Option<T>, AppError> {
        self.optional(key)
            .map(|value| {
                value
                    .parse::<T>()
                    .map_err(|_| AppError::Validation(format!("{} is not valid", label)))
            })
            .transpose()
    }

    pub fn uuid(&self, key: &str, label: &str) -> Result<Uuid, AppError> {
        self.parse_required::<Uuid>(key, label)
    }

    pub fn optional_uuid(&self, key: &str, label: &str) -> Result<Option<Uuid>, AppError> {
        self.parse_optional::<Uuid>(key, label)
    }

    pub fn date(&self, key: &str, label: &str) -> Result<NaiveDate, AppError> {
        let value = self.required(key, label)?;
        parse_date(value).ok_or_else(|| AppError::Validation(format!("{} must be a date (YYYY-MM-DD)", label)))
    }

    pub fn decimal(&self, key: &str, label: &str) -> Result<BigDecimal, AppError> {
        let value = self.required(key, label)?;
        BigDecimal::from_str(value)
            .map_err(|_| AppError::Validation(format!("{} must be a number", label)))
    }

    /// HTML checkboxes are only submitted when ticked.
    pub fn checkbox(&self, key: &str) -> bool {
        matches!(self.optional(key), Some("1" | "on" | "true" | "yes"))
    }

    /// All values for `key` (also accepts the `key[]` spelling), in order.
    pub fn all(&self, key: &str) -> Vec<&str> {
        let bracketed = format!("{}[]", key);
        self.pairs
            .iter()
            .filter(|(k, _)| k == key || *k == bracketed)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
            .collect()
    }

    pub fn all_uuids(&self, key: &str) -> Result<Vec<Uuid>, AppError> {
        self.all(key)
            .into_iter()
            .map(|v| {
                Uuid::parse_str(v).map_err(|_| AppError::Validation(format!("Invalid id: {}", v)))
            })
            .collect()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_urlencoded_body() {
        let form = FormFields::parse(b"action=start&description=Fix+login%21&client_id=");
        assert_eq!(form.action().unwrap(), "start");
        assert_eq!(form.optional("description"), Some("Fix login!"));
        assert_eq!(form.optional("client_id"), None);
    }

    #[test]
    fn test_repeated_keys_are_kept() {
        let id1 = Uuid::new_v4();
        let id2 = Uuid::new_v4();
        let body = format!("ticket_ids%5B%5D={}&ticket_ids%5B%5D={}&action=close", id1, id2);
        let form = FormFields::parse(body.as_bytes());
        assert_eq!(form.all_uuids("ticket_ids").unwrap(), vec![id1, id2]);
    }

    #[test]
    fn test_required_and_parse_errors_are_validation() {
        let form = FormFields::parse(b"hours=abc");
        assert!(matches!(form.required("name", "Name"), Err(AppError::Validation(_))));
        assert!(matches!(form.parse_required::<i32>("hours", "Hours"), Err(AppError::Validation(_))));
        assert!(form.parse_optional::<i32>("missing", "Missing").unwrap().is_none());
    }

    #[test]
    fn test_checkbox_values() {
        let form = FormFields::parse(b"billable=on&internal=0");
        assert!(form.checkbox("billable"));
        assert!(!form.checkbox("internal"));
        assert!(!form.checkbox("absent"));
    }

    #[test]
    fn test_decimal_and_date() {
        let form = FormFields::parse(b"price=149.50&start=2026-10-01&bad=10/01/2026");
        assert_eq!(form.decimal("price", "Price").unwrap().to_string(), "149.50");
        assert_eq!(form.date("start", "Start").unwrap().to_string(), "2026-10-01");
        assert!(form.date("bad", "Bad").is_err());
    }
}
