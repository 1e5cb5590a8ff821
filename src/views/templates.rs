use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tera::{Context, Tera, Value};

use crate::db::repositories::MediaKind;
use crate::error::AppError;
use crate::models::{BillingCycle, CrmStatus, SubscriptionStatus, TicketPriority, TicketStatus, UserRole};

/// Page templates compiled into the binary. Names ending in `.html` are
/// autoescaped.
const TEMPLATES: &[(&str, &str)] = &[
    ("style.css", include_str!("../../templates/style.css")),
    ("base.html", include_str!("../../templates/base.html")),
    ("macros.html", include_str!("../../templates/macros.html")),
    ("login.html", include_str!("../../templates/login.html")),
    ("dashboard.html", include_str!("../../templates/dashboard.html")),
    ("profile.html", include_str!("../../templates/profile.html")),
    ("tickets/list.html", include_str!("../../templates/tickets/list.html")),
    ("tickets/new.html", include_str!("../../templates/tickets/new.html")),
    ("tickets/detail.html", include_str!("../../templates/tickets/detail.html")),
    ("time_tracking/index.html", include_str!("../../templates/time_tracking/index.html")),
    ("time_tracking/edit.html", include_str!("../../templates/time_tracking/edit.html")),
    ("clients/list.html", include_str!("../../templates/clients/list.html")),
    ("clients/detail.html", include_str!("../../templates/clients/detail.html")),
    ("care_plans.html", include_str!("../../templates/care_plans.html")),
    ("subscriptions/list.html", include_str!("../../templates/subscriptions/list.html")),
    ("subscriptions/detail.html", include_str!("../../templates/subscriptions/detail.html")),
    ("subscriptions/my_plan.html", include_str!("../../templates/subscriptions/my_plan.html")),
    ("media.html", include_str!("../../templates/media.html")),
    ("assignments.html", include_str!("../../templates/assignments.html")),
    ("azure.html", include_str!("../../templates/azure.html")),
    ("admin_users/list.html", include_str!("../../templates/admin_users/list.html")),
    ("admin_users/edit.html", include_str!("../../templates/admin_users/edit.html")),
    ("settings.html", include_str!("../../templates/settings.html")),
];

/// Standalone page for errors raised outside a handler; rendered with
/// `Tera::one_off` since no registry is reachable from `ResponseError`.
pub const ERROR_TEMPLATE: &str = include_str!("../../templates/error.html");
pub const STYLESHEET: &str = include_str!("../../templates/style.css");

/// Builds the template registry with the portal's filters.
pub fn build() -> Result<Tera, AppError> {
    let mut tera = Tera::default();
    tera.add_raw_templates(TEMPLATES.iter().copied()).map_err(|e| {
        log::error!("Template compilation error: {:?}", e);
        AppError::Configuration(format!("Template compilation error: {}", e))
    })?;
    tera.register_filter("datetime", datetime_filter);
    tera.register_filter("minutes", minutes_filter);
    tera.register_filter("bytes", bytes_filter);
    tera.register_filter("label", label_filter);
    Ok(tera)
}

pub fn render(tera: &Tera, name: &str, context: &Context) -> Result<String, AppError> {
    tera.render(name, context).map_err(|e| {
        log::error!("Template rendering error in {}: {:?}", name, e);
        AppError::Internal(format!("Template rendering error: {}", e))
    })
}

pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M").to_string()
}

/// Minutes as "2h 05m".
pub fn format_minutes(minutes: i64) -> String {
    let minutes = minutes.max(0);
    format!("{}h {:02}m", minutes / 60, minutes % 60)
}

pub fn format_bytes(bytes: i64) -> String {
    const KB: f64 = 1024.0;
    let value = bytes.max(0) as f64;
    if value >= KB * KB {
        format!("{:.1} MB", value / (KB * KB))
    } else if value >= KB {
        format!("{:.1} KB", value / KB)
    } else {
        format!("{} B", bytes.max(0))
    }
}

/// `{{ ts | datetime }}`; null renders as `empty` (default "-").
fn datetime_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let empty = args.get("empty").and_then(Value::as_str).unwrap_or("-");
    match value {
        Value::Null => Ok(Value::String(empty.to_string())),
        Value::String(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|parsed| Value::String(format_datetime(&parsed.with_timezone(&Utc))))
            .map_err(|e| tera::Error::msg(format!("datetime filter: {} is not a timestamp: {}", raw, e))),
        other => Err(tera::Error::msg(format!("datetime filter expects a timestamp, got {}", other))),
    }
}

fn minutes_filter(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    let minutes = value
        .as_i64()
        .ok_or_else(|| tera::Error::msg(format!("minutes filter expects an integer, got {}", value)))?;
    Ok(Value::String(format_minutes(minutes)))
}

fn bytes_filter(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    let bytes = value
        .as_i64()
        .ok_or_else(|| tera::Error::msg(format!("bytes filter expects an integer, got {}", value)))?;
    Ok(Value::String(format_bytes(bytes)))
}

/// `{{ ticket.status | label(of="ticket_status") }}`: display label of a
/// stored enum value. Unknown values are shown as stored.
fn label_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let raw = value
        .as_str()
        .ok_or_else(|| tera::Error::msg(format!("label filter expects a string, got {}", value)))?;
    let of = args
        .get("of")
        .and_then(Value::as_str)
        .ok_or_else(|| tera::Error::msg("label filter needs an `of` argument"))?;
    let label = match of {
        "ticket_status" => raw.parse::<TicketStatus>().ok().map(|v| v.label()),
        "ticket_priority" => raw.parse::<TicketPriority>().ok().map(|v| v.label()),
        "role" => raw.parse::<UserRole>().ok().map(|v| v.label()),
        "crm_status" => raw.parse::<CrmStatus>().ok().map(|v| v.label()),
        "subscription_status" => raw.parse::<SubscriptionStatus>().ok().map(|v| v.label()),
        "billing_cycle" => raw.parse::<BillingCycle>().ok().map(|v| v.label()),
        "media_kind" => MediaKind::parse(raw).map(|v| v.label()),
        other => return Err(tera::Error::msg(format!("label filter: unknown kind {}", other))),
    };
    Ok(Value::String(label.unwrap_or(raw).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_templates_compile() {
        let tera = build().unwrap();
        assert!(tera.get_template_names().any(|name| name == "tickets/detail.html"));
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(0), "0h 00m");
        assert_eq!(format_minutes(125), "2h 05m");
        assert_eq!(format_minutes(-5), "0h 00m");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_filters_render_values() {
        let mut tera = build().unwrap();
        tera.add_raw_template(
            "filters.html",
            r#"{{ at | datetime }}|{{ missing | datetime }}|{{ missing | datetime(empty="") }}|{{ spent | minutes }}|{{ size | bytes }}|{{ status | label(of="ticket_status") }}|{{ name }}"#,
        )
        .unwrap();
        let mut context = Context::new();
        let at: DateTime<Utc> = DateTime::parse_from_rfc3339("2026-10-01T09:30:00Z").unwrap().with_timezone(&Utc);
        context.insert("at", &at);
        context.insert("missing", &Option::<DateTime<Utc>>::None);
        context.insert("spent", &125);
        context.insert("size", &2048);
        context.insert("status", &TicketStatus::WaitingOnClient);
        context.insert("name", "<b>Acme</b>");
        assert_eq!(
            render(&tera, "filters.html", &context).unwrap(),
            "2026-10-01 09:30|-||2h 05m|2.0 KB|Waiting on client|&lt;b&gt;Acme&lt;&#x2F;b&gt;"
        );
    }

    #[test]
    fn test_label_filter_rejects_unknown_kind() {
        let mut tera = build().unwrap();
        tera.add_raw_template("bad.html", r#"{{ "open" | label(of="colour") }}"#).unwrap();
        assert!(matches!(render(&tera, "bad.html", &Context::new()), Err(AppError::Internal(_))));
    }
}
