use serde::Serialize;
use tera::Context;

use crate::error::AppError;
use crate::services::settings_service::{SettingGroup, SettingKind, SettingValue};
use crate::views::layout::PageContext;

#[derive(Serialize)]
struct Tab {
    key: &'static str,
    label: &'static str,
    active: bool,
}

/// One settings input; `input` is the HTML input type, or "integer" for
/// bounded whole numbers.
#[derive(Serialize)]
struct Field<'a> {
    key: &'static str,
    label: &'static str,
    input: &'static str,
    value: &'a str,
    checked: bool,
    min: Option<i64>,
    max: Option<i64>,
    default: &'static str,
}

fn field(setting: &SettingValue) -> Field<'_> {
    let definition = setting.definition;
    let (input, bounds) = match definition.kind {
        SettingKind::Boolean => ("checkbox", None),
        SettingKind::Email => ("email", None),
        SettingKind::Url => ("url", None),
        SettingKind::Number => ("number", None),
        SettingKind::Integer { min, max } => ("integer", Some((min, max))),
        SettingKind::Text => ("text", None),
    };
    Field {
        key: definition.key,
        label: definition.label,
        input,
        value: &setting.value,
        checked: setting.value == "1",
        min: bounds.map(|(min, _)| min),
        max: bounds.map(|(_, max)| max),
        default: definition.default,
    }
}

pub fn render(
    page: &PageContext,
    group: SettingGroup,
    values: &[SettingValue],
    pending_legacy: i64,
) -> Result<String, AppError> {
    let tabs: Vec<Tab> = SettingGroup::ALL
        .iter()
        .map(|g| Tab {
            key: g.as_str(),
            label: g.label(),
            active: *g == group,
        })
        .collect();
    let fields: Vec<Field<'_>> = values.iter().map(field).collect();

    let mut context = Context::new();
    context.insert("tabs", &tabs);
    context.insert("tab", group.as_str());
    context.insert("action_url", &format!("/admin/settings?tab={}", group.as_str()));
    context.insert("fields", &fields);
    context.insert("pending_legacy", &pending_legacy);
    page.render("settings.html", context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use crate::services::settings_service::definition;
    use crate::views::layout::tests::{page_for, user};

    fn value(key: &str, value: &str) -> SettingValue {
        SettingValue {
            definition: definition(key).unwrap(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_tickets_tab_renders_fields_by_kind() {
        let values = [
            value("tickets.clients_can_close", "1"),
            value("tickets.max_attachments", "5"),
        ];
        let html = render(&page_for(Some(user(UserRole::Admin))), SettingGroup::Tickets, &values, 0).unwrap();
        assert!(html.contains("<strong>Tickets</strong>"));
        assert!(html.contains(r#"name="tickets.clients_can_close" value="1" checked>"#));
        assert!(html.contains(r#"name="tickets.max_attachments" value="5" min="0" max="20" step="1""#));
        assert!(!html.contains("Legacy settings"));
    }

    #[test]
    fn test_pending_legacy_offers_migration() {
        let html = render(&page_for(Some(user(UserRole::Admin))), SettingGroup::General, &[], 2).unwrap();
        assert!(html.contains("2 setting(s) from an older version"));
        assert!(html.contains(r#"value="migrate_legacy""#));
    }
}
