use serde::Serialize;
use tera::Context;
use uuid::Uuid;

use crate::db::repositories::{TimeLog, TimeLogFilter, TimeTotals};
use crate::error::AppError;
use crate::services::time_tracking_service::format_datetime_local;
use crate::utils::pagination::Page;
use crate::views::layout::{query_string, PageContext, Pager};

pub struct TimeTrackingView<'a> {
    pub active: Option<&'a TimeLog>,
    pub clients: &'a [(String, String)],
    /// Employee filter, shown to admins only.
    pub employees: Option<&'a [(String, String)]>,
    pub filter: &'a TimeLogFilter,
    pub logs: &'a Page<TimeLog>,
    pub totals: TimeTotals,
    /// Billable minutes at the default hourly rate, for admins.
    pub billable_value: Option<bigdecimal::BigDecimal>,
    pub default_billable: bool,
    pub current_user: Uuid,
    pub is_admin: bool,
}

/// Values of the add/edit entry form; datetime-local inputs want
/// `YYYY-MM-DDTHH:MM`.
#[derive(Serialize)]
struct EntryForm {
    action: &'static str,
    id: Option<Uuid>,
    client_id: String,
    description: String,
    start: String,
    end: String,
    billable: bool,
}

impl EntryForm {
    fn blank(billable: bool) -> Self {
        Self {
            action: "add",
            id: None,
            client_id: String::new(),
            description: String::new(),
            start: String::new(),
            end: String::new(),
            billable,
        }
    }

    fn for_entry(entry: &TimeLog) -> Self {
        Self {
            action: "update",
            id: Some(entry.id),
            client_id: entry.client_id.map(|id| id.to_string()).unwrap_or_default(),
            description: entry.description.clone(),
            start: format_datetime_local(&entry.start_time),
            end: entry.end_time.as_ref().map(format_datetime_local).unwrap_or_default(),
            billable: entry.billable,
        }
    }
}

#[derive(Serialize)]
struct LogRow<'a> {
    #[serde(flatten)]
    log: &'a TimeLog,
    running: bool,
    can_manage: bool,
}

#[derive(Serialize)]
struct FilterValues {
    employee_id: String,
    client_id: String,
    from: String,
    to: String,
}

pub fn render_index(page: &PageContext, view: &TimeTrackingView<'_>) -> Result<String, AppError> {
    let rows: Vec<LogRow<'_>> = view
        .logs
        .items
        .iter()
        .map(|log| LogRow {
            log,
            running: log.is_running(),
            can_manage: view.is_admin || log.employee_id == view.current_user,
        })
        .collect();
    let filter = FilterValues {
        employee_id: view.filter.employee_id.map(|id| id.to_string()).unwrap_or_default(),
        client_id: view.filter.client_id.map(|id| id.to_string()).unwrap_or_default(),
        from: view.filter.range.from_value(),
        to: view.filter.range.to_value(),
    };

    let mut context = Context::new();
    context.insert("active", &view.active);
    context.insert("clients", view.clients);
    context.insert("employees", &view.employees);
    context.insert("default_billable", &view.default_billable);
    context.insert("new_entry", &EntryForm::blank(view.default_billable));
    context.insert("filter", &filter);
    context.insert("export_query", &filter_query(view.filter));
    context.insert("totals", &view.totals);
    context.insert("billable_value", &view.billable_value.as_ref().map(ToString::to_string));
    context.insert("rows", &rows);
    context.insert("pager", &Pager::new(view.logs, "/time-tracking", &filter_pairs(view.filter)));
    page.render("time_tracking/index.html", context)
}

pub fn render_edit(page: &PageContext, entry: &TimeLog, clients: &[(String, String)]) -> Result<String, AppError> {
    let mut context = Context::new();
    context.insert("entry", &EntryForm::for_entry(entry));
    context.insert("clients", clients);
    page.render("time_tracking/edit.html", context)
}

fn filter_pairs(filter: &TimeLogFilter) -> Vec<(&'static str, String)> {
    vec![
        ("employee_id", filter.employee_id.map(|id| id.to_string()).unwrap_or_default()),
        ("client_id", filter.client_id.map(|id| id.to_string()).unwrap_or_default()),
        ("from", filter.range.from_value()),
        ("to", filter.range.to_value()),
    ]
}

fn filter_query(filter: &TimeLogFilter) -> String {
    query_string(&filter_pairs(filter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use crate::utils::date_range::DateRange;
    use crate::utils::pagination::Pagination;
    use crate::views::layout::tests::{page_for, user};
    use chrono::{TimeZone, Utc};

    fn log(end: bool) -> TimeLog {
        let start = Utc.with_ymd_and_hms(2026, 10, 1, 9, 30, 0).unwrap();
        TimeLog {
            id: Uuid::new_v4(),
            employee_id: Uuid::new_v4(),
            employee_name: "Eve Employee".to_string(),
            client_id: None,
            client_name: None,
            description: "Patching <servers>".to_string(),
            start_time: start,
            end_time: end.then(|| start + chrono::Duration::minutes(90)),
            billable: true,
            duration_minutes: if end { 90 } else { 0 },
        }
    }

    #[test]
    fn test_filter_query_skips_empty_values() {
        let filter = TimeLogFilter {
            range: DateRange::from_query(Some("2026-03-01"), Some("2026-03-31")),
            ..Default::default()
        };
        assert_eq!(filter_query(&filter), "from=2026-03-01&to=2026-03-31");
    }

    #[test]
    fn test_index_marks_running_entries() {
        let employee = user(UserRole::Employee);
        let logs = Page::new(vec![log(false), log(true)], Pagination::new(Some(1), 20), 2);
        let filter = TimeLogFilter::default();
        let view = TimeTrackingView {
            active: None,
            clients: &[],
            employees: None,
            filter: &filter,
            logs: &logs,
            totals: TimeTotals {
                total_minutes: 90,
                billable_minutes: 90,
            },
            billable_value: None,
            default_billable: true,
            current_user: employee.user_id,
            is_admin: false,
        };
        let html = render_index(&page_for(Some(employee.clone())), &view).unwrap();
        assert!(html.contains("<td>running</td>"));
        assert!(html.contains("<td>2026-10-01 11:00</td>"));
        assert!(html.contains("Patching &lt;servers&gt;"));
        assert!(html.contains("Total: <strong>1h 30m</strong>"));
        // Rows of other employees carry no delete button.
        assert!(!html.contains(r#"value="delete""#));
    }

    #[test]
    fn test_edit_prefills_datetime_local_values() {
        let html = render_edit(&page_for(Some(user(UserRole::Employee))), &log(true), &[]).unwrap();
        assert!(html.contains(r#"name="start_time" value="2026-10-01T09:30""#));
        assert!(html.contains(r#"name="end_time" value="2026-10-01T11:00""#));
        assert!(html.contains("Save entry"));
    }
}
