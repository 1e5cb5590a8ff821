use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

/// Calendar-day filter from `from` / `to` query values (YYYY-MM-DD).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    /// Values that do not parse are ignored. A reversed range is swapped so
    /// that a typo in the form still yields the days the user meant.
    pub fn from_query(from: Option<&str>, to: Option<&str>) -> Self {
        let from = from.and_then(parse_date);
        let to = to.and_then(parse_date);
        match (from, to) {
            (Some(a), Some(b)) if a > b => Self { from: Some(b), to: Some(a) },
            _ => Self { from, to },
        }
    }

    /// Monday through Sunday of the week containing `day`.
    pub fn week_of(day: NaiveDate) -> Self {
        let monday = day - Duration::days(day.weekday().num_days_from_monday() as i64);
        Self {
            from: Some(monday),
            to: Some(monday + Duration::days(6)),
        }
    }

    /// Inclusive lower bound at 00:00 UTC of `from`.
    pub fn start_bound(&self) -> Option<DateTime<Utc>> {
        self.from
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    }

    /// Exclusive upper bound at 00:00 UTC of the day after `to`, so the whole
    /// `to` day is included.
    pub fn end_bound(&self) -> Option<DateTime<Utc>> {
        self.to
            .and_then(|d| d.succ_opt())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    }

    pub fn is_empty(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    pub fn from_value(&self) -> String {
        self.from.map(|d| d.to_string()).unwrap_or_default()
    }

    pub fn to_value(&self) -> String {
        self.to.map(|d| d.to_string()).unwrap_or_default()
    }
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bounds_cover_whole_days() {
        let range = DateRange::from_query(Some("2026-03-01"), Some("2026-03-31"));
        assert_eq!(range.start_bound().unwrap(), Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(range.end_bound().unwrap(), Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_last_second_of_end_day_is_inside() {
        let range = DateRange::from_query(None, Some("2026-03-31"));
        let late = Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 59).unwrap();
        assert!(late < range.end_bound().unwrap());
        assert!(range.start_bound().is_none());
    }

    #[test]
    fn test_invalid_values_are_ignored() {
        let range = DateRange::from_query(Some("yesterday"), Some(""));
        assert!(range.is_empty());
        assert_eq!(range.from_value(), "");
    }

    #[test]
    fn test_reversed_range_is_swapped() {
        let range = DateRange::from_query(Some("2026-05-10"), Some("2026-05-01"));
        assert_eq!(range.from_value(), "2026-05-01");
        assert_eq!(range.to_value(), "2026-05-10");
    }

    #[test]
    fn test_week_of_starts_monday() {
        let wednesday = NaiveDate::from_ymd_opt(2026, 10, 14).unwrap();
        let week = DateRange::week_of(wednesday);
        assert_eq!(week.from_value(), "2026-10-12");
        assert_eq!(week.to_value(), "2026-10-18");
    }
}
