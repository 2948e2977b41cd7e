use chrono::{Datelike, Duration, NaiveDate, Utc};

/// Monday..Sunday date range used to scope every timetable query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WeekWindow {
    /// The week containing `date`. Weeks start on Monday.
    pub fn containing(date: NaiveDate) -> Self {
        let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
        Self {
            start: monday,
            end: monday + Duration::days(6),
        }
    }

    /// The week containing today (UTC).
    pub fn current() -> Self {
        Self::containing(Utc::now().date_naive())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Parse the `week_start` query parameter. A present-but-unparseable value
/// is a hard validation error, never a fallback to the current week.
pub fn resolve_week(week_start: Option<&str>) -> Result<WeekWindow, InvalidDateInput> {
    match week_start {
        None => Ok(WeekWindow::current()),
        Some(raw) => {
            let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map_err(|_| InvalidDateInput(raw.to_string()))?;
            Ok(WeekWindow::containing(date))
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid date input: {0}")]
pub struct InvalidDateInput(pub String);

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn thursday_resolves_to_enclosing_monday_and_sunday() {
        let window = WeekWindow::containing(d("2024-03-14"));
        assert_eq!(window.start, d("2024-03-11"));
        assert_eq!(window.end, d("2024-03-17"));
    }

    #[test]
    fn every_day_of_a_week_maps_to_the_same_window() {
        let expected = WeekWindow::containing(d("2024-03-11"));
        for offset in 0..7 {
            let day = d("2024-03-11") + Duration::days(offset);
            assert_eq!(WeekWindow::containing(day), expected);
        }
    }

    #[test]
    fn window_starts_monday_ends_sunday_and_covers_input() {
        let mut day = d("2023-12-25");
        for _ in 0..400 {
            let window = WeekWindow::containing(day);
            assert_eq!(window.start.weekday(), Weekday::Mon);
            assert_eq!(window.end.weekday(), Weekday::Sun);
            assert!(window.contains(day));
            day += Duration::days(1);
        }
    }

    #[test]
    fn monday_is_its_own_week_start() {
        let window = WeekWindow::containing(d("2024-03-11"));
        assert_eq!(window.start, d("2024-03-11"));
    }

    #[test]
    fn year_boundary_week_spans_both_years() {
        let window = WeekWindow::containing(d("2025-01-01"));
        assert_eq!(window.start, d("2024-12-30"));
        assert_eq!(window.end, d("2025-01-05"));
    }

    #[test]
    fn absent_parameter_defaults_to_current_week() {
        let window = resolve_week(None).unwrap();
        assert!(window.contains(Utc::now().date_naive()));
    }

    #[test]
    fn explicit_parameter_is_parsed() {
        let window = resolve_week(Some("2024-03-14")).unwrap();
        assert_eq!(window.start, d("2024-03-11"));
    }

    #[test]
    fn malformed_parameter_is_rejected_not_defaulted() {
        assert!(resolve_week(Some("not-a-date")).is_err());
        assert!(resolve_week(Some("2024-13-40")).is_err());
        assert!(resolve_week(Some("")).is_err());
    }
}
