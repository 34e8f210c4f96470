//! Carrier deadline date math.
//!
//! Deadlines are defined as a trigger date plus an offset, counted in either
//! calendar days or business days (weekends skipped, holidays not modeled).
//! Everything here is pure so the escalation scan can be tested without a
//! database.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Advance `start` by `days` business days. Saturdays and Sundays never
/// count toward the offset; a result landing on a weekend rolls forward
/// to Monday even when `days` is zero.
pub fn add_business_days(start: NaiveDate, days: i64) -> NaiveDate {
    let mut current = start;
    let mut remaining = days.max(0);
    while remaining > 0 {
        current += Duration::days(1);
        if !is_weekend(current) {
            remaining -= 1;
        }
    }
    while is_weekend(current) {
        current += Duration::days(1);
    }
    current
}

/// Compute the concrete deadline date from its definition.
pub fn compute_deadline_date(trigger: NaiveDate, offset_days: i64, business_days: bool) -> NaiveDate {
    if business_days {
        add_business_days(trigger, offset_days)
    } else {
        trigger + Duration::days(offset_days.max(0))
    }
}

/// Signed day distance from `today` to `deadline`. Negative means overdue.
pub fn days_until(today: NaiveDate, deadline: NaiveDate) -> i64 {
    (deadline - today).num_days()
}

/// How urgent a pending deadline is relative to today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Overdue,
    DueToday,
    Approaching,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Overdue => "overdue",
            Urgency::DueToday => "due_today",
            Urgency::Approaching => "approaching",
        }
    }
}

/// Classify a signed day distance as produced by [`days_until`].
pub fn classify(days: i64) -> Urgency {
    match days {
        d if d < 0 => Urgency::Overdue,
        0 => Urgency::DueToday,
        _ => Urgency::Approaching,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date literal")
    }

    #[test]
    fn test_calendar_offset() {
        // Friday + 3 calendar days lands on Monday
        assert_eq!(
            compute_deadline_date(date("2026-03-06"), 3, false),
            date("2026-03-09")
        );
    }

    #[test]
    fn test_business_days_skip_weekend() {
        // Friday + 3 business days: Mon, Tue, Wed
        assert_eq!(
            compute_deadline_date(date("2026-03-06"), 3, true),
            date("2026-03-11")
        );
    }

    #[test]
    fn test_business_days_span_two_weekends() {
        // Thursday + 7 business days crosses two weekends
        assert_eq!(
            compute_deadline_date(date("2026-03-05"), 7, true),
            date("2026-03-16")
        );
    }

    #[test]
    fn test_ten_business_days_from_monday_is_fourteen_calendar_days() {
        let monday = date("2026-03-02");
        let deadline = compute_deadline_date(monday, 10, true);
        assert_eq!(deadline, date("2026-03-16"));
        assert_eq!(days_until(monday, deadline), 14);
        assert!(!is_weekend(deadline));
    }

    #[test]
    fn test_zero_business_offset_rolls_off_weekend() {
        // A zero offset triggered on Saturday still resolves to Monday
        assert_eq!(
            compute_deadline_date(date("2026-03-07"), 0, true),
            date("2026-03-09")
        );
        // Zero calendar offset stays put
        assert_eq!(
            compute_deadline_date(date("2026-03-07"), 0, false),
            date("2026-03-07")
        );
    }

    #[test]
    fn test_negative_offset_clamps() {
        assert_eq!(
            compute_deadline_date(date("2026-03-06"), -5, false),
            date("2026-03-06")
        );
    }

    #[test]
    fn test_days_until_and_classify() {
        let today = date("2026-03-10");
        assert_eq!(days_until(today, date("2026-03-13")), 3);
        assert_eq!(days_until(today, date("2026-03-10")), 0);
        assert_eq!(days_until(today, date("2026-03-08")), -2);

        assert_eq!(classify(3), Urgency::Approaching);
        assert_eq!(classify(0), Urgency::DueToday);
        assert_eq!(classify(-2), Urgency::Overdue);
        assert_eq!(Urgency::Overdue.as_str(), "overdue");
    }
}
