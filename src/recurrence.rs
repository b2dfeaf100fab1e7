//! Next-occurrence date math for recurring tasks.
//!
//! All functions are pure: callers pass `today` so sweeps and tests control
//! the clock. Dates are calendar dates with no timezone component.

use chrono::{Datelike, Duration, Months, NaiveDate};

use crate::domain::{RecurrencePattern, Task};

/// How far the weekly pattern scans for the next configured weekday before
/// jumping whole weeks.
const WEEKLY_SCAN_DAYS: i64 = 14;

/// Compute the due date of the next occurrence, or None when the task does
/// not recur or its recurrence has ended.
///
/// The base date is the current due date, except that a due date already in
/// the past is replaced by `today` so missed occurrences do not pile up.
pub fn compute_next_recurrence_date(task: &Task, today: NaiveDate) -> Option<NaiveDate> {
    if !task.is_recurring {
        return None;
    }
    let rec = task.recurrence.as_ref()?;

    let base = match task.due_date {
        Some(due) if due >= today => due,
        _ => today,
    };
    let interval = rec.interval.max(1);

    let next = match rec.pattern {
        RecurrencePattern::Daily => base + Duration::days(i64::from(interval)),
        RecurrencePattern::Weekly => next_weekly(base, interval, &rec.days_of_week),
        RecurrencePattern::Monthly => {
            let shifted = base.checked_add_months(Months::new(interval)).unwrap_or(base);
            match rec.day_of_month {
                Some(day) if day >= 1 => {
                    clamped_day_of_month(shifted.year(), shifted.month(), day)
                }
                _ => shifted,
            }
        }
        RecurrencePattern::Yearly => base
            .checked_add_months(Months::new(interval.saturating_mul(12)))
            .unwrap_or(base),
    };

    match rec.end_date {
        Some(end) if next > end => None,
        _ => Some(next),
    }
}

/// Weekly: scan strictly after the base for the next configured weekday,
/// bounded at two weeks; past the bound, jump `interval` weeks and align to
/// the first configured weekday. An empty weekday set degrades to plain
/// interval-week stepping.
fn next_weekly(base: NaiveDate, interval: u32, days_of_week: &[u32]) -> NaiveDate {
    let week_jump = Duration::weeks(i64::from(interval));
    if days_of_week.is_empty() {
        return base + week_jump;
    }

    for offset in 1..=WEEKLY_SCAN_DAYS {
        let candidate = base + Duration::days(offset);
        if matches_weekday(candidate, days_of_week) {
            return candidate;
        }
    }

    let jumped = base + week_jump;
    for offset in 0..7 {
        let candidate = jumped + Duration::days(offset);
        if matches_weekday(candidate, days_of_week) {
            return candidate;
        }
    }
    // Only reachable when every configured value is outside 0-6.
    jumped
}

/// Weekday convention: 0 = Sunday through 6 = Saturday.
fn matches_weekday(date: NaiveDate, days_of_week: &[u32]) -> bool {
    let idx = date.weekday().num_days_from_sunday();
    days_of_week.contains(&idx)
}

/// Pin a day-of-month, clamping to the last day of short months
/// (31st in February yields Feb 28/29).
fn clamped_day_of_month(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap_or_else(|| last_day_of_month(year, month))
}

fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, month, 28).unwrap_or_default())
}
