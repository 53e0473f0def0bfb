//! Calendar week scoping helpers.
//!
//! # Responsibility
//! - Map a `week_offset` to concrete calendar dates.
//! - Provide day labels for the seven `day_of_week` slots.
//!
//! # Invariants
//! - Weeks start on Sunday; `day_of_week` 0 is Sunday, 6 is Saturday.
//! - `week_offset` 0 is the week containing "today"; negative values are past
//!   weeks.

use chrono::{Datelike, Duration, Local, NaiveDate};

const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// Number of day slots in one planning week.
pub const DAYS_PER_WEEK: usize = 7;

/// Returns the Sunday that starts the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let days_from_sunday = i64::from(date.weekday().num_days_from_sunday());
    date - Duration::days(days_from_sunday)
}

/// Returns the seven dates of the week `week_offset` weeks away from the week
/// containing `today`.
pub fn week_dates(today: NaiveDate, week_offset: i32) -> [NaiveDate; DAYS_PER_WEEK] {
    let start = week_start(today) + Duration::weeks(i64::from(week_offset));
    std::array::from_fn(|index| start + Duration::days(index as i64))
}

/// Same as [`week_dates`] anchored at the local current date.
pub fn current_week_dates(week_offset: i32) -> [NaiveDate; DAYS_PER_WEEK] {
    week_dates(Local::now().date_naive(), week_offset)
}

/// Formats a week as `"Jan 12 - Jan 18"`. Empty input yields an empty label.
pub fn format_week_range(dates: &[NaiveDate]) -> String {
    match (dates.first(), dates.last()) {
        (Some(start), Some(end)) => format!(
            "{} - {}",
            start.format("%b %-d"),
            end.format("%b %-d")
        ),
        _ => String::new(),
    }
}

/// Returns the `day_of_week` slot (0 = Sunday) of a date.
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Returns the local current day slot.
pub fn today_day_of_week() -> u8 {
    day_of_week(Local::now().date_naive())
}

/// Returns whether `date` is the local current date.
pub fn is_today(date: NaiveDate) -> bool {
    date == Local::now().date_naive()
}

/// Full day label, or `""` outside `0..=6`.
pub fn day_name(day_of_week: u8) -> &'static str {
    DAY_NAMES
        .get(usize::from(day_of_week))
        .copied()
        .unwrap_or("")
}

/// Three-letter day label, or `""` outside `0..=6`.
pub fn short_day_name(day_of_week: u8) -> &'static str {
    let name = day_name(day_of_week);
    name.get(..3).unwrap_or(name)
}
