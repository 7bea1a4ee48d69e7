//! Calendar arithmetic for recurrence advancement.

use chrono::{DateTime, Months, Utc};

/// Advance `instant` by `months` calendar months.
///
/// The day of month is clamped to the length of the target month, so
/// Jan-31 + 1 month is Feb-29 in a leap year and Feb-28 otherwise. Returns
/// None only when the result leaves chrono's representable range.
pub fn add_months_clamped(instant: DateTime<Utc>, months: u32) -> Option<DateTime<Utc>> {
    instant.checked_add_months(Months::new(months))
}

/// Advance `instant` by whole years; Feb-29 falls back to Feb-28.
pub fn add_years_clamped(instant: DateTime<Utc>, years: u32) -> Option<DateTime<Utc>> {
    years.checked_mul(12).and_then(|months| add_months_clamped(instant, months))
}

/// Whole days elapsed from `from` to `to`, truncating partial days.
pub fn whole_days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_days()
}
