//! ID and timestamp utilities for Remindr
//!
//! Provides reminder id generation and parsing of user-supplied instants.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rand::Rng;

use crate::error::{RemindrError, Result};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Generate a unique reminder ID
///
/// Format: `{timestamp_ms}-{random_hex}`
/// Example: `1738300800123-a1b2`
pub fn generate_reminder_id() -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("{}-{:04x}", timestamp, random)
}

/// Parse a user-supplied instant as UTC.
///
/// Accepts RFC 3339 (`2024-03-20T10:00:00Z`), a naive date-time
/// (`2024-03-20T10:00:00` or `2024-03-20 10:00`) or a bare date
/// (`2024-03-20`, midnight UTC).
pub fn parse_instant(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, fmt) {
            return Ok(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| RemindrError::Time(format!("unrecognized date '{}'", input)))
}
