//! Recurrence Evaluator - decides whether a reminder is due at an instant
//!
//! Everything here is pure: evaluating a reminder never changes it, and
//! `advance` returns a new record rather than mutating in place.
//!
//! Decision order (first match wins):
//! 1. End date passed -> not due
//! 2. Record unusable (empty description / recipient) -> invalid
//! 3. Never sent -> due once `scheduled_at` is reached
//! 4. Once -> not due (already fired)
//! 5. Daily / Weekly -> due after 1 / 7 whole days since the last send
//! 6. Monthly / Yearly -> due once the calendar-advanced anchor is reached
//!
//! At most one occurrence is reported per evaluation, however many periods
//! have elapsed since the last send.

mod calendar;

use chrono::{DateTime, Duration, Utc};

pub use calendar::{add_months_clamped, add_years_clamped, whole_days_between};

use crate::domain::{Frequency, Reminder};

/// A single due instance of a reminder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    /// The instant this occurrence became due
    pub due_at: DateTime<Utc>,
}

/// Outcome of evaluating one reminder at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Due(Occurrence),
    NotDue,
    Invalid(String),
}

impl Evaluation {
    pub fn is_due(&self) -> bool {
        matches!(self, Evaluation::Due(_))
    }
}

/// Evaluate `reminder` at `now`.
pub fn evaluate(reminder: &Reminder, now: DateTime<Utc>) -> Evaluation {
    if reminder.is_expired(now) {
        return Evaluation::NotDue;
    }

    if let Some(reason) = reminder.malformed_reason() {
        return Evaluation::Invalid(reason);
    }

    let Some(last_sent) = reminder.last_sent_at else {
        return if reminder.scheduled_at <= now {
            Evaluation::Due(Occurrence {
                due_at: reminder.scheduled_at,
            })
        } else {
            Evaluation::NotDue
        };
    };

    match reminder.frequency {
        Frequency::Once => Evaluation::NotDue,
        Frequency::Daily => by_whole_days(last_sent, now, 1),
        Frequency::Weekly => by_whole_days(last_sent, now, 7),
        Frequency::Monthly => by_calendar(add_months_clamped(last_sent, 1), now, "monthly"),
        Frequency::Yearly => by_calendar(add_years_clamped(last_sent, 1), now, "yearly"),
    }
}

/// Predicate form of [`evaluate`]; an invalid record is never due.
pub fn is_due(reminder: &Reminder, now: DateTime<Utc>) -> bool {
    evaluate(reminder, now).is_due()
}

/// State of `reminder` after a confirmed send at `now`.
///
/// Only `last_sent_at` changes, and it never moves backwards.
pub fn advance(reminder: &Reminder, now: DateTime<Utc>) -> Reminder {
    let sent_at = match reminder.last_sent_at {
        Some(previous) if previous > now => previous,
        _ => now,
    };
    Reminder {
        last_sent_at: Some(sent_at),
        ..reminder.clone()
    }
}

/// Instant of the next occurrence, if there is one.
///
/// None for a Once reminder that already fired, for a reminder whose next
/// occurrence falls after its end date, and on calendar overflow.
pub fn next_due(reminder: &Reminder) -> Option<DateTime<Utc>> {
    let next = match reminder.last_sent_at {
        None => Some(reminder.scheduled_at),
        Some(last_sent) => match reminder.frequency {
            Frequency::Once => None,
            Frequency::Daily => last_sent.checked_add_signed(Duration::days(1)),
            Frequency::Weekly => last_sent.checked_add_signed(Duration::days(7)),
            Frequency::Monthly => add_months_clamped(last_sent, 1),
            Frequency::Yearly => add_years_clamped(last_sent, 1),
        },
    }?;

    match reminder.end_date {
        Some(end) if next > end => None,
        _ => Some(next),
    }
}

fn by_whole_days(last_sent: DateTime<Utc>, now: DateTime<Utc>, period_days: i64) -> Evaluation {
    if whole_days_between(last_sent, now) >= period_days {
        Evaluation::Due(Occurrence {
            due_at: last_sent + Duration::days(period_days),
        })
    } else {
        Evaluation::NotDue
    }
}

fn by_calendar(next: Option<DateTime<Utc>>, now: DateTime<Utc>, rule: &str) -> Evaluation {
    match next {
        Some(next) if now >= next => Evaluation::Due(Occurrence { due_at: next }),
        Some(_) => Evaluation::NotDue,
        None => Evaluation::Invalid(format!("{} advancement overflows the calendar", rule)),
    }
}
