//! Reminder Store - persistence contract for reminders and settings.
//!
//! This module provides:
//! - **ReminderStore**: the read/write contract the dispatch engine relies on
//! - **SqliteStore**: SQLite-backed store (one row per reminder)
//! - **MemoryStore**: in-process store for tests and embedding
//!
//! Every `save` is a single atomic read-modify-write per record and refuses
//! to move `last_sent_at` backwards.
//!
//! # Example
//!
//! ```ignore
//! use remindr::store::{ReminderStore, SqliteStore};
//!
//! let store = SqliteStore::open_at(Path::new("/tmp/remindr"))?;
//! let reminder = store.create(NewReminder::new(when, "Pay rent", "me@example.com"))?;
//! let candidates = store.list_active(Utc::now())?;
//! ```

mod memory;
mod sqlite;

use chrono::{DateTime, Utc};

use crate::domain::{NewReminder, Reminder, Settings};
use crate::error::{RemindrError, Result};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// A stored row that could not be decoded into a [`Reminder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRecord {
    pub id: String,
    pub reason: String,
}

/// One entry of an active listing
pub type Candidate = std::result::Result<Reminder, MalformedRecord>;

/// Storage contract for reminders.
pub trait ReminderStore: Send + Sync {
    /// Insert a fully formed record. Fails if the id already exists.
    fn insert(&self, reminder: &Reminder) -> Result<()>;

    /// Get a reminder by ID.
    fn get(&self, id: &str) -> Result<Option<Reminder>>;

    /// All reminders, ordered by `scheduled_at`.
    fn list_all(&self) -> Result<Vec<Reminder>>;

    /// Reminders whose end date is absent or not yet passed at `now`.
    ///
    /// Rows that cannot be decoded are returned as [`MalformedRecord`]
    /// instead of failing the whole listing.
    fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Candidate>>;

    /// Atomically replace an existing reminder.
    ///
    /// Returns `StaleWrite` if the stored `last_sent_at` is later than the
    /// incoming one, `ReminderNotFound` if the id is unknown.
    fn save(&self, reminder: &Reminder) -> Result<()>;

    /// Record a confirmed send: set `last_sent_at` and nothing else.
    ///
    /// Same `StaleWrite` / `ReminderNotFound` rules as [`save`](Self::save).
    fn record_sent(&self, id: &str, sent_at: DateTime<Utc>) -> Result<()>;

    /// Delete a reminder by ID.
    fn delete(&self, id: &str) -> Result<()>;

    /// The singleton settings row, if written.
    fn settings(&self) -> Result<Option<Settings>>;

    /// Write the singleton settings row.
    fn save_settings(&self, settings: &Settings) -> Result<()>;

    /// Validate boundary input, assign identity and insert.
    fn create(&self, new: NewReminder) -> Result<Reminder> {
        let reminder = Reminder::from_new(new, Utc::now())?;
        self.insert(&reminder)?;
        log::info!("Created reminder {} ({})", reminder.id, reminder.frequency);
        Ok(reminder)
    }

    /// Get settings, seeding them with `defaults` on first use.
    fn ensure_settings(&self, defaults: &Settings) -> Result<Settings> {
        match self.settings()? {
            Some(settings) => Ok(settings),
            None => {
                self.save_settings(defaults)?;
                log::info!("Seeded default settings");
                Ok(defaults.clone())
            }
        }
    }
}

/// Reject a write that would move `last_sent_at` backwards.
pub(crate) fn check_monotonic(
    id: &str,
    stored: Option<DateTime<Utc>>,
    incoming: Option<DateTime<Utc>>,
) -> Result<()> {
    match (stored, incoming) {
        (Some(_), None) => Err(RemindrError::StaleWrite { id: id.to_string() }),
        (Some(stored), Some(new)) if new < stored => Err(RemindrError::StaleWrite { id: id.to_string() }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_check_monotonic() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        assert!(check_monotonic("r-1", None, None).is_ok());
        assert!(check_monotonic("r-1", None, Some(early)).is_ok());
        assert!(check_monotonic("r-1", Some(early), Some(early)).is_ok());
        assert!(check_monotonic("r-1", Some(early), Some(late)).is_ok());
        assert!(matches!(
            check_monotonic("r-1", Some(late), Some(early)),
            Err(RemindrError::StaleWrite { .. })
        ));
        assert!(matches!(
            check_monotonic("r-1", Some(late), None),
            Err(RemindrError::StaleWrite { .. })
        ));
    }
}
