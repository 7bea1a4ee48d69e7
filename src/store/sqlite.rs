//! SQLite-backed reminder store.
//!
//! Instants are stored as fixed-width RFC 3339 UTC text
//! (`2024-01-31T09:00:00.000000Z`) so that string comparison in SQL orders
//! them chronologically and the `end_date` filter can use its index.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{Candidate, MalformedRecord, ReminderStore, check_monotonic};
use crate::domain::{Frequency, Reminder, Settings};
use crate::error::{RemindrError, Result};

const REMINDER_COLUMNS: &str =
    "id, scheduled_at, description, recipient_email, frequency, last_sent_at, end_date, created_at";

/// Reminder store backed by a single SQLite database file.
pub struct SqliteStore {
    /// Path to the database file (None for in-memory databases)
    db_path: Option<PathBuf>,

    /// Connection; rusqlite::Connection is not Sync
    db: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create a store in the given directory.
    ///
    /// The database lives at `<dir>/reminders.db`.
    pub fn open_at(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Self::open_file(&dir.join("reminders.db"))
    }

    /// Open or create a store at an explicit database path.
    pub fn open_file(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;
        log::debug!("Opened reminder store at {}", db_path.display());

        Ok(Self {
            db_path: Some(db_path.to_path_buf()),
            db: Mutex::new(db),
        })
    }

    /// Open a throwaway in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self {
            db_path: None,
            db: Mutex::new(db),
        })
    }

    /// Initialize the SQLite schema.
    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            r#"
            PRAGMA busy_timeout = 5000;

            CREATE TABLE IF NOT EXISTS reminders (
                id TEXT PRIMARY KEY,
                scheduled_at TEXT NOT NULL,
                description TEXT NOT NULL,
                recipient_email TEXT NOT NULL,
                frequency TEXT NOT NULL DEFAULT 'once',
                last_sent_at TEXT,
                end_date TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_reminders_end_date ON reminders(end_date);
            CREATE INDEX IF NOT EXISTS idx_reminders_scheduled ON reminders(scheduled_at);

            CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                default_email TEXT NOT NULL,
                sender_name TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|e| RemindrError::Storage(e.to_string()))
    }

    fn query_rows(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Candidate>> {
        let db = self.lock()?;
        let mut stmt = db.prepare(sql)?;
        let rows = stmt.query_map(args, |row| Ok(RawRow::read(row)))?;

        let mut candidates = Vec::new();
        for row in rows {
            candidates.push(row?.decode());
        }
        Ok(candidates)
    }
}

impl ReminderStore for SqliteStore {
    fn insert(&self, reminder: &Reminder) -> Result<()> {
        let db = self.lock()?;
        db.execute(
            &format!("INSERT INTO reminders ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)", REMINDER_COLUMNS),
            params![
                reminder.id,
                encode_instant(reminder.scheduled_at),
                reminder.description,
                reminder.recipient_email,
                reminder.frequency.as_str(),
                reminder.last_sent_at.map(encode_instant),
                reminder.end_date.map(encode_instant),
                encode_instant(reminder.created_at),
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Reminder>> {
        let db = self.lock()?;
        let raw = db
            .query_row(
                &format!("SELECT {} FROM reminders WHERE id = ?1", REMINDER_COLUMNS),
                [id],
                |row| Ok(RawRow::read(row)),
            )
            .optional()?;

        match raw.map(RawRow::decode) {
            None => Ok(None),
            Some(Ok(reminder)) => Ok(Some(reminder)),
            Some(Err(malformed)) => Err(RemindrError::Storage(format!(
                "reminder {} is unreadable: {}",
                malformed.id, malformed.reason
            ))),
        }
    }

    fn list_all(&self) -> Result<Vec<Reminder>> {
        let sql = format!("SELECT {} FROM reminders ORDER BY scheduled_at", REMINDER_COLUMNS);
        let mut reminders = Vec::new();
        for candidate in self.query_rows(&sql, params![])? {
            match candidate {
                Ok(reminder) => reminders.push(reminder),
                Err(malformed) => log::warn!("Skipping unreadable reminder {}: {}", malformed.id, malformed.reason),
            }
        }
        Ok(reminders)
    }

    fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Candidate>> {
        let sql = format!(
            "SELECT {} FROM reminders WHERE end_date IS NULL OR end_date >= ?1 ORDER BY scheduled_at",
            REMINDER_COLUMNS
        );
        let now = encode_instant(now);
        self.query_rows(&sql, params![now])
    }

    fn save(&self, reminder: &Reminder) -> Result<()> {
        let mut db = self.lock()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored = stored_last_sent(&tx, &reminder.id)?;
        check_monotonic(&reminder.id, stored, reminder.last_sent_at)?;

        tx.execute(
            r#"
            UPDATE reminders
            SET scheduled_at = ?2, description = ?3, recipient_email = ?4, frequency = ?5,
                last_sent_at = ?6, end_date = ?7
            WHERE id = ?1
            "#,
            params![
                reminder.id,
                encode_instant(reminder.scheduled_at),
                reminder.description,
                reminder.recipient_email,
                reminder.frequency.as_str(),
                reminder.last_sent_at.map(encode_instant),
                reminder.end_date.map(encode_instant),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn record_sent(&self, id: &str, sent_at: DateTime<Utc>) -> Result<()> {
        let mut db = self.lock()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored = stored_last_sent(&tx, id)?;
        check_monotonic(id, stored, Some(sent_at))?;

        tx.execute(
            "UPDATE reminders SET last_sent_at = ?2 WHERE id = ?1",
            params![id, encode_instant(sent_at)],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let db = self.lock()?;
        let affected = db.execute("DELETE FROM reminders WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(RemindrError::ReminderNotFound(id.to_string()));
        }
        log::info!("Deleted reminder {}", id);
        Ok(())
    }

    fn settings(&self) -> Result<Option<Settings>> {
        let db = self.lock()?;
        let settings = db
            .query_row(
                "SELECT default_email, sender_name FROM settings WHERE id = 1",
                [],
                |row| {
                    Ok(Settings {
                        default_email: row.get(0)?,
                        sender_name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(settings)
    }

    fn save_settings(&self, settings: &Settings) -> Result<()> {
        let db = self.lock()?;
        db.execute(
            "INSERT OR REPLACE INTO settings (id, default_email, sender_name) VALUES (1, ?1, ?2)",
            params![settings.default_email, settings.sender_name],
        )?;
        Ok(())
    }
}

type Decoded<T> = std::result::Result<T, MalformedRecord>;

/// A column as read: `Err` if SQLite could not produce text for it
type RawField = std::result::Result<Option<String>, String>;

/// Column values as read, before any decoding
struct RawRow {
    id: RawField,
    scheduled_at: RawField,
    description: RawField,
    recipient_email: RawField,
    frequency: RawField,
    last_sent_at: RawField,
    end_date: RawField,
    created_at: RawField,
}

impl RawRow {
    fn read(row: &Row<'_>) -> Self {
        let text = |idx: usize| row.get::<_, Option<String>>(idx).map_err(|e| e.to_string());
        Self {
            id: text(0),
            scheduled_at: text(1),
            description: text(2),
            recipient_email: text(3),
            frequency: text(4),
            last_sent_at: text(5),
            end_date: text(6),
            created_at: text(7),
        }
    }

    fn decode(self) -> Candidate {
        let id = match self.id {
            Ok(Some(id)) => id,
            Ok(None) => return Err(malformed("<unknown>", "id is NULL")),
            Err(e) => return Err(malformed("<unknown>", format!("id: {}", e))),
        };

        let frequency = required(&id, "frequency", self.frequency)?;
        let frequency = frequency
            .parse::<Frequency>()
            .map_err(|e| malformed(&id, format!("frequency: {}", e)))?;

        Ok(Reminder {
            scheduled_at: required_instant(&id, "scheduled_at", self.scheduled_at)?,
            description: required(&id, "description", self.description)?,
            recipient_email: required(&id, "recipient_email", self.recipient_email)?,
            frequency,
            last_sent_at: optional_instant(&id, "last_sent_at", self.last_sent_at)?,
            end_date: optional_instant(&id, "end_date", self.end_date)?,
            created_at: required_instant(&id, "created_at", self.created_at)?,
            id,
        })
    }
}

fn required(id: &str, field: &str, value: RawField) -> Decoded<String> {
    value
        .map_err(|e| malformed(id, format!("{}: {}", field, e)))?
        .ok_or_else(|| malformed(id, format!("{}: NULL", field)))
}

fn required_instant(id: &str, field: &str, value: RawField) -> Decoded<DateTime<Utc>> {
    decode_instant(&required(id, field, value)?).map_err(|e| malformed(id, format!("{}: {}", field, e)))
}

fn optional_instant(id: &str, field: &str, value: RawField) -> Decoded<Option<DateTime<Utc>>> {
    value
        .map_err(|e| malformed(id, format!("{}: {}", field, e)))?
        .as_deref()
        .map(decode_instant)
        .transpose()
        .map_err(|e| malformed(id, format!("{}: {}", field, e)))
}

/// Current `last_sent_at` of a row; `ReminderNotFound` if there is no row.
fn stored_last_sent(db: &Connection, id: &str) -> Result<Option<DateTime<Utc>>> {
    let stored: Option<Option<String>> = db
        .query_row("SELECT last_sent_at FROM reminders WHERE id = ?1", [id], |row| row.get(0))
        .optional()?;

    match stored {
        None => Err(RemindrError::ReminderNotFound(id.to_string())),
        Some(text) => text
            .as_deref()
            .map(decode_instant)
            .transpose()
            .map_err(|reason| RemindrError::Storage(format!("reminder {}: {}", id, reason))),
    }
}

fn malformed(id: &str, reason: impl Into<String>) -> MalformedRecord {
    MalformedRecord {
        id: id.to_string(),
        reason: reason.into(),
    }
}

fn encode_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_instant(text: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{}': {}", text, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewReminder;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn create_test_store() -> (SqliteStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::open_at(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    fn new_reminder(description: &str) -> NewReminder {
        NewReminder::new(at(2024, 3, 20), description, "team@example.com")
    }

    #[test]
    fn test_create_and_get() {
        let (store, _temp) = create_test_store();
        let created = store.create(new_reminder("Team meeting")).unwrap();

        let retrieved = store.get(&created.id).unwrap();
        assert_eq!(retrieved, Some(created));
    }

    #[test]
    fn test_get_not_found() {
        let (store, _temp) = create_test_store();
        assert_eq!(store.get("nonexistent").unwrap(), None);
    }

    #[test]
    fn test_create_rejects_invalid_input() {
        let (store, _temp) = create_test_store();
        let err = store.create(new_reminder("   ")).unwrap_err();
        assert!(matches!(err, RemindrError::InvalidReminder(_)));
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_insert_duplicate_id_fails() {
        let (store, _temp) = create_test_store();
        let created = store.create(new_reminder("Team meeting")).unwrap();
        assert!(store.insert(&created).is_err());
    }

    #[test]
    fn test_list_all_ordered_by_schedule() {
        let (store, _temp) = create_test_store();
        store
            .create(NewReminder::new(at(2024, 5, 1), "later", "a@example.com"))
            .unwrap();
        store
            .create(NewReminder::new(at(2024, 1, 1), "earlier", "a@example.com"))
            .unwrap();

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].description, "earlier");
        assert_eq!(all[1].description, "later");
    }

    #[test]
    fn test_list_active_excludes_past_end_date() {
        let (store, _temp) = create_test_store();
        let open = store
            .create(new_reminder("no end").with_frequency(Frequency::Daily))
            .unwrap();
        let ended = store
            .create(
                NewReminder::new(at(2023, 6, 1), "ended", "a@example.com")
                    .with_frequency(Frequency::Daily)
                    .with_end_date(at(2024, 1, 1)),
            )
            .unwrap();
        let running = store
            .create(
                NewReminder::new(at(2024, 1, 1), "running", "a@example.com")
                    .with_frequency(Frequency::Weekly)
                    .with_end_date(at(2024, 12, 31)),
            )
            .unwrap();

        let active: Vec<String> = store
            .list_active(at(2024, 6, 1))
            .unwrap()
            .into_iter()
            .map(|c| c.unwrap().id)
            .collect();

        assert!(active.contains(&open.id));
        assert!(active.contains(&running.id));
        assert!(!active.contains(&ended.id));
    }

    #[test]
    fn test_list_active_includes_end_date_equal_to_now() {
        let (store, _temp) = create_test_store();
        store
            .create(
                NewReminder::new(at(2023, 12, 1), "last day", "a@example.com")
                    .with_frequency(Frequency::Daily)
                    .with_end_date(at(2024, 1, 1)),
            )
            .unwrap();

        assert_eq!(store.list_active(at(2024, 1, 1)).unwrap().len(), 1);
        assert_eq!(store.list_active(at(2024, 1, 2)).unwrap().len(), 0);
    }

    #[test]
    fn test_list_active_reports_malformed_rows() {
        let (store, _temp) = create_test_store();
        store.create(new_reminder("fine")).unwrap();
        {
            let db = store.lock().unwrap();
            db.execute(
                &format!("INSERT INTO reminders ({}) VALUES ('bad-1', 'not a date', 'broken', 'x@example.com', 'once', NULL, NULL, '2024-01-01T00:00:00.000000Z')", REMINDER_COLUMNS),
                [],
            )
            .unwrap();
            db.execute(
                &format!("INSERT INTO reminders ({}) VALUES ('bad-2', '2024-01-01T00:00:00.000000Z', 'odd', 'x@example.com', 'fortnightly', NULL, NULL, '2024-01-01T00:00:00.000000Z')", REMINDER_COLUMNS),
                [],
            )
            .unwrap();
        }

        let candidates = store.list_active(at(2024, 6, 1)).unwrap();
        assert_eq!(candidates.len(), 3);

        let malformed: Vec<MalformedRecord> = candidates.into_iter().filter_map(|c| c.err()).collect();
        assert_eq!(malformed.len(), 2);
        assert!(malformed.iter().any(|m| m.id == "bad-1" && m.reason.contains("scheduled_at")));
        assert!(malformed.iter().any(|m| m.id == "bad-2" && m.reason.contains("frequency")));

        // list_all skips them rather than failing
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_save_updates_last_sent() {
        let (store, _temp) = create_test_store();
        let mut reminder = store.create(new_reminder("Team meeting")).unwrap();

        reminder.last_sent_at = Some(at(2024, 3, 20));
        store.save(&reminder).unwrap();

        let retrieved = store.get(&reminder.id).unwrap().unwrap();
        assert_eq!(retrieved.last_sent_at, Some(at(2024, 3, 20)));
    }

    #[test]
    fn test_save_rejects_backwards_last_sent() {
        let (store, _temp) = create_test_store();
        let mut reminder = store.create(new_reminder("Team meeting")).unwrap();

        reminder.last_sent_at = Some(at(2024, 4, 1));
        store.save(&reminder).unwrap();

        let mut stale = reminder.clone();
        stale.last_sent_at = Some(at(2024, 3, 20));
        let err = store.save(&stale).unwrap_err();
        assert!(matches!(err, RemindrError::StaleWrite { .. }));

        let retrieved = store.get(&reminder.id).unwrap().unwrap();
        assert_eq!(retrieved.last_sent_at, Some(at(2024, 4, 1)));
    }

    #[test]
    fn test_record_sent_only_touches_last_sent() {
        let (store, _temp) = create_test_store();
        let snapshot = store.create(new_reminder("Team meeting")).unwrap();

        // Edited after the sweep took its snapshot
        let mut edited = snapshot.clone();
        edited.description = "Team meeting (moved to room B)".to_string();
        edited.end_date = Some(at(2024, 12, 31));
        store.save(&edited).unwrap();

        store.record_sent(&snapshot.id, at(2024, 3, 20)).unwrap();

        let retrieved = store.get(&snapshot.id).unwrap().unwrap();
        assert_eq!(retrieved.last_sent_at, Some(at(2024, 3, 20)));
        assert_eq!(retrieved.description, "Team meeting (moved to room B)");
        assert_eq!(retrieved.end_date, Some(at(2024, 12, 31)));
    }

    #[test]
    fn test_record_sent_rejects_backwards_and_unknown() {
        let (store, _temp) = create_test_store();
        let reminder = store.create(new_reminder("Team meeting")).unwrap();

        store.record_sent(&reminder.id, at(2024, 4, 1)).unwrap();
        assert!(matches!(
            store.record_sent(&reminder.id, at(2024, 3, 1)),
            Err(RemindrError::StaleWrite { .. })
        ));
        assert!(matches!(
            store.record_sent("ghost", at(2024, 4, 1)),
            Err(RemindrError::ReminderNotFound(_))
        ));
    }

    #[test]
    fn test_save_unknown_reminder() {
        let (store, _temp) = create_test_store();
        let reminder = Reminder::from_new(new_reminder("ghost"), at(2024, 1, 1)).unwrap();
        let err = store.save(&reminder).unwrap_err();
        assert!(matches!(err, RemindrError::ReminderNotFound(_)));
    }

    #[test]
    fn test_delete() {
        let (store, _temp) = create_test_store();
        let reminder = store.create(new_reminder("Team meeting")).unwrap();

        store.delete(&reminder.id).unwrap();
        assert_eq!(store.get(&reminder.id).unwrap(), None);
        assert!(matches!(
            store.delete(&reminder.id),
            Err(RemindrError::ReminderNotFound(_))
        ));
    }

    #[test]
    fn test_settings_roundtrip_and_seed() {
        let (store, _temp) = create_test_store();
        assert_eq!(store.settings().unwrap(), None);

        let defaults = Settings::new("me@example.com", "Reminder Bot");
        assert_eq!(store.ensure_settings(&defaults).unwrap(), defaults);

        let updated = Settings::new("team@example.com", "Team Bot");
        store.save_settings(&updated).unwrap();
        // Seeding again must not overwrite what the user set
        assert_eq!(store.ensure_settings(&defaults).unwrap(), updated);
    }

    #[test]
    fn test_persistence_across_instances() {
        let temp_dir = TempDir::new().unwrap();

        let id = {
            let store = SqliteStore::open_at(temp_dir.path()).unwrap();
            store.create(new_reminder("persisted")).unwrap().id
        };

        let store = SqliteStore::open_at(temp_dir.path()).unwrap();
        let retrieved = store.get(&id).unwrap().unwrap();
        assert_eq!(retrieved.description, "persisted");
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create(new_reminder("ephemeral")).unwrap();
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_instant_encoding_sorts_chronologically() {
        let a = encode_instant(at(2024, 1, 9));
        let b = encode_instant(at(2024, 1, 10));
        let c = encode_instant(Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 1).unwrap());
        assert!(a < b);
        assert!(b < c);
        assert_eq!(decode_instant(&b).unwrap(), at(2024, 1, 10));
    }
}
