//! In-process reminder store.
//!
//! Holds everything in a `RwLock`ed map. Besides serving tests and embedders,
//! it can simulate the failure modes a real backend has: undecodable rows,
//! an unreachable database and rejected writes.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{Candidate, MalformedRecord, ReminderStore, check_monotonic};
use crate::domain::{Reminder, Settings};
use crate::error::{RemindrError, Result};

#[derive(Debug, Clone)]
enum Entry {
    Valid(Reminder),
    Malformed(String),
}

/// Reminder store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, Entry>>,
    settings: RwLock<Option<Settings>>,
    unavailable: AtomicBool,
    reject_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plant a record that cannot be decoded.
    pub fn insert_malformed(&self, id: impl Into<String>, reason: impl Into<String>) -> Result<()> {
        let mut records = self.records.write().map_err(|e| RemindrError::Storage(e.to_string()))?;
        records.insert(id.into(), Entry::Malformed(reason.into()));
        Ok(())
    }

    /// Make every read fail as if the backend were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every `save` and `record_sent` fail.
    pub fn fail_saves(&self, fail: bool) {
        self.reject_saves.store(fail, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RemindrError::Storage("store unavailable".to_string()));
        }
        Ok(())
    }

    fn sorted(&self, keep: impl Fn(&Reminder) -> bool) -> Result<Vec<Candidate>> {
        self.check_available()?;
        let records = self.records.read().map_err(|e| RemindrError::Storage(e.to_string()))?;

        let mut candidates: Vec<Candidate> = records
            .iter()
            .filter_map(|(id, entry)| match entry {
                Entry::Valid(reminder) if keep(reminder) => Some(Ok(reminder.clone())),
                Entry::Valid(_) => None,
                Entry::Malformed(reason) => Some(Err(MalformedRecord {
                    id: id.clone(),
                    reason: reason.clone(),
                })),
            })
            .collect();

        candidates.sort_by_key(|c| c.as_ref().ok().map(|r| r.scheduled_at));
        Ok(candidates)
    }
}

impl ReminderStore for MemoryStore {
    fn insert(&self, reminder: &Reminder) -> Result<()> {
        self.check_available()?;
        let mut records = self.records.write().map_err(|e| RemindrError::Storage(e.to_string()))?;
        if records.contains_key(&reminder.id) {
            return Err(RemindrError::Storage(format!("reminder {} already exists", reminder.id)));
        }
        records.insert(reminder.id.clone(), Entry::Valid(reminder.clone()));
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Reminder>> {
        self.check_available()?;
        let records = self.records.read().map_err(|e| RemindrError::Storage(e.to_string()))?;
        match records.get(id) {
            None => Ok(None),
            Some(Entry::Valid(reminder)) => Ok(Some(reminder.clone())),
            Some(Entry::Malformed(reason)) => Err(RemindrError::Storage(format!(
                "reminder {} is unreadable: {}",
                id, reason
            ))),
        }
    }

    fn list_all(&self) -> Result<Vec<Reminder>> {
        Ok(self.sorted(|_| true)?.into_iter().filter_map(|c| c.ok()).collect())
    }

    fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Candidate>> {
        self.sorted(|reminder| reminder.end_date.is_none_or(|end| end >= now))
    }

    fn save(&self, reminder: &Reminder) -> Result<()> {
        self.check_available()?;
        if self.reject_saves.load(Ordering::SeqCst) {
            return Err(RemindrError::Storage(format!("write rejected for {}", reminder.id)));
        }

        // Single write lock makes the compare and the replace one step
        let mut records = self.records.write().map_err(|e| RemindrError::Storage(e.to_string()))?;
        let stored = match records.get(&reminder.id) {
            None => return Err(RemindrError::ReminderNotFound(reminder.id.clone())),
            Some(Entry::Valid(stored)) => stored.last_sent_at,
            Some(Entry::Malformed(_)) => None,
        };
        check_monotonic(&reminder.id, stored, reminder.last_sent_at)?;

        records.insert(reminder.id.clone(), Entry::Valid(reminder.clone()));
        Ok(())
    }

    fn record_sent(&self, id: &str, sent_at: DateTime<Utc>) -> Result<()> {
        self.check_available()?;
        if self.reject_saves.load(Ordering::SeqCst) {
            return Err(RemindrError::Storage(format!("write rejected for {}", id)));
        }

        let mut records = self.records.write().map_err(|e| RemindrError::Storage(e.to_string()))?;
        match records.get_mut(id) {
            None => Err(RemindrError::ReminderNotFound(id.to_string())),
            Some(Entry::Malformed(reason)) => Err(RemindrError::Storage(format!(
                "reminder {} is unreadable: {}",
                id, reason
            ))),
            Some(Entry::Valid(stored)) => {
                check_monotonic(id, stored.last_sent_at, Some(sent_at))?;
                stored.last_sent_at = Some(sent_at);
                Ok(())
            }
        }
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.check_available()?;
        let mut records = self.records.write().map_err(|e| RemindrError::Storage(e.to_string()))?;
        records
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RemindrError::ReminderNotFound(id.to_string()))
    }

    fn settings(&self) -> Result<Option<Settings>> {
        self.check_available()?;
        let settings = self.settings.read().map_err(|e| RemindrError::Storage(e.to_string()))?;
        Ok(settings.clone())
    }

    fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.check_available()?;
        let mut current = self.settings.write().map_err(|e| RemindrError::Storage(e.to_string()))?;
        *current = Some(settings.clone());
        Ok(())
    }
}
