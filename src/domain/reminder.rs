//! Reminder record and related types
//!
//! A Reminder is anchored at `scheduled_at` and recurs according to its
//! `frequency`. The dispatch engine only ever touches `last_sent_at`; every
//! other field is owned by the create/edit/delete boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{RemindrError, Result};
use crate::id::generate_reminder_id;

/// A stored reminder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    //=== Identity ===
    /// Unique identifier (timestamp + random suffix: "1738300800123-a1b2")
    pub id: String,

    //=== Schedule ===
    /// First occurrence; the recurrence anchor until the first send
    pub scheduled_at: DateTime<Utc>,

    /// How often the reminder recurs
    #[serde(default)]
    pub frequency: Frequency,

    /// Sends stop once evaluation time passes this instant
    pub end_date: Option<DateTime<Utc>>,

    //=== Content ===
    pub description: String,
    pub recipient_email: String,

    //=== Dispatch State ===
    /// Instant of the last confirmed send (None = never dispatched)
    pub last_sent_at: Option<DateTime<Utc>>,

    //=== Timestamps ===
    pub created_at: DateTime<Utc>,
}

/// Recurrence rule for a reminder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Once,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub const ALL: [Frequency; 5] = [
        Frequency::Once,
        Frequency::Daily,
        Frequency::Weekly,
        Frequency::Monthly,
        Frequency::Yearly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Once => "once",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
        }
    }

    /// Capitalized name used in notification bodies
    pub fn label(&self) -> &'static str {
        match self {
            Frequency::Once => "Once",
            Frequency::Daily => "Daily",
            Frequency::Weekly => "Weekly",
            Frequency::Monthly => "Monthly",
            Frequency::Yearly => "Yearly",
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = RemindrError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Frequency::ALL
            .into_iter()
            .find(|f| f.as_str() == wanted)
            .ok_or_else(|| RemindrError::InvalidReminder(format!("unknown frequency '{}'", s)))
    }
}

/// Boundary input for creating a reminder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReminder {
    pub scheduled_at: DateTime<Utc>,
    pub description: String,
    pub recipient_email: String,
    pub frequency: Frequency,
    pub end_date: Option<DateTime<Utc>>,
}

impl NewReminder {
    /// Create a one-off reminder
    pub fn new(scheduled_at: DateTime<Utc>, description: impl Into<String>, recipient_email: impl Into<String>) -> Self {
        Self {
            scheduled_at,
            description: description.into(),
            recipient_email: recipient_email.into(),
            frequency: Frequency::Once,
            end_date: None,
        }
    }

    /// Set the recurrence rule
    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }

    /// Set the end date
    pub fn with_end_date(mut self, end_date: DateTime<Utc>) -> Self {
        self.end_date = Some(end_date);
        self
    }

    /// Check the fields the boundary is responsible for.
    pub fn validate(&self) -> Result<()> {
        if self.description.trim().is_empty() {
            return Err(RemindrError::InvalidReminder("description is empty".to_string()));
        }
        if self.recipient_email.trim().is_empty() {
            return Err(RemindrError::InvalidReminder("recipient email is empty".to_string()));
        }
        if !self.recipient_email.contains('@') {
            return Err(RemindrError::InvalidReminder(format!(
                "recipient email '{}' has no '@'",
                self.recipient_email
            )));
        }
        if let Some(end) = self.end_date.filter(|end| *end < self.scheduled_at) {
            return Err(RemindrError::InvalidReminder(format!(
                "end date {} is before scheduled date {}",
                end.format("%Y-%m-%d"),
                self.scheduled_at.format("%Y-%m-%d")
            )));
        }
        Ok(())
    }
}

impl Reminder {
    /// Build a stored record from validated boundary input
    pub fn from_new(new: NewReminder, created_at: DateTime<Utc>) -> Result<Self> {
        new.validate()?;
        Ok(Self {
            id: generate_reminder_id(),
            scheduled_at: new.scheduled_at,
            frequency: new.frequency,
            end_date: new.end_date,
            description: new.description.trim().to_string(),
            recipient_email: new.recipient_email.trim().to_string(),
            last_sent_at: None,
            created_at,
        })
    }

    /// Why this record cannot be dispatched, if it cannot
    pub fn malformed_reason(&self) -> Option<String> {
        if self.id.is_empty() {
            return Some("reminder has no id".to_string());
        }
        if self.description.trim().is_empty() {
            return Some("description is empty".to_string());
        }
        if self.recipient_email.trim().is_empty() {
            return Some("recipient email is empty".to_string());
        }
        None
    }

    /// Returns true once the end date has passed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.end_date.is_some_and(|end| now > end)
    }
}
