//! Error types for Remindr
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in Remindr
#[derive(Debug, Error)]
pub enum RemindrError {
    /// Reminder not found in storage
    #[error("Reminder not found: {0}")]
    ReminderNotFound(String),

    /// Reminder failed boundary validation (empty description, bad date, ...)
    #[error("Invalid reminder: {0}")]
    InvalidReminder(String),

    /// A save would move `last_sent_at` backwards
    #[error("Stale write for reminder {id}: last_sent_at would move backwards")]
    StaleWrite { id: String },

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Unparseable date or time input
    #[error("Time error: {0}")]
    Time(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// CSV import error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Remindr operations
pub type Result<T> = std::result::Result<T, RemindrError>;
