//! Domain types for Remindr
//!
//! This module contains all core domain types:
//! - Reminder: the stored record with its schedule and dispatch state
//! - Frequency: the closed set of recurrence rules
//! - Settings: singleton notification defaults
//! - SweepReport: outcome of one evaluation pass

pub mod reminder;
pub mod report;
pub mod settings;

pub use reminder::{Frequency, NewReminder, Reminder};
pub use report::{FailureKind, SweepFailure, SweepReport};
pub use settings::Settings;
