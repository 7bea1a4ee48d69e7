//! Remindr - scheduled email reminders
//!
//! Reminders are stored with a recurrence rule. A periodic sweep decides
//! which are due, hands each one to a notifier and records the send, so a
//! reminder fires at most once per period and failed sends are retried on
//! the next sweep.

pub mod dispatch;
pub mod domain;
pub mod error;
pub mod id;
pub mod import;
pub mod notify;
pub mod recurrence;
pub mod store;
pub mod trigger;

pub use error::{RemindrError, Result};
