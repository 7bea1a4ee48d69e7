//! Notification layer - the opaque `send(to, subject, body)` capability
//!
//! This module provides:
//! - Notifier trait for transport abstraction
//! - Message rendering for reminder, confirmation, import and test emails
//! - SendmailNotifier piping messages to a sendmail-compatible program
//! - LogNotifier for dry runs
//! - MockNotifier for tests

mod dry_run;
pub mod message;
mod mock;
mod sendmail;

use async_trait::async_trait;
use std::time::Duration;

pub use dry_run::LogNotifier;
pub use message::{Message, render_confirmation, render_import_summary, render_reminder, render_test};
pub use mock::{MockNotifier, SentMessage};
pub use sendmail::{SendmailConfig, SendmailNotifier};

/// Outbound notification transport
///
/// Implementations must bound their own latency; the dispatcher does not
/// impose a timeout on individual sends.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message. Failures are opaque to the caller.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;

    /// Send a rendered message
    async fn send_message(&self, to: &str, message: &Message) -> Result<(), NotifyError> {
        self.send(to, &message.subject, &message.body).await
    }
}

/// Errors that can occur while delivering a notification
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
