//! Singleton notification settings.

use serde::{Deserialize, Serialize};

/// Defaults used when building notifications
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Recipient used when a reminder or test email names none
    pub default_email: String,
    /// Display name signed at the bottom of every notification
    pub sender_name: String,
}

impl Settings {
    pub fn new(default_email: impl Into<String>, sender_name: impl Into<String>) -> Self {
        Self {
            default_email: default_email.into(),
            sender_name: sender_name.into(),
        }
    }
}
