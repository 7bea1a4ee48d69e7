//! Dry-run transport that only logs.

use async_trait::async_trait;

use super::{Notifier, NotifyError};

/// Notifier that logs every message and reports success
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        log::info!("[dry-run] to={} subject={:?} body_bytes={}", to, subject, body.len());
        log::debug!("[dry-run] body:\n{}", body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        let notifier = LogNotifier::new();
        assert!(notifier.send("me@example.com", "Hi", "Body").await.is_ok());
    }
}
