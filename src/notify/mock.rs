//! Scriptable in-memory notifier for tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{Notifier, NotifyError};

/// A message the mock accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Records successful sends; can be told to fail
#[derive(Debug, Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<SentMessage>>,
    attempts: AtomicUsize,
    fail_next: AtomicUsize,
    failing_recipients: Mutex<HashSet<String>>,
    delay: Option<Duration>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` sends, then succeed
    pub fn failing_first(count: usize) -> Self {
        let notifier = Self::new();
        notifier.fail_next.store(count, Ordering::SeqCst);
        notifier
    }

    /// Sleep before answering each send
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Always fail sends addressed to `recipient`
    pub fn fail_recipient(&self, recipient: impl Into<String>) {
        if let Ok(mut failing) = self.failing_recipients.lock() {
            failing.insert(recipient.into());
        }
    }

    /// Messages accepted so far
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Messages accepted for one recipient
    pub fn sent_to(&self, recipient: &str) -> Vec<SentMessage> {
        self.sent().into_iter().filter(|m| m.to == recipient).collect()
    }

    /// Number of send calls, successful or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted_failure = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure {
            return Err(NotifyError::Transport("scripted failure".to_string()));
        }

        let rejected = self
            .failing_recipients
            .lock()
            .map(|failing| failing.contains(to))
            .unwrap_or(false);
        if rejected {
            return Err(NotifyError::Rejected(format!("recipient {} refused", to)));
        }

        let mut sent = self
            .sent
            .lock()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        sent.push(SentMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_sends() {
        let notifier = MockNotifier::new();
        notifier.send("a@example.com", "One", "1").await.unwrap();
        notifier.send("b@example.com", "Two", "2").await.unwrap();

        assert_eq!(notifier.sent().len(), 2);
        assert_eq!(notifier.sent_to("b@example.com")[0].subject, "Two");
        assert_eq!(notifier.attempts(), 2);
    }

    #[tokio::test]
    async fn test_failing_first() {
        let notifier = MockNotifier::failing_first(2);

        assert!(notifier.send("a@example.com", "s", "b").await.is_err());
        assert!(notifier.send("a@example.com", "s", "b").await.is_err());
        assert!(notifier.send("a@example.com", "s", "b").await.is_ok());

        assert_eq!(notifier.attempts(), 3);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_fail_recipient() {
        let notifier = MockNotifier::new();
        notifier.fail_recipient("bounce@example.com");

        let err = notifier.send("bounce@example.com", "s", "b").await.unwrap_err();
        assert!(matches!(err, NotifyError::Rejected(_)));
        assert!(notifier.send("ok@example.com", "s", "b").await.is_ok());
    }
}
