//! Dispatch Coordinator - one sweep over the active reminders.
//!
//! A sweep:
//! 1. Lists active candidates from the store
//! 2. Evaluates each against the sweep instant
//! 3. Sends a notification for every due reminder (bounded parallelism)
//! 4. Records `last_sent_at` only after the notifier confirms
//!
//! Store calls are synchronous (SQLite), so they run on the blocking pool
//! rather than on the async workers that drive the sends.
//!
//! Nothing that goes wrong with a single reminder escapes the sweep; it is
//! recorded in the [`SweepReport`] instead. A failed send leaves the record
//! untouched so the next sweep retries it. A send that succeeds but cannot be
//! persisted will be sent again (at-least-once).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;

use crate::domain::{FailureKind, Reminder, Settings, SweepReport};
use crate::error::{RemindrError, Result};
use crate::notify::{Notifier, render_reminder};
use crate::recurrence::{self, Evaluation};
use crate::store::{Candidate, ReminderStore};

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Upper bound on sends in flight within one sweep.
    pub max_concurrent_sends: usize,
    /// Signature used when no settings row exists.
    pub sender_name: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sends: 4,
            sender_name: "Reminder Service".to_string(),
        }
    }
}

impl DispatchConfig {
    pub fn with_max_concurrent_sends(mut self, max: usize) -> Self {
        self.max_concurrent_sends = max;
        self
    }

    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = name.into();
        self
    }
}

/// What happened to one candidate
#[derive(Debug)]
enum Outcome {
    Skipped,
    Sent,
    Failed {
        reminder_id: String,
        kind: FailureKind,
        reason: String,
    },
}

impl Outcome {
    fn failed(reminder_id: &str, kind: FailureKind, reason: impl Into<String>) -> Self {
        Outcome::Failed {
            reminder_id: reminder_id.to_string(),
            kind,
            reason: reason.into(),
        }
    }
}

/// Runs sweeps against a store and a notifier.
pub struct Dispatcher {
    store: Arc<dyn ReminderStore>,
    notifier: Arc<dyn Notifier>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn ReminderStore>, notifier: Arc<dyn Notifier>, config: DispatchConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Run one sweep at `now`.
    ///
    /// Never fails: an unreachable store yields an aborted report.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let candidates = match self.on_store(move |store| store.list_active(now)).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!(error = %e, "Sweep aborted: could not list reminders");
                return SweepReport::aborted(now, e.to_string());
            }
        };

        let sender_name = self.sender_name().await;
        let mut report = SweepReport::new(now);
        report.candidates = candidates.len();

        let outcomes: Vec<Outcome> = futures::stream::iter(candidates)
            .map(|candidate| self.process(candidate, now, &sender_name))
            .buffer_unordered(self.config.max_concurrent_sends.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Outcome::Skipped => {}
                Outcome::Sent => report.record_sent(),
                Outcome::Failed {
                    reminder_id,
                    kind,
                    reason,
                } => report.record_failure(reminder_id, kind, reason),
            }
        }

        report
    }

    /// Sender name from stored settings, falling back to config.
    async fn sender_name(&self) -> String {
        match self.on_store(|store| store.settings()).await {
            Ok(Some(Settings { sender_name, .. })) => sender_name,
            Ok(None) => self.config.sender_name.clone(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read settings, using configured sender name");
                self.config.sender_name.clone()
            }
        }
    }

    /// Run a synchronous store call on the blocking pool.
    async fn on_store<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ReminderStore) -> Result<T> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| RemindrError::Storage(format!("store task failed: {}", e)))?
    }

    async fn process(&self, candidate: Candidate, now: DateTime<Utc>, sender_name: &str) -> Outcome {
        let reminder = match candidate {
            Ok(reminder) => reminder,
            Err(malformed) => {
                tracing::warn!(reminder_id = %malformed.id, reason = %malformed.reason, "Skipping malformed reminder");
                return Outcome::failed(&malformed.id, FailureKind::Malformed, malformed.reason);
            }
        };

        match recurrence::evaluate(&reminder, now) {
            Evaluation::NotDue => Outcome::Skipped,
            Evaluation::Invalid(reason) => {
                tracing::warn!(reminder_id = %reminder.id, reason = %reason, "Reminder cannot be evaluated");
                Outcome::failed(&reminder.id, FailureKind::Invalid, reason)
            }
            Evaluation::Due(occurrence) => {
                tracing::debug!(
                    reminder_id = %reminder.id,
                    due_at = %occurrence.due_at,
                    "Reminder due"
                );
                self.deliver(&reminder, now, sender_name).await
            }
        }
    }

    async fn deliver(&self, reminder: &Reminder, now: DateTime<Utc>, sender_name: &str) -> Outcome {
        let message = render_reminder(reminder, sender_name);

        if let Err(e) = self.notifier.send_message(&reminder.recipient_email, &message).await {
            tracing::warn!(reminder_id = %reminder.id, error = %e, "Send failed, will retry next sweep");
            return Outcome::failed(&reminder.id, FailureKind::Notify, e.to_string());
        }

        // Only last_sent_at is written; an edit made during the send survives
        let sent_at = recurrence::advance(reminder, now).last_sent_at.unwrap_or(now);
        let id = reminder.id.clone();
        match self.on_store(move |store| store.record_sent(&id, sent_at)).await {
            Ok(()) => {
                tracing::info!(
                    reminder_id = %reminder.id,
                    recipient = %reminder.recipient_email,
                    frequency = %reminder.frequency,
                    "Reminder sent"
                );
                Outcome::Sent
            }
            Err(e) => {
                tracing::error!(
                    reminder_id = %reminder.id,
                    error = %e,
                    "Sent but could not record it; reminder may be sent again"
                );
                Outcome::failed(&reminder.id, FailureKind::Persist, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Frequency, NewReminder, Settings};
    use crate::notify::MockNotifier;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use std::time::Duration;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
    }

    fn setup(notifier: MockNotifier) -> (Arc<MemoryStore>, Arc<MockNotifier>, Dispatcher) {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(notifier);
        let dispatcher = Dispatcher::new(store.clone(), notifier.clone(), DispatchConfig::default());
        (store, notifier, dispatcher)
    }

    #[tokio::test]
    async fn test_sweep_empty_store() {
        let (_store, notifier, dispatcher) = setup(MockNotifier::new());
        let report = dispatcher.sweep(at(2024, 1, 1)).await;

        assert!(report.is_clean());
        assert_eq!(report.candidates, 0);
        assert_eq!(report.attempted, 0);
        assert_eq!(notifier.attempts(), 0);
    }

    #[tokio::test]
    async fn test_sweep_sends_due_and_records() {
        let (store, notifier, dispatcher) = setup(MockNotifier::new());
        let reminder = store
            .create(NewReminder::new(at(2024, 1, 1), "Pay rent", "me@example.com"))
            .unwrap();

        let report = dispatcher.sweep(at(2024, 1, 2)).await;
        assert_eq!(report.sent, 1);
        assert_eq!(report.attempted, 1);

        let sent = notifier.sent_to("me@example.com");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Reminder: Pay rent");

        let stored = store.get(&reminder.id).unwrap().unwrap();
        assert_eq!(stored.last_sent_at, Some(at(2024, 1, 2)));
    }

    #[tokio::test]
    async fn test_sweep_skips_future_reminders() {
        let (store, notifier, dispatcher) = setup(MockNotifier::new());
        store
            .create(NewReminder::new(at(2024, 6, 1), "Later", "me@example.com"))
            .unwrap();

        let report = dispatcher.sweep(at(2024, 1, 1)).await;
        assert_eq!(report.candidates, 1);
        assert_eq!(report.attempted, 0);
        assert_eq!(notifier.attempts(), 0);
    }

    #[tokio::test]
    async fn test_send_failure_leaves_record_untouched() {
        let (store, _notifier, dispatcher) = setup(MockNotifier::failing_first(1));
        let reminder = store
            .create(NewReminder::new(at(2024, 1, 1), "Pay rent", "me@example.com"))
            .unwrap();

        let report = dispatcher.sweep(at(2024, 1, 2)).await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].kind, FailureKind::Notify);
        assert_eq!(store.get(&reminder.id).unwrap().unwrap().last_sent_at, None);

        let report = dispatcher.sweep(at(2024, 1, 2)).await;
        assert_eq!(report.sent, 1);
    }

    #[tokio::test]
    async fn test_persist_failure_is_reported() {
        let (store, notifier, dispatcher) = setup(MockNotifier::new());
        store
            .create(NewReminder::new(at(2024, 1, 1), "Pay rent", "me@example.com"))
            .unwrap();
        store.fail_saves(true);

        let report = dispatcher.sweep(at(2024, 1, 2)).await;
        assert_eq!(report.sent, 0);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].kind, FailureKind::Persist);
        // The message did go out
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_edit_during_send_is_not_overwritten() {
        let (store, notifier, dispatcher) = setup(MockNotifier::new().with_delay(Duration::from_millis(100)));
        let reminder = store
            .create(NewReminder::new(at(2024, 1, 1), "Pay rent", "me@example.com"))
            .unwrap();

        let sweep = dispatcher.sweep(at(2024, 1, 2));
        let edit = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let mut edited = store.get(&reminder.id).unwrap().unwrap();
            edited.description = "Pay rent (new landlord)".to_string();
            store.save(&edited).unwrap();
        };
        let (report, ()) = tokio::join!(sweep, edit);

        assert_eq!(report.sent, 1);
        assert_eq!(notifier.sent()[0].subject, "Reminder: Pay rent");
        let stored = store.get(&reminder.id).unwrap().unwrap();
        assert_eq!(stored.description, "Pay rent (new landlord)");
        assert_eq!(stored.last_sent_at, Some(at(2024, 1, 2)));
    }

    #[tokio::test]
    async fn test_malformed_record_isolated() {
        let (store, notifier, dispatcher) = setup(MockNotifier::new());
        for i in 0..4 {
            store
                .create(NewReminder::new(at(2024, 1, 1), format!("task {}", i), "me@example.com"))
                .unwrap();
        }
        store.insert_malformed("broken", "unknown frequency 'fortnightly'").unwrap();

        let report = dispatcher.sweep(at(2024, 1, 2)).await;
        assert_eq!(report.candidates, 5);
        assert_eq!(report.attempted, 5);
        assert_eq!(report.sent, 4);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failed_ids(), vec!["broken"]);
        assert_eq!(report.failures[0].kind, FailureKind::Malformed);
        assert_eq!(notifier.sent().len(), 4);
    }

    #[tokio::test]
    async fn test_invalid_record_isolated() {
        let (store, _notifier, dispatcher) = setup(MockNotifier::new());
        let mut reminder = Reminder::from_new(
            NewReminder::new(at(2024, 1, 1), "placeholder", "me@example.com"),
            at(2024, 1, 1),
        )
        .unwrap();
        reminder.description = String::new();
        store.insert(&reminder).unwrap();

        let report = dispatcher.sweep(at(2024, 1, 2)).await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].kind, FailureKind::Invalid);
    }

    #[tokio::test]
    async fn test_store_unavailable_aborts() {
        let (store, notifier, dispatcher) = setup(MockNotifier::new());
        store.set_unavailable(true);

        let report = dispatcher.sweep(at(2024, 1, 2)).await;
        assert!(report.is_aborted());
        assert_eq!(report.attempted, 0);
        assert_eq!(notifier.attempts(), 0);
    }

    #[tokio::test]
    async fn test_one_failing_recipient_does_not_block_others() {
        let notifier = MockNotifier::new();
        notifier.fail_recipient("bounce@example.com");
        let (store, notifier, dispatcher) = setup(notifier);

        store
            .create(NewReminder::new(at(2024, 1, 1), "a", "bounce@example.com"))
            .unwrap();
        store
            .create(NewReminder::new(at(2024, 1, 1), "b", "ok@example.com"))
            .unwrap();

        let report = dispatcher.sweep(at(2024, 1, 2)).await;
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(notifier.sent_to("ok@example.com").len(), 1);
    }

    #[tokio::test]
    async fn test_recurring_sent_once_per_period() {
        let (store, notifier, dispatcher) = setup(MockNotifier::new());
        store
            .create(
                NewReminder::new(at(2024, 1, 1), "standup", "me@example.com").with_frequency(Frequency::Daily),
            )
            .unwrap();

        dispatcher.sweep(at(2024, 1, 1)).await;
        dispatcher.sweep(at(2024, 1, 1)).await;
        assert_eq!(notifier.sent().len(), 1);

        dispatcher.sweep(at(2024, 1, 2)).await;
        assert_eq!(notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_sender_name_from_settings() {
        let (store, notifier, dispatcher) = setup(MockNotifier::new());
        store
            .save_settings(&Settings::new("me@example.com", "Family Bot"))
            .unwrap();
        store
            .create(NewReminder::new(at(2024, 1, 1), "Pay rent", "me@example.com"))
            .unwrap();

        dispatcher.sweep(at(2024, 1, 2)).await;
        assert!(notifier.sent()[0].body.ends_with("Family Bot\n"));
    }

    #[tokio::test]
    async fn test_sends_run_concurrently() {
        let (store, notifier, dispatcher) = setup(MockNotifier::new().with_delay(Duration::from_millis(200)));
        for i in 0..4 {
            store
                .create(NewReminder::new(at(2024, 1, 1), format!("task {}", i), "me@example.com"))
                .unwrap();
        }

        let started = std::time::Instant::now();
        let report = dispatcher.sweep(at(2024, 1, 2)).await;
        assert_eq!(report.sent, 4);
        assert_eq!(notifier.sent().len(), 4);
        assert!(started.elapsed() < Duration::from_millis(700));
    }
}
