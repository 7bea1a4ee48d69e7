//! Sweep outcome types.
//!
//! A sweep never raises per-reminder errors to its caller; everything that
//! went wrong is collected here instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a single reminder failed during a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// The store could not decode the record
    Malformed,
    /// The evaluator rejected the record
    Invalid,
    /// The notifier reported failure
    Notify,
    /// The send went out but the state update was not persisted
    Persist,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Malformed => "malformed",
            FailureKind::Invalid => "invalid",
            FailureKind::Notify => "notify",
            FailureKind::Persist => "persist",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One per-reminder failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub reminder_id: String,
    pub kind: FailureKind,
    pub reason: String,
}

/// Result of one evaluation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Instant the sweep evaluated against
    pub evaluated_at: DateTime<Utc>,
    /// Candidates returned by the store
    pub candidates: usize,
    /// Reminders that were due (or unreadable) and handled
    pub attempted: usize,
    /// Sends confirmed by the notifier and persisted
    pub sent: usize,
    /// Per-reminder failures
    pub failed: usize,
    pub failures: Vec<SweepFailure>,
    /// Set when the store could not be queried at all
    pub aborted: Option<String>,
}

impl SweepReport {
    pub fn new(evaluated_at: DateTime<Utc>) -> Self {
        Self {
            evaluated_at,
            candidates: 0,
            attempted: 0,
            sent: 0,
            failed: 0,
            failures: Vec::new(),
            aborted: None,
        }
    }

    /// A sweep that could not list candidates
    pub fn aborted(evaluated_at: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            aborted: Some(reason.into()),
            ..Self::new(evaluated_at)
        }
    }

    /// Record a confirmed send
    pub fn record_sent(&mut self) {
        self.attempted += 1;
        self.sent += 1;
    }

    /// Record a per-reminder failure
    pub fn record_failure(&mut self, reminder_id: impl Into<String>, kind: FailureKind, reason: impl Into<String>) {
        self.attempted += 1;
        self.failed += 1;
        self.failures.push(SweepFailure {
            reminder_id: reminder_id.into(),
            kind,
            reason: reason.into(),
        });
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// True if nothing failed and the sweep ran to completion
    pub fn is_clean(&self) -> bool {
        !self.is_aborted() && self.failed == 0
    }

    /// Ids of reminders that failed this sweep
    pub fn failed_ids(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.reminder_id.as_str()).collect()
    }
}

impl std::fmt::Display for SweepReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(reason) = &self.aborted {
            return write!(f, "sweep at {} aborted: {}", self.evaluated_at.to_rfc3339(), reason);
        }
        write!(
            f,
            "sweep at {}: {} candidates, {} attempted, {} sent, {} failed",
            self.evaluated_at.to_rfc3339(),
            self.candidates,
            self.attempted,
            self.sent,
            self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_report_is_clean() {
        let report = SweepReport::new(Utc::now());
        assert_eq!(report.attempted, 0);
        assert!(report.is_clean());
        assert!(!report.is_aborted());
    }

    #[test]
    fn test_record_sent_and_failure() {
        let mut report = SweepReport::new(Utc::now());
        report.record_sent();
        report.record_sent();
        report.record_failure("r-3", FailureKind::Notify, "connection refused");

        assert_eq!(report.attempted, 3);
        assert_eq!(report.sent, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failed_ids(), vec!["r-3"]);
        assert_eq!(report.failures[0].kind, FailureKind::Notify);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_aborted_report() {
        let report = SweepReport::aborted(Utc::now(), "database is locked");
        assert!(report.is_aborted());
        assert!(!report.is_clean());
        assert!(report.to_string().contains("aborted: database is locked"));
    }

    #[test]
    fn test_display_counts() {
        let mut report = SweepReport::new(Utc::now());
        report.candidates = 4;
        report.record_sent();
        let text = report.to_string();
        assert!(text.contains("4 candidates"));
        assert!(text.contains("1 sent"));
    }
}
