//! Bulk import of reminders from CSV.
//!
//! A file needs `date` and `description` columns. `email`, `frequency` and
//! `end_date` are optional; a missing or blank email falls back to the
//! default recipient and a missing frequency means `once`. Rows go through
//! the same validation as `add` and are stored one at a time, so a bad row is
//! reported and skipped without stopping the rest.

use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::domain::{Frequency, NewReminder, Reminder};
use crate::error::{RemindrError, Result};
use crate::id::parse_instant;
use crate::store::ReminderStore;

/// Columns every import file must have
pub const REQUIRED_COLUMNS: [&str; 2] = ["date", "description"];

/// Template offered to users who want a starting point
pub const SAMPLE_CSV: &str = "\
date,description,email,frequency,end_date
2024-03-20T10:00:00,Team meeting,team@example.com,once,
2024-03-21T15:30:00,Project deadline,manager@example.com,weekly,2024-06-30
";

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: String,
    description: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    frequency: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
}

/// A row that was not imported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    /// 1-based line in the file (the header is line 1)
    pub line: usize,
    pub reason: String,
}

/// Outcome of one import
#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: Vec<Reminder>,
    pub rejected: Vec<RejectedRow>,
}

impl ImportReport {
    fn reject(&mut self, line: usize, reason: impl Into<String>) {
        let reason = reason.into();
        log::warn!("Skipping CSV line {}: {}", line, reason);
        self.rejected.push(RejectedRow { line, reason });
    }
}

/// Import every row of the file at `path`.
pub fn import_csv_file(store: &dyn ReminderStore, path: &Path, default_email: &str) -> Result<ImportReport> {
    let file = File::open(path)?;
    import_csv(store, file, default_email)
}

/// Import every row read from `input`.
///
/// Fails as a whole only when the header is unusable or the store itself
/// errors; row-level problems end up in [`ImportReport::rejected`].
pub fn import_csv<R: Read>(store: &dyn ReminderStore, input: R, default_email: &str) -> Result<ImportReport> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);

    let headers = reader.headers()?.clone();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .into_iter()
        .filter(|column| !headers.iter().any(|h| h == *column))
        .collect();
    if !missing.is_empty() {
        return Err(RemindrError::InvalidReminder(format!(
            "CSV file is missing required columns: {}",
            missing.join(", ")
        )));
    }

    let mut report = ImportReport::default();
    for (index, row) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let new = match row.map_err(RemindrError::from).and_then(|row| to_new_reminder(row, default_email)) {
            Ok(new) => new,
            Err(e) => {
                report.reject(line, e.to_string());
                continue;
            }
        };

        match store.create(new) {
            Ok(reminder) => report.imported.push(reminder),
            Err(RemindrError::InvalidReminder(reason)) => report.reject(line, reason),
            Err(e) => return Err(e),
        }
    }

    log::info!(
        "CSV import finished: {} imported, {} rejected",
        report.imported.len(),
        report.rejected.len()
    );
    Ok(report)
}

fn to_new_reminder(row: CsvRow, default_email: &str) -> Result<NewReminder> {
    let scheduled_at = parse_instant(&row.date)?;
    let recipient = non_blank(row.email).unwrap_or_else(|| default_email.to_string());
    let frequency = match non_blank(row.frequency) {
        Some(frequency) => frequency.parse()?,
        None => Frequency::Once,
    };

    let mut new = NewReminder::new(scheduled_at, row.description, recipient).with_frequency(frequency);
    if let Some(end) = non_blank(row.end_date) {
        new = new.with_end_date(parse_instant(&end)?);
    }
    Ok(new)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
