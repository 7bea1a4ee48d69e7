//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - add / list / show / delete: manage reminders
//! - import / sample-csv: bulk creation from a CSV file
//! - sweep: one dispatch pass right now
//! - daemon: run the periodic trigger until interrupted
//! - settings: show or change the stored settings
//! - test-email: send a test message

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// remindr - scheduled email reminders
#[derive(Parser, Debug)]
#[command(name = "remindr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log messages instead of sending email
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a reminder
    Add {
        /// First occurrence (YYYY-MM-DD, YYYY-MM-DDTHH:MM[:SS] or RFC 3339)
        date: String,

        /// What to be reminded about
        description: String,

        /// Recipient (defaults to the stored default email)
        #[arg(short, long)]
        email: Option<String>,

        /// once, daily, weekly, monthly or yearly
        #[arg(short, long, default_value = "once")]
        frequency: String,

        /// Last instant the reminder may fire
        #[arg(long)]
        end_date: Option<String>,
    },

    /// Create reminders from a CSV file (columns: date, description[, email, frequency, end_date])
    Import {
        /// CSV file to read
        file: PathBuf,

        /// Recipient for rows without an email and for the summary
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Print a CSV template for import
    SampleCsv {
        /// Write the template to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List all reminders
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one reminder
    Show {
        /// Reminder ID
        id: String,
    },

    /// Delete a reminder
    Delete {
        /// Reminder ID
        id: String,
    },

    /// Run one sweep now
    Sweep {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Sweep on a timer until Ctrl-C
    Daemon,

    /// Show or change settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },

    /// Send a test email
    TestEmail {
        /// Recipient (defaults to the stored default email)
        #[arg(short, long)]
        email: Option<String>,
    },
}

/// Settings subcommands
#[derive(Subcommand, Debug)]
pub enum SettingsCommands {
    /// Print current settings
    Show,

    /// Update settings
    Set {
        /// Default recipient for new reminders
        #[arg(long)]
        default_email: Option<String>,

        /// Name used to sign notifications
        #[arg(long)]
        sender_name: Option<String>,
    },
}
