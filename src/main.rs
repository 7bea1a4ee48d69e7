use chrono::Utc;
use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod cli;
mod config;

use cli::Cli;
use cli::commands::{Commands, SettingsCommands};
use config::Config;

use remindr::dispatch::Dispatcher;
use remindr::domain::{Frequency, NewReminder, Reminder, Settings, SweepReport};
use remindr::id::parse_instant;
use remindr::import::{SAMPLE_CSV, import_csv_file};
use remindr::notify::{
    LogNotifier, Notifier, SendmailNotifier, render_confirmation, render_import_summary, render_test,
};
use remindr::recurrence;
use remindr::store::{ReminderStore, SqliteStore};
use remindr::trigger::Trigger;

fn setup_logging(level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("remindr")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("remindr.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let env = env_logger::Env::default().default_filter_or(level.unwrap_or("info"));
    env_logger::Builder::from_env(env)
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Everything a command needs, opened once
struct App {
    config: Config,
    store: Arc<SqliteStore>,
    settings: Settings,
    notifier: Arc<dyn Notifier>,
}

impl App {
    fn open(cli: &Cli, config: Config) -> Result<Self> {
        let store = SqliteStore::open_at(&config.storage.db_dir)
            .context(format!("Failed to open store in {}", config.storage.db_dir.display()))?;
        let settings = store
            .ensure_settings(&config.default_settings())
            .context("Failed to load settings")?;

        let notifier: Arc<dyn Notifier> = if cli.dry_run {
            Arc::new(LogNotifier::new())
        } else {
            Arc::new(SendmailNotifier::new(config.sendmail_config(&settings.sender_name)))
        };

        Ok(Self {
            config,
            store: Arc::new(store),
            settings,
            notifier,
        })
    }

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.store.clone(), self.notifier.clone(), self.config.dispatch_config())
    }
}

async fn run_application(cli: &Cli, config: Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }
    if cli.dry_run {
        println!("{}", "Dry run: notifications are logged, not sent".yellow());
    }

    let app = App::open(cli, config)?;

    match &cli.command {
        Commands::Add {
            date,
            description,
            email,
            frequency,
            end_date,
        } => handle_add_command(&app, date, description, email.as_deref(), frequency, end_date.as_deref()).await,
        Commands::Import { file, email } => handle_import_command(&app, file, email.as_deref()).await,
        Commands::SampleCsv { output } => handle_sample_csv_command(output.as_deref()),
        Commands::List { json } => handle_list_command(&app, *json, cli.is_verbose()),
        Commands::Show { id } => handle_show_command(&app, id),
        Commands::Delete { id } => handle_delete_command(&app, id),
        Commands::Sweep { json } => handle_sweep_command(&app, *json).await,
        Commands::Daemon => handle_daemon_command(&app).await,
        Commands::Settings { command } => handle_settings_command(&app, command),
        Commands::TestEmail { email } => handle_test_email_command(&app, email.as_deref()).await,
    }
}

async fn handle_add_command(
    app: &App,
    date: &str,
    description: &str,
    email: Option<&str>,
    frequency: &str,
    end_date: Option<&str>,
) -> Result<()> {
    let scheduled_at = parse_instant(date).context("Invalid date")?;
    let frequency: Frequency = frequency.parse()?;
    let recipient = email.unwrap_or(app.settings.default_email.as_str());

    let mut new = NewReminder::new(scheduled_at, description, recipient).with_frequency(frequency);
    if let Some(end) = end_date {
        new = new.with_end_date(parse_instant(end).context("Invalid end date")?);
    }

    let confirmation = render_confirmation(&new, &app.settings.sender_name);
    let reminder = app.store.create(new).context("Failed to create reminder")?;
    println!("{} {}", "Created reminder".green(), reminder.id.cyan());
    print_reminder(&reminder);

    if let Err(e) = app.notifier.send_message(&reminder.recipient_email, &confirmation).await {
        log::warn!("Confirmation for {} not sent: {}", reminder.id, e);
        println!("{} {}", "Warning: confirmation email not sent:".yellow(), e);
    }
    Ok(())
}

async fn handle_import_command(app: &App, file: &Path, email: Option<&str>) -> Result<()> {
    let recipient = email.unwrap_or(app.settings.default_email.as_str());
    let store = app.store.clone();
    let path = file.to_path_buf();
    let default_email = recipient.to_string();
    let report = tokio::task::spawn_blocking(move || import_csv_file(store.as_ref(), &path, &default_email))
        .await?
        .context(format!("Failed to import {}", file.display()))?;

    println!(
        "{} {} reminders from {}",
        "Imported".green(),
        report.imported.len(),
        file.display()
    );
    for reminder in &report.imported {
        println!("  {}  {}", reminder.id.cyan(), reminder.description);
    }
    if !report.rejected.is_empty() {
        println!("{} {} rows", "Skipped".yellow(), report.rejected.len());
        for rejected in &report.rejected {
            println!("  line {}: {}", rejected.line.to_string().red(), rejected.reason);
        }
    }

    if !report.imported.is_empty() {
        let summary = render_import_summary(report.imported.len(), &app.settings.sender_name);
        if let Err(e) = app.notifier.send_message(recipient, &summary).await {
            log::warn!("Import summary for {} not sent: {}", file.display(), e);
            println!("{} {}", "Warning: import summary email not sent:".yellow(), e);
        }
    }
    Ok(())
}

fn handle_sample_csv_command(output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, SAMPLE_CSV).context(format!("Failed to write {}", path.display()))?;
            println!("{} {}", "Sample CSV written to".green(), path.display());
        }
        None => print!("{}", SAMPLE_CSV),
    }
    Ok(())
}

fn handle_list_command(app: &App, json: bool, verbose: bool) -> Result<()> {
    let reminders = app.store.list_all().context("Failed to list reminders")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&reminders)?);
        return Ok(());
    }
    if reminders.is_empty() {
        println!("{}", "No reminders".dimmed());
        return Ok(());
    }

    for reminder in &reminders {
        let next = match recurrence::next_due(reminder) {
            Some(next) => next.format("%Y-%m-%d %H:%M").to_string(),
            None => "-".to_string(),
        };
        println!(
            "{}  {:<8}  next {:<16}  {}",
            reminder.id.cyan(),
            reminder.frequency.label(),
            next,
            reminder.description
        );
        if verbose {
            println!("    to {}", reminder.recipient_email);
        }
    }
    Ok(())
}

fn handle_show_command(app: &App, id: &str) -> Result<()> {
    let reminder = app
        .store
        .get(id)?
        .ok_or_else(|| eyre!("Reminder not found: {}", id))?;
    print_reminder(&reminder);
    Ok(())
}

fn handle_delete_command(app: &App, id: &str) -> Result<()> {
    app.store.delete(id).context(format!("Failed to delete {}", id))?;
    println!("{} {}", "Deleted".green(), id);
    Ok(())
}

async fn handle_sweep_command(app: &App, json: bool) -> Result<()> {
    let report = app.dispatcher().sweep(Utc::now()).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    match &report.aborted {
        Some(reason) => Err(eyre!("Sweep aborted: {}", reason)),
        None => Ok(()),
    }
}

async fn handle_daemon_command(app: &App) -> Result<()> {
    let trigger = Trigger::new(app.dispatcher(), app.config.trigger_config());
    trigger.start();
    println!(
        "{} (every {}s, Ctrl-C to stop)",
        "Reminder daemon running".green(),
        app.config.trigger_config().interval.as_secs()
    );

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;

    println!("{}", "Stopping...".yellow());
    trigger.stop().await;
    if let Some(report) = trigger.last_report() {
        print_report(&report);
    }
    Ok(())
}

fn handle_settings_command(app: &App, command: &SettingsCommands) -> Result<()> {
    match command {
        SettingsCommands::Show => {
            println!("default email: {}", app.settings.default_email);
            println!("sender name:   {}", app.settings.sender_name);
        }
        SettingsCommands::Set {
            default_email,
            sender_name,
        } => {
            let mut settings = app.settings.clone();
            if let Some(email) = default_email {
                if !email.contains('@') {
                    return Err(eyre!("Invalid email address: {}", email));
                }
                settings.default_email = email.clone();
            }
            if let Some(name) = sender_name {
                settings.sender_name = name.clone();
            }
            app.store.save_settings(&settings).context("Failed to save settings")?;
            println!("{}", "Settings updated".green());
        }
    }
    Ok(())
}

async fn handle_test_email_command(app: &App, email: Option<&str>) -> Result<()> {
    let to = email.unwrap_or(app.settings.default_email.as_str());
    app.notifier
        .send_message(to, &render_test(&app.settings.sender_name))
        .await
        .context(format!("Failed to send test email to {}", to))?;
    println!("{} {}", "Test email sent to".green(), to);
    Ok(())
}

fn print_reminder(reminder: &Reminder) {
    println!("  id:          {}", reminder.id);
    println!("  description: {}", reminder.description);
    println!("  recipient:   {}", reminder.recipient_email);
    println!("  frequency:   {}", reminder.frequency.label());
    println!("  scheduled:   {}", reminder.scheduled_at.format("%Y-%m-%d %H:%M"));
    if let Some(end) = reminder.end_date {
        println!("  ends:        {}", end.format("%Y-%m-%d %H:%M"));
    }
    match reminder.last_sent_at {
        Some(sent) => println!("  last sent:   {}", sent.format("%Y-%m-%d %H:%M")),
        None => println!("  last sent:   {}", "never".dimmed()),
    }
    if let Some(next) = recurrence::next_due(reminder) {
        println!("  next due:    {}", next.format("%Y-%m-%d %H:%M"));
    }
}

fn print_report(report: &SweepReport) {
    if report.is_aborted() {
        println!("{}", report.to_string().red());
    } else if report.failed > 0 {
        println!("{}", report.to_string().yellow());
        for failure in &report.failures {
            println!("  {} [{}] {}", failure.reminder_id.red(), failure.kind, failure.reason);
        }
    } else {
        println!("{}", report.to_string().green());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging
    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, config).await.context("Application failed")?;

    Ok(())
}
