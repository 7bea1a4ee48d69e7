use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use remindr::dispatch::DispatchConfig;
use remindr::domain::Settings;
use remindr::notify::SendmailConfig;
use remindr::trigger::TriggerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub scheduler: SchedulerConfig,
    pub storage: StorageConfig,
    pub email: EmailConfig,
    pub settings: SettingsDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
    pub max_concurrent_sends: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            max_concurrent_sends: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("remindr"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub program: String,
    pub args: Vec<String>,
    pub sender_email: String,
    pub timeout_ms: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            program: "sendmail".to_string(),
            args: vec!["-t".to_string(), "-i".to_string()],
            sender_email: "reminders@localhost".to_string(),
            timeout_ms: 30000,
        }
    }
}

/// Values used to seed the settings row on first run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsDefaults {
    pub default_email: String,
    pub sender_name: String,
}

impl Default for SettingsDefaults {
    fn default() -> Self {
        Self {
            default_email: "me@localhost".to_string(),
            sender_name: "Reminder Service".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            scheduler: SchedulerConfig::default(),
            storage: StorageConfig::default(),
            email: EmailConfig::default(),
            settings: SettingsDefaults::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_name = env!("CARGO_PKG_NAME");

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig::default()
            .with_max_concurrent_sends(self.scheduler.max_concurrent_sends)
            .with_sender_name(self.settings.sender_name.clone())
    }

    pub fn trigger_config(&self) -> TriggerConfig {
        TriggerConfig::default().with_interval(Duration::from_secs(self.scheduler.interval_secs.max(1)))
    }

    /// Sendmail transport config; the From name follows the stored settings
    pub fn sendmail_config(&self, sender_name: &str) -> SendmailConfig {
        SendmailConfig {
            sender_email: self.email.sender_email.clone(),
            sender_name: sender_name.to_string(),
            ..SendmailConfig::default()
        }
        .with_command(self.email.program.clone(), self.email.args.clone())
        .with_timeout(Duration::from_millis(self.email.timeout_ms))
    }

    pub fn default_settings(&self) -> Settings {
        Settings::new(self.settings.default_email.clone(), self.settings.sender_name.clone())
    }
}
