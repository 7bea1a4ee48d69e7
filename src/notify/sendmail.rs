//! Email delivery through a sendmail-compatible program.
//!
//! The message is written to the program's stdin as a plain-text RFC 5322
//! message; `sendmail -t -i` reads recipients from the headers. Each send is
//! bounded by `timeout` and the child is killed if it overruns.

use async_trait::async_trait;
use chrono::Utc;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{Message, Notifier, NotifyError};

/// Configuration for the sendmail transport
#[derive(Debug, Clone)]
pub struct SendmailConfig {
    /// Program to run
    pub program: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
    /// Envelope/header sender address
    pub sender_email: String,
    /// From display name for messages that do not carry their own
    pub sender_name: String,
    /// Upper bound on one delivery
    pub timeout: Duration,
}

impl Default for SendmailConfig {
    fn default() -> Self {
        Self {
            program: "sendmail".to_string(),
            args: vec!["-t".to_string(), "-i".to_string()],
            sender_email: "reminders@localhost".to_string(),
            sender_name: "Reminder Service".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl SendmailConfig {
    /// Set the delivery timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the program and its arguments
    pub fn with_command(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.program = program.into();
        self.args = args;
        self
    }
}

/// Notifier that hands messages to a local MTA
pub struct SendmailNotifier {
    config: SendmailConfig,
}

impl SendmailNotifier {
    pub fn new(config: SendmailConfig) -> Self {
        Self { config }
    }

    /// Build the raw message written to the program's stdin
    pub fn format_message(&self, to: &str, subject: &str, body: &str) -> String {
        self.format_from(&self.config.sender_name, to, subject, body)
    }

    fn format_from(&self, from_name: &str, to: &str, subject: &str, body: &str) -> String {
        let mut raw = String::new();
        raw.push_str(&format!(
            "From: {} <{}>\r\n",
            header_value(from_name),
            header_value(&self.config.sender_email)
        ));
        raw.push_str(&format!("To: {}\r\n", header_value(to)));
        raw.push_str(&format!("Subject: {}\r\n", header_value(subject)));
        raw.push_str(&format!("Date: {}\r\n", Utc::now().to_rfc2822()));
        raw.push_str("MIME-Version: 1.0\r\n");
        raw.push_str("Content-Type: text/plain; charset=utf-8\r\n");
        raw.push_str("\r\n");
        for line in body.lines() {
            raw.push_str(line);
            raw.push_str("\r\n");
        }
        raw
    }

    async fn deliver(&self, raw: String) -> Result<(), NotifyError> {
        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| NotifyError::Transport(format!("failed to start {}: {}", self.config.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(raw.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(NotifyError::Rejected(format!(
                "{} exited with {:?}: {}",
                self.config.program,
                output.status.code(),
                stderr.trim()
            )))
        }
    }

    async fn transmit(&self, to: &str, raw: String) -> Result<(), NotifyError> {
        match tokio::time::timeout(self.config.timeout, self.deliver(raw)).await {
            Ok(Ok(())) => {
                log::info!("Email sent successfully to {}", to);
                Ok(())
            }
            Ok(Err(e)) => {
                log::error!("Failed to send email to {}: {}", to, e);
                Err(e)
            }
            Err(_) => {
                log::error!("Sending email to {} timed out after {:?}", to, self.config.timeout);
                Err(NotifyError::Timeout(self.config.timeout))
            }
        }
    }
}

#[async_trait]
impl Notifier for SendmailNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.transmit(to, self.format_message(to, subject, body)).await
    }

    /// The From name follows the signature the message was rendered with
    async fn send_message(&self, to: &str, message: &Message) -> Result<(), NotifyError> {
        let from_name = message.sender_name.as_deref().unwrap_or(&self.config.sender_name);
        let raw = self.format_from(from_name, to, &message.subject, &message.body);
        self.transmit(to, raw).await
    }
}

/// Header values must not carry line breaks
fn header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}
