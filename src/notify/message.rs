//! Notification message rendering.

use crate::domain::{NewReminder, Reminder};

/// A rendered notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
    /// Display name the message is signed with
    pub sender_name: Option<String>,
}

impl Message {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            sender_name: None,
        }
    }

    pub fn with_sender(mut self, sender_name: impl Into<String>) -> Self {
        self.sender_name = Some(sender_name.into());
        self
    }
}

/// The notification sent when a reminder occurrence is due
pub fn render_reminder(reminder: &Reminder, sender_name: &str) -> Message {
    let mut body = String::from("Hello!\n\n");
    body.push_str(&format!(
        "This is your {} reminder for: {}\n",
        reminder.frequency, reminder.description
    ));
    body.push_str(&format!(
        "Originally scheduled for: {}\n\n",
        reminder.scheduled_at.format("%Y-%m-%d %H:%M")
    ));
    body.push_str(&format!("Frequency: {}\n", reminder.frequency.label()));
    if let Some(end) = reminder.end_date {
        body.push_str(&format!("End Date: {}\n", end.format("%Y-%m-%d")));
    }
    push_signature(&mut body, sender_name);

    Message::new(format!("Reminder: {}", reminder.description), body).with_sender(sender_name)
}

/// The notification sent after a reminder is created
pub fn render_confirmation(reminder: &NewReminder, sender_name: &str) -> Message {
    let mut body = String::from("Hello!\n\n");
    body.push_str(&format!(
        "Your {} reminder has been set successfully:\n",
        reminder.frequency
    ));
    body.push_str(&format!("Description: {}\n", reminder.description));
    body.push_str(&format!("Start Date: {}\n", reminder.scheduled_at.format("%Y-%m-%d")));
    body.push_str(&format!("Frequency: {}\n", reminder.frequency.label()));
    if let Some(end) = reminder.end_date {
        body.push_str(&format!("End Date: {}\n", end.format("%Y-%m-%d")));
    }
    body.push_str("\nYou will receive notifications according to the frequency settings.\n");
    push_signature(&mut body, sender_name);

    Message::new(format!("Reminder Confirmation - {}", sender_name), body).with_sender(sender_name)
}

/// A message for checking the transport end to end
pub fn render_test(sender_name: &str) -> Message {
    let mut body = String::from("Hello!\n\n");
    body.push_str(&format!("This is a test email from your {}.\n", sender_name));
    body.push_str("If you received this email, your email notifications are working correctly.\n");
    push_signature(&mut body, sender_name);

    Message::new(format!("Test Email from {}", sender_name), body).with_sender(sender_name)
}

/// The summary sent after a CSV import
pub fn render_import_summary(imported: usize, sender_name: &str) -> Message {
    let mut body = String::from("Hello!\n\n");
    body.push_str(&format!(
        "{} reminders have been successfully imported from your CSV file.\n",
        imported
    ));
    push_signature(&mut body, sender_name);

    Message::new("CSV Reminders Added", body).with_sender(sender_name)
}

fn push_signature(body: &mut String, sender_name: &str) {
    body.push_str("\nBest regards,\n");
    body.push_str(sender_name);
    body.push('\n');
}
