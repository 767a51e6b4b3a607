//! Renders a message once and delivers it to every configured recipient.

use chrono::{DateTime, Local};

use crate::channel::NotificationChannel;
use crate::error::RelayError;
use crate::message::CanonicalMessage;

/// Outcome of delivering one message to the whole recipient list.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<RelayError>,
}

impl DeliveryReport {
    pub fn delivered(&self) -> bool {
        self.succeeded > 0
    }
}

pub struct Fanout<C> {
    channel: C,
    recipients: Vec<String>,
}

impl<C: NotificationChannel> Fanout<C> {
    pub fn new(channel: C, recipients: Vec<String>) -> Self {
        Self {
            channel,
            recipients,
        }
    }

    /// True iff at least one recipient received the notification.
    pub fn deliver(&self, message: &CanonicalMessage) -> bool {
        self.deliver_report(message).delivered()
    }

    /// Send to each recipient in order. One failure never stops the others.
    pub fn deliver_report(&self, message: &CanonicalMessage) -> DeliveryReport {
        let mut report = DeliveryReport {
            total: self.recipients.len(),
            ..Default::default()
        };
        if self.recipients.is_empty() {
            log::error!("No Telegram chat ids configured");
            return report;
        }

        let text = render_notification(message, Local::now());
        for recipient in &self.recipients {
            match self.channel.send(recipient, &text) {
                Ok(()) => {
                    log::info!("Notification sent to chat {recipient}");
                    report.succeeded += 1;
                }
                Err(e) => {
                    let err = RelayError::Delivery {
                        recipient: recipient.clone(),
                        reason: e.to_string(),
                    };
                    log::error!("{err}");
                    report.failures.push(err);
                }
            }
        }

        if report.delivered() {
            log::info!(
                "Notification delivered to {} of {} chats",
                report.succeeded,
                report.total
            );
        } else {
            log::error!("Notification could not be delivered to any chat");
        }
        report
    }
}

/// The fixed HTML notification body. `now` is the delivery time shown.
pub fn render_notification(message: &CanonicalMessage, now: DateTime<Local>) -> String {
    let sender = non_empty_or(&message.sender, "Unknown");
    let title = non_empty_or(&message.thread_title, "Unknown");
    let text = non_empty_or(&message.text, "(empty message)");

    let mut lines = vec![
        "🔔 <b>New Avito message</b>".to_string(),
        String::new(),
        format!("📅 <b>Time:</b> {}", now.format("%Y-%m-%d %H:%M:%S")),
        format!("👤 <b>From:</b> {}", escape_html(sender)),
        format!("📋 <b>Listing:</b> {}", escape_html(title)),
    ];
    if !message.thread_url.is_empty() {
        lines.push(format!(
            "🔗 <a href=\"{}\">Open listing</a>",
            escape_html(&message.thread_url)
        ));
    }
    lines.push(String::new());
    lines.push("💬 <b>Message:</b>".to_string());
    lines.push(escape_html(text));
    lines.push(String::new());
    lines.push("---".to_string());
    lines.push("<i>Sent automatically</i>".to_string());
    lines.join("\n")
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
