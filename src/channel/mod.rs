pub mod telegram;

use crate::error::Result;

/// Abstraction over a notification endpoint. One call delivers one text to
/// one recipient; the fan-out decides what to do when a call fails.
pub trait NotificationChannel {
    fn send(&self, recipient: &str, text: &str) -> Result<()>;
}
