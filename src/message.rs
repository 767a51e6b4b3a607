// src/message.rs
use chrono::{DateTime, Utc};

/// A conversation tied to one listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Thread {
    pub id: String,
    pub title: String,
    pub url: String,
}

/// A message as the remote API reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub id: String,
    pub author_id: String,
    pub text: String,
    pub created: Option<DateTime<Utc>>,
    pub thread_id: String,
}

/// The normalized record handed to the notification side. Its `id` is
/// unique within one process run and `sender` is never the own account.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalMessage {
    pub id: String,
    pub sender: String,
    pub text: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub thread_id: String,
    pub thread_title: String,
    pub thread_url: String,
}

impl CanonicalMessage {
    pub fn from_raw(raw: RawMessage, thread: &Thread) -> Self {
        Self {
            id: raw.id,
            sender: raw.author_id,
            text: raw.text,
            timestamp: raw.created,
            thread_id: raw.thread_id,
            thread_title: thread.title.clone(),
            thread_url: thread.url.clone(),
        }
    }
}
