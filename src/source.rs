//! Pulls new buyer messages from the marketplace and normalizes them.

use crate::avito::MessageApi;
use crate::config::SourceMethod;
use crate::message::CanonicalMessage;
use crate::seen::SeenSet;

pub struct MessageSource<A> {
    api: A,
    method: SourceMethod,
    account_id: String,
    seen: SeenSet,
}

impl<A: MessageApi> MessageSource<A> {
    pub fn new(api: A, method: SourceMethod, account_id: &str) -> Self {
        Self {
            api,
            method,
            account_id: account_id.to_string(),
            seen: SeenSet::new(),
        }
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    /// Messages not relayed before in this run, excluding the account's own.
    /// Never fails: every problem is logged and yields what was gathered.
    pub fn poll_new_messages(&mut self) -> Vec<CanonicalMessage> {
        match self.method {
            SourceMethod::Api => self.poll_api(),
            SourceMethod::Scraping => {
                log::warn!("Scraping is not available; set avito.method = \"api\"");
                Vec::new()
            }
            SourceMethod::Disabled => {
                log::info!("Avito source disabled; nothing to poll");
                Vec::new()
            }
        }
    }

    fn poll_api(&mut self) -> Vec<CanonicalMessage> {
        let mut messages = Vec::new();

        if !self.api.is_configured() {
            log::error!("Avito client id or client secret not configured");
            return messages;
        }

        let token = match self.api.acquire_token() {
            Ok(token) => token,
            Err(e) => {
                log::error!("Could not obtain Avito access token: {e}");
                return messages;
            }
        };

        let threads = match self.api.list_threads(&token) {
            Ok(threads) => threads,
            Err(e) => {
                log::error!("Failed to list Avito chats: {e}");
                return messages;
            }
        };
        log::debug!("Listed {} chats", threads.len());

        for thread in &threads {
            let raw = match self.api.list_messages(&token, &thread.id) {
                Ok(raw) => raw,
                Err(e) => {
                    // Keep what earlier threads produced; skip the rest of this cycle.
                    log::error!("Failed to list messages of chat {}: {e}", thread.id);
                    break;
                }
            };

            for msg in raw {
                if self.seen.contains(&msg.id) {
                    continue;
                }
                if msg.author_id == self.account_id {
                    continue;
                }
                self.seen.insert(&msg.id);
                messages.push(CanonicalMessage::from_raw(msg, thread));
            }
        }

        messages
    }

    /// Best-effort read acknowledgment. Failures are logged, never raised.
    pub fn mark_read(&mut self, message_id: &str, thread_id: &str) -> bool {
        if self.method != SourceMethod::Api || !self.api.is_configured() {
            return false;
        }
        let token = match self.api.acquire_token() {
            Ok(token) => token,
            Err(e) => {
                log::error!("Could not obtain token to mark {message_id} read: {e}");
                return false;
            }
        };
        match self.api.mark_read(&token, thread_id, message_id) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to mark message {message_id} as read: {e}");
                false
            }
        }
    }
}
