//! HTTP access to the Avito messenger API.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::config::RelayConfig;
use crate::credentials::{CredentialProvider, Credentials, Token};
use crate::error::{RelayError, Result};
use crate::message::{RawMessage, Thread};

/// Threads requested per page when listing chats.
pub const PAGE_SIZE: usize = 100;

/// Upper bound on chat pages fetched in one cycle.
pub const MAX_PAGES: usize = 10;

const UNKNOWN_TITLE: &str = "Unknown";

/// Remote operations the message source needs. Implemented over HTTP by
/// [`AvitoClient`]; tests substitute in-memory fakes.
pub trait MessageApi {
    /// Whether client credentials are present at all.
    fn is_configured(&self) -> bool;

    fn acquire_token(&mut self) -> Result<Token>;

    /// Every thread of the account, in the order the API lists them.
    /// Fails only when the first page does; a later failing page ends the
    /// listing with what was gathered.
    fn list_threads(&mut self, token: &Token) -> Result<Vec<Thread>>;

    fn list_messages(&mut self, token: &Token, thread_id: &str) -> Result<Vec<RawMessage>>;

    fn mark_read(&mut self, token: &Token, thread_id: &str, message_id: &str) -> Result<()>;
}

pub struct AvitoClient {
    agent: ureq::Agent,
    base_url: String,
    user_id: String,
    provider: Option<CredentialProvider>,
}

impl AvitoClient {
    pub fn new(
        base_url: &str,
        user_id: &str,
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> Self {
        let agent = crate::http_agent(timeout);
        let base_url = base_url.trim_end_matches('/').to_string();
        let provider =
            credentials.map(|creds| CredentialProvider::new(agent.clone(), &base_url, creds));
        Self {
            agent,
            base_url,
            user_id: user_id.to_string(),
            provider,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            &config.avito.base_url,
            &config.avito.user_id,
            config.credentials(),
            Duration::from_secs(config.relay.request_timeout_secs),
        )
    }

    fn account_url(&self, path: &str) -> String {
        format!(
            "{}/messenger/v1/accounts/{}{}",
            self.base_url, self.user_id, path
        )
    }

    /// Authenticated GET returning parsed JSON. A 401 drops the cached token.
    fn get_json(
        &mut self,
        token: &Token,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value> {
        let url = self.account_url(path);
        let mut req = self
            .agent
            .get(&url)
            .header("Authorization", &token.authorization())
            .header("Content-Type", "application/json");
        for (key, value) in params {
            req = req.query(*key, value);
        }
        let mut resp = req.call()?;
        let status = resp.status().as_u16();
        let body = resp.body_mut().read_to_string()?;
        self.check_status(path, status, body.as_str())?;
        serde_json::from_str(&body).map_err(|e| RelayError::decode(path, e))
    }

    fn check_status(&mut self, endpoint: &str, status: u16, body: &str) -> Result<()> {
        if (200..300).contains(&status) {
            return Ok(());
        }
        if status == 401 {
            if let Some(provider) = self.provider.as_mut() {
                provider.invalidate();
            }
        }
        Err(RelayError::Status {
            endpoint: endpoint.to_string(),
            status,
            body: body.to_string(),
        })
    }
}

impl MessageApi for AvitoClient {
    fn is_configured(&self) -> bool {
        self.provider.is_some() && !self.user_id.is_empty()
    }

    fn acquire_token(&mut self) -> Result<Token> {
        match self.provider.as_mut() {
            Some(provider) => provider.acquire_token(),
            None => Err(RelayError::Config(
                "Avito client id or client secret not configured".into(),
            )),
        }
    }

    fn list_threads(&mut self, token: &Token) -> Result<Vec<Thread>> {
        let mut threads = Vec::new();
        for page in 0..MAX_PAGES {
            let params = [
                ("limit", PAGE_SIZE.to_string()),
                ("offset", (page * PAGE_SIZE).to_string()),
            ];
            let page_result = self
                .get_json(token, "/chats", &params)
                .and_then(|json| parse_chats_response(&json));
            let (batch, listed) = match page_result {
                Ok(listing) => listing,
                Err(e) if page == 0 => return Err(e),
                Err(e) => {
                    // Later pages are best effort; keep the chats already listed.
                    log::warn!("Failed to list Avito chats page {}: {e}", page + 1);
                    break;
                }
            };
            threads.extend(batch);
            if listed < PAGE_SIZE {
                break;
            }
        }
        Ok(threads)
    }

    fn list_messages(&mut self, token: &Token, thread_id: &str) -> Result<Vec<RawMessage>> {
        let json = self.get_json(token, &format!("/chats/{thread_id}/messages"), &[])?;
        parse_messages_response(&json, thread_id)
    }

    fn mark_read(&mut self, token: &Token, thread_id: &str, message_id: &str) -> Result<()> {
        let path = format!("/chats/{thread_id}/messages/{message_id}/read");
        let url = self.account_url(&path);
        let mut resp = self
            .agent
            .post(&url)
            .header("Authorization", &token.authorization())
            .header("Content-Type", "application/json")
            .send_empty()?;
        let status = resp.status().as_u16();
        let body = resp.body_mut().read_to_string()?;
        self.check_status(&path, status, &body)
    }
}

// --- Response Parsers ---

/// Parse a chat listing page. Returns the usable threads and the number of
/// entries the page contained (for pagination, including skipped ones).
pub fn parse_chats_response(json: &serde_json::Value) -> Result<(Vec<Thread>, usize)> {
    let chats = json["chats"]
        .as_array()
        .ok_or_else(|| RelayError::decode("/chats", "missing 'chats' array"))?;

    let mut threads = Vec::with_capacity(chats.len());
    for chat in chats {
        let Some(id) = id_string(&chat["id"]) else {
            continue;
        };
        let listing = &chat["context"]["value"];
        threads.push(Thread {
            id,
            title: listing["title"]
                .as_str()
                .filter(|t| !t.is_empty())
                .unwrap_or(UNKNOWN_TITLE)
                .to_string(),
            url: listing["url"].as_str().unwrap_or("").to_string(),
        });
    }
    Ok((threads, chats.len()))
}

pub fn parse_messages_response(
    json: &serde_json::Value,
    thread_id: &str,
) -> Result<Vec<RawMessage>> {
    let items = json["messages"]
        .as_array()
        .ok_or_else(|| RelayError::decode("/messages", "missing 'messages' array"))?;

    let messages = items
        .iter()
        .filter_map(|item| {
            let id = id_string(&item["id"])?;
            Some(RawMessage {
                id,
                author_id: id_string(&item["author_id"]).unwrap_or_default(),
                text: item["content"]["text"].as_str().unwrap_or("").to_string(),
                created: item["created"].as_i64().and_then(unix_time),
                thread_id: thread_id.to_string(),
            })
        })
        .collect();
    Ok(messages)
}

/// Ids arrive as strings or integers depending on the endpoint.
fn id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn unix_time(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}
