use std::time::Duration;

use crate::channel::NotificationChannel;
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};

/// A chat that recently wrote to the bot, as reported by `getUpdates`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatInfo {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub username: Option<String>,
}

/// HTTP client for the Telegram Bot API.
pub struct TelegramClient {
    agent: ureq::Agent,
    api_url: String,
    bot_token: String,
}

impl TelegramClient {
    pub fn new(api_url: &str, bot_token: &str, timeout: Duration) -> Self {
        Self {
            agent: crate::http_agent(timeout),
            api_url: api_url.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            &config.telegram.api_url,
            &config.telegram.bot_token,
            Duration::from_secs(config.relay.request_timeout_secs),
        )
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_url, self.bot_token)
    }

    /// Read a response and reject non-2xx statuses and `"ok": false` bodies.
    fn read_result(
        method: &str,
        mut resp: ureq::http::Response<ureq::Body>,
    ) -> Result<serde_json::Value> {
        let status = resp.status().as_u16();
        let body = resp.body_mut().read_to_string()?;
        if !(200..300).contains(&status) {
            return Err(RelayError::Status {
                endpoint: method.to_string(),
                status,
                body,
            });
        }
        let json: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| RelayError::decode(method, e))?;
        check_ok(&json, method)?;
        Ok(json)
    }

    /// Name of the bot behind the token (`getMe`).
    pub fn get_me(&self) -> Result<String> {
        let resp = self.agent.get(&self.method_url("getMe")).call()?;
        let json = Self::read_result("getMe", resp)?;
        parse_get_me_response(&json)
    }

    /// Chats that messaged the bot recently (`getUpdates`).
    pub fn get_updates_chats(&self) -> Result<Vec<ChatInfo>> {
        let resp = self.agent.get(&self.method_url("getUpdates")).call()?;
        let json = Self::read_result("getUpdates", resp)?;
        parse_updates_chats(&json)
    }
}

impl NotificationChannel for TelegramClient {
    fn send(&self, recipient: &str, text: &str) -> Result<()> {
        let form = [
            ("chat_id", recipient),
            ("text", text),
            ("parse_mode", "HTML"),
        ];
        let resp = self
            .agent
            .post(&self.method_url("sendMessage"))
            .send_form(form)?;
        Self::read_result("sendMessage", resp).map(|_| ())
    }
}

// --- Response Parsers ---

fn check_ok(json: &serde_json::Value, method: &str) -> Result<()> {
    if json["ok"].as_bool() != Some(true) {
        let msg = json["description"].as_str().unwrap_or("unknown error");
        return Err(RelayError::decode(method, format!("Telegram API error: {msg}")));
    }
    Ok(())
}

pub fn parse_get_me_response(json: &serde_json::Value) -> Result<String> {
    let bot = &json["result"];
    bot["first_name"]
        .as_str()
        .or_else(|| bot["username"].as_str())
        .map(str::to_string)
        .ok_or_else(|| RelayError::decode("getMe", "missing bot name"))
}

/// Distinct chats from a `getUpdates` payload, in first-seen order.
pub fn parse_updates_chats(json: &serde_json::Value) -> Result<Vec<ChatInfo>> {
    let updates = json["result"]
        .as_array()
        .ok_or_else(|| RelayError::decode("getUpdates", "missing 'result' array"))?;

    let mut chats: Vec<ChatInfo> = Vec::new();
    for update in updates {
        let chat = &update["message"]["chat"];
        let Some(id) = chat["id"].as_i64().map(|id| id.to_string()) else {
            continue;
        };
        if chats.iter().any(|c| c.id == id) {
            continue;
        }
        let name = chat["title"]
            .as_str()
            .or_else(|| chat["first_name"].as_str())
            .unwrap_or("")
            .to_string();
        chats.push(ChatInfo {
            id,
            kind: chat["type"].as_str().unwrap_or("unknown").to_string(),
            name,
            username: chat["username"].as_str().map(str::to_string),
        });
    }
    Ok(chats)
}
