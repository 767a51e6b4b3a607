// src/config.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};

use crate::credentials::Credentials;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub avito: AvitoConfig,

    #[serde(default)]
    pub relay: RelaySettings,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default, deserialize_with = "string_or_null")]
    pub bot_token: String,

    /// Recipients, in delivery order. Numeric ids are accepted too.
    #[serde(default, deserialize_with = "chat_id_list")]
    pub chat_ids: Vec<String>,

    /// Older single-recipient form, used only when `chat_ids` is empty.
    #[serde(default, deserialize_with = "optional_chat_id")]
    pub chat_id: Option<String>,

    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,
}

/// How new messages are obtained from the marketplace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMethod {
    #[default]
    Api,
    /// Browser scraping is not implemented; polling yields nothing.
    Scraping,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvitoConfig {
    /// Client secret of the API application.
    #[serde(default, deserialize_with = "string_or_null")]
    pub api_key: String,

    /// Account id. Messages authored by it are never relayed.
    #[serde(default, deserialize_with = "string_or_null")]
    pub user_id: String,

    /// Client id for the token exchange (defaults to `user_id`)
    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub method: SourceMethod,

    #[serde(default = "default_avito_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Seconds between relay cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Seconds to wait after a cycle failed unexpectedly
    #[serde(default = "default_recovery_delay")]
    pub recovery_delay_secs: u64,

    /// Per-request timeout for every HTTP call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Acknowledge messages on Avito after a successful delivery
    #[serde(default)]
    pub mark_read: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log file path; `None` (or `""` in TOML) logs to stdout only.
    #[serde(
        default = "default_log_file",
        deserialize_with = "log_file",
        serialize_with = "log_file_or_empty"
    )]
    pub file: Option<PathBuf>,

    #[serde(default = "default_log_max_bytes")]
    pub max_bytes: u64,

    /// Number of rotated files kept beside the active one
    #[serde(default = "default_log_keep")]
    pub keep: u32,

    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_avito_base_url() -> String {
    "https://api.avito.ru".to_string()
}

fn default_poll_interval() -> u64 {
    300
}

fn default_recovery_delay() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    30
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("avito_relay.log"))
}

fn default_log_max_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_log_keep() -> u32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_ids: Vec::new(),
            chat_id: None,
            api_url: default_telegram_api_url(),
        }
    }
}

impl Default for AvitoConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            user_id: String::new(),
            client_id: None,
            method: SourceMethod::default(),
            base_url: default_avito_base_url(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            recovery_delay_secs: default_recovery_delay(),
            request_timeout_secs: default_request_timeout(),
            mark_read: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            max_bytes: default_log_max_bytes(),
            keep: default_log_keep(),
            level: default_log_level(),
        }
    }
}

impl RelayConfig {
    /// The ordered recipient list. Falls back to the legacy `chat_id`.
    pub fn recipients(&self) -> Vec<String> {
        if !self.telegram.chat_ids.is_empty() {
            return self.telegram.chat_ids.clone();
        }
        self.telegram.chat_id.iter().cloned().collect()
    }

    /// Client credentials, or `None` when either half is missing.
    pub fn credentials(&self) -> Option<Credentials> {
        let client_id = self
            .avito
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.avito.user_id);
        if client_id.is_empty() || self.avito.api_key.is_empty() {
            return None;
        }
        Some(Credentials::new(client_id, &self.avito.api_key))
    }
}

/// Written by `avito-relay init`.
pub const SAMPLE_CONFIG: &str = r#"[telegram]
bot_token = ""
# Every chat listed here receives each new message.
chat_ids = []

[avito]
# Client secret of your Avito API application
api_key = ""
# Your Avito account id; also used as the client id unless client_id is set
user_id = ""
# "api", "scraping" (not implemented, polls nothing) or "disabled"
method = "api"

[relay]
poll_interval_secs = 300
recovery_delay_secs = 60
request_timeout_secs = 30
mark_read = false

[log]
# Set to "" to log to stdout only
file = "avito_relay.log"
max_bytes = 5242880
keep = 3
level = "info"
"#;

pub fn config_path(dir: &Path) -> PathBuf {
    dir.join("config.toml")
}

/// Load a config file. `.json` files use the JSON layout, anything else is TOML.
pub fn load_config(path: &Path) -> Result<Option<RelayConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: RelayConfig = if is_json(path) {
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?
    } else {
        toml::from_str(&contents).with_context(|| format!("Invalid TOML in {}", path.display()))?
    };
    Ok(Some(config))
}

pub fn save_config(path: &Path, config: &RelayConfig) -> Result<()> {
    let contents = if is_json(path) {
        serde_json::to_string_pretty(config)?
    } else {
        toml::to_string_pretty(config)?
    };
    std::fs::write(path, contents)?;
    Ok(())
}

/// Whether `path` selects the JSON layout.
pub fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

// --- Chat id helpers ---

#[derive(Deserialize)]
#[serde(untagged)]
enum IdValue {
    Text(String),
    Number(i64),
}

impl From<IdValue> for String {
    fn from(value: IdValue) -> Self {
        match value {
            IdValue::Text(s) => s,
            IdValue::Number(n) => n.to_string(),
        }
    }
}

fn chat_id_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let ids = Option::<Vec<IdValue>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(ids.into_iter().map(String::from).collect())
}

fn optional_chat_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let id = Option::<IdValue>::deserialize(deserializer)?;
    Ok(id.map(String::from))
}

/// Strings or numbers; an explicit `null` reads as empty.
fn string_or_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Option::<IdValue>::deserialize(deserializer)?;
    Ok(value.map(String::from).unwrap_or_default())
}

// --- Log file helpers ---

fn log_file<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<PathBuf>, D::Error> {
    let path = Option::<PathBuf>::deserialize(deserializer)?;
    Ok(path.filter(|p| !p.as_os_str().is_empty()))
}

fn log_file_or_empty<S: Serializer>(
    file: &Option<PathBuf>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match file {
        Some(path) => path.serialize(serializer),
        None => serializer.serialize_str(""),
    }
}
