//! Client-credentials token exchange against the Avito authority.

use serde::Deserialize;
use std::fmt;
use std::time::{Duration, Instant};

use crate::error::{RelayError, Result};

/// Tokens are refreshed this long before the authority says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Client id and secret. Held only in memory.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_id: &str, client_secret: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// A bearer token. `expires_at` is `None` when the authority gave no lifetime.
#[derive(Clone)]
pub struct Token {
    pub bearer: String,
    pub expires_at: Option<Instant>,
}

impl Token {
    pub fn new(bearer: &str) -> Self {
        Self {
            bearer: bearer.to_string(),
            expires_at: None,
        }
    }

    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.bearer)
    }

    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now + EXPIRY_MARGIN < at)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("bearer", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

pub fn parse_token_response(body: &str) -> Result<TokenResponse> {
    let parsed: TokenResponse = serde_json::from_str(body)
        .map_err(|e| RelayError::Auth(format!("malformed token response: {e}")))?;
    if parsed.access_token.is_empty() {
        return Err(RelayError::Auth("token response has empty access_token".into()));
    }
    Ok(parsed)
}

/// Obtains bearer tokens on demand. A token is reused while it has more
/// than a minute of life left; otherwise every call re-exchanges.
pub struct CredentialProvider {
    agent: ureq::Agent,
    token_url: String,
    credentials: Credentials,
    cached: Option<Token>,
}

impl CredentialProvider {
    pub fn new(agent: ureq::Agent, base_url: &str, credentials: Credentials) -> Self {
        Self {
            agent,
            token_url: format!("{}/token", base_url.trim_end_matches('/')),
            credentials,
            cached: None,
        }
    }

    /// Return a usable token, exchanging credentials when the cache is stale.
    /// Never panics; every failure comes back as `Auth` or `AuthRejected`.
    pub fn acquire_token(&mut self) -> Result<Token> {
        let now = Instant::now();
        if let Some(token) = self.cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.clone());
        }
        self.cached = None;

        let token = self.exchange(now)?;
        if token.expires_at.is_some() {
            self.cached = Some(token.clone());
        }
        Ok(token)
    }

    /// Drop the cached token so the next call performs a fresh exchange.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    fn exchange(&self, now: Instant) -> Result<Token> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];
        let mut resp = self
            .agent
            .post(&self.token_url)
            .send_form(form)
            .map_err(|e| RelayError::Auth(e.to_string()))?;

        let status = resp.status().as_u16();
        let body = resp
            .body_mut()
            .read_to_string()
            .map_err(|e| RelayError::Auth(format!("failed to read token response: {e}")))?;

        if !(200..300).contains(&status) {
            return Err(RelayError::AuthRejected { status, body });
        }

        let parsed = parse_token_response(&body)?;
        Ok(Token {
            bearer: parsed.access_token,
            expires_at: parsed.expires_in.map(|secs| now + Duration::from_secs(secs)),
        })
    }
}
