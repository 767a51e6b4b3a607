//! Failure taxonomy for every external call the relay makes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Missing or invalid configuration. Ends the current cycle only.
    #[error("configuration error: {0}")]
    Config(String),

    /// Token exchange could not be completed (network or malformed reply).
    #[error("token exchange failed: {0}")]
    Auth(String),

    /// Token endpoint answered with a non-success status.
    #[error("token exchange rejected with status {status}: {body}")]
    AuthRejected { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] ureq::Error),

    #[error("unexpected status {status} from {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("malformed response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    /// A single recipient could not be reached. Never aborts siblings.
    #[error("delivery to {recipient} failed: {reason}")]
    Delivery { recipient: String, reason: String },
}

impl RelayError {
    pub fn decode(endpoint: &str, reason: impl std::fmt::Display) -> Self {
        RelayError::Decode {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
