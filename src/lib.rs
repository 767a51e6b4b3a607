pub mod avito;
pub mod channel;
pub mod config;
pub mod credentials;
pub mod error;
pub mod fanout;
pub mod log;
pub mod message;
pub mod relay;
pub mod seen;
pub mod source;

use std::time::Duration;

/// HTTP agent shared by the API clients. Every request is bounded by
/// `timeout`, and non-2xx statuses come back as responses, not errors,
/// so callers can report the body.
pub fn http_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build();
    ureq::Agent::new_with_config(config)
}
