use std::time::Duration;

use reqwest::Client;

use crate::error::ClientError;

const USER_AGENT: &str = "adsignal/0.1 (signal-engine)";

/// Shared `reqwest` client with per-request and connect deadlines.
///
/// # Errors
///
/// Returns [`ClientError::Http`] if the client cannot be constructed.
pub fn build_http_client(timeout_secs: u64) -> Result<Client, ClientError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(timeout_secs.min(10)))
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

/// `base` without trailing slashes, joined with `path`.
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
