use thiserror::Error;

/// Errors returned by the outbound HTTP collaborators.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network, TLS or non-2xx failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered 2xx with a body we cannot use.
    #[error("invalid response from {service}: {reason}")]
    InvalidResponse {
        service: &'static str,
        reason: String,
    },

    /// An embedding of the wrong length; the store only holds one dimensionality.
    #[error("embedding has {actual} dimensions, expected {expected}")]
    Dimension { expected: usize, actual: usize },

    #[error("invalid client configuration: {0}")]
    Config(String),

    #[error("webhook lookup failed: {0}")]
    Lookup(#[from] adsignal_db::DbError),
}
