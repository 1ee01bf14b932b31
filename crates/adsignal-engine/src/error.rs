use std::future::Future;
use std::time::Duration;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("record store error: {0}")]
    Store(#[source] BoxError),

    #[error("embedding service error: {0}")]
    Embedding(String),

    #[error("webhook error: {0}")]
    Webhook(String),

    #[error("narrative synthesis error: {0}")]
    Narrative(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("centroid requested over an empty vector set")]
    EmptyVectorSet,

    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },
}

impl EngineError {
    /// Wrap any store-side error.
    pub fn store<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        EngineError::Store(Box::new(error))
    }

    /// Contract violations that should never be retried or silently skipped.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            EngineError::DimensionMismatch { .. } | EngineError::EmptyVectorSet
        )
    }
}

/// Run `fut` under `limit`, mapping expiry to [`EngineError::Timeout`].
pub(crate) async fn bounded<T, F>(
    operation: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, EngineError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout {
            operation,
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
