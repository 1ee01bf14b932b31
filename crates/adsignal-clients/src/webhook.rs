//! Outbound webhook delivery for organization-scoped events.

use adsignal_db::{list_active_webhooks, WebhookRow};
use adsignal_engine::{EngineError, WebhookSink};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::ClientError;
use crate::http::build_http_client;

pub const EVENT_HEADER: &str = "X-Adsignal-Event";
pub const SECRET_HEADER: &str = "X-Adsignal-Secret";

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    event: &'a str,
    timestamp: DateTime<Utc>,
    payload: &'a Value,
}

/// POST one event to one hook. A single attempt; non-2xx is an error.
///
/// # Errors
///
/// Returns [`ClientError::Http`] on network failure or non-2xx status.
pub async fn deliver(
    client: &Client,
    hook: &WebhookRow,
    event_type: &str,
    payload: &Value,
    timestamp: DateTime<Utc>,
) -> Result<(), ClientError> {
    let mut request = client
        .post(&hook.url)
        .header(EVENT_HEADER, event_type)
        .json(&Envelope {
            event: event_type,
            timestamp,
            payload,
        });
    if let Some(secret) = &hook.secret_token {
        request = request.header(SECRET_HEADER, secret);
    }
    request.send().await?.error_for_status()?;
    Ok(())
}

/// Deliver to every hook concurrently; failures are logged, not returned.
///
/// Returns the number of successful deliveries.
pub async fn deliver_all(
    client: &Client,
    hooks: &[WebhookRow],
    event_type: &str,
    payload: &Value,
) -> usize {
    let timestamp = Utc::now();
    let results = join_all(
        hooks
            .iter()
            .map(|hook| deliver(client, hook, event_type, payload, timestamp)),
    )
    .await;

    let mut delivered = 0;
    for (hook, result) in hooks.iter().zip(results) {
        match result {
            Ok(()) => delivered += 1,
            Err(e) => {
                tracing::warn!(hook_id = %hook.id, url = %hook.url, event_type, error = %e, "webhook: delivery failed");
            }
        }
    }
    delivered
}

/// Looks up an organization's active hooks and fans the event out to them.
pub struct WebhookDispatcher {
    client: Client,
    pool: PgPool,
}

impl WebhookDispatcher {
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn new(pool: PgPool, timeout_secs: u64) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_http_client(timeout_secs)?,
            pool,
        })
    }
}

#[async_trait]
impl WebhookSink for WebhookDispatcher {
    async fn notify(
        &self,
        org_id: Uuid,
        event_type: &str,
        payload: Value,
    ) -> Result<(), EngineError> {
        let hooks = list_active_webhooks(&self.pool, org_id, event_type)
            .await
            .map_err(|e| EngineError::Webhook(ClientError::from(e).to_string()))?;
        if hooks.is_empty() {
            tracing::debug!(org_id = %org_id, event_type, "webhook: no active subscriptions");
            return Ok(());
        }
        let delivered = deliver_all(&self.client, &hooks, event_type, &payload).await;
        tracing::info!(org_id = %org_id, event_type, delivered, total = hooks.len(), "webhook: event dispatched");
        Ok(())
    }
}
