//! Read access to per-organization webhook subscriptions.

use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `webhooks` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WebhookRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub url: String,
    pub secret_token: Option<String>,
    pub event_types: Vec<String>,
    pub is_active: bool,
}

/// Active webhooks of `org_id` subscribed to `event_type`, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_webhooks(
    pool: &PgPool,
    org_id: Uuid,
    event_type: &str,
) -> Result<Vec<WebhookRow>, DbError> {
    let rows = sqlx::query_as::<_, WebhookRow>(
        "SELECT id, org_id, url, secret_token, event_types, is_active \
         FROM webhooks \
         WHERE org_id = $1 AND is_active AND $2 = ANY(event_types) \
         ORDER BY created_at ASC, id ASC",
    )
    .bind(org_id)
    .bind(event_type)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
