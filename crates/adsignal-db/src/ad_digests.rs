//! Database operations for the `ad_digests` table.

use adsignal_core::{Digest, Record, RecordStatus};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `ad_digests` table. `status` is read as text.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AdDigestRow {
    pub id: Uuid,
    pub org_id: Option<Uuid>,
    pub brand: Option<String>,
    pub media_url: Option<String>,
    pub status: String,
    pub digest: Value,
    pub embedding: Option<Vec<f32>>,
    pub is_anomaly: bool,
    pub anomaly_score: Option<f32>,
    pub anomaly_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AdDigestRow> for Record {
    type Error = DbError;

    fn try_from(row: AdDigestRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<RecordStatus>()
            .map_err(DbError::InvalidValue)?;
        Ok(Record {
            id: row.id,
            org_id: row.org_id,
            brand: row.brand,
            media_url: row.media_url,
            status,
            digest: Digest::from_value(row.digest),
            embedding: row.embedding,
            created_at: row.created_at,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, org_id, brand, media_url, status::text AS status, \
     digest, embedding, is_anomaly, anomaly_score, anomaly_reason, created_at \
     FROM ad_digests";

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// List `processed` digests created in `[since, until]`, optionally narrowed to
/// one product category guess.
///
/// Results are ordered by `created_at ASC` then `id ASC`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_processed_digests(
    pool: &PgPool,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
    category: Option<&str>,
) -> Result<Vec<AdDigestRow>, DbError> {
    let sql = format!(
        "{SELECT_COLUMNS} \
         WHERE status = 'processed' \
           AND created_at >= $1 \
           AND created_at <= $2 \
           AND ($3::text IS NULL OR digest -> 'meta' ->> 'product_category_guess' = $3) \
         ORDER BY created_at ASC, id ASC"
    );
    let rows = sqlx::query_as::<_, AdDigestRow>(&sql)
        .bind(since)
        .bind(until)
        .bind(category)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Embeddings of other `processed` digests for a brand, newest first.
///
/// A digest matches on its assigned `brand` or on `digest.meta.brand_guess`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_brand_embeddings(
    pool: &PgPool,
    brand: &str,
    exclude: Uuid,
    limit: i64,
) -> Result<Vec<Vec<f32>>, DbError> {
    let vectors = sqlx::query_scalar::<_, Vec<f32>>(
        "SELECT embedding FROM ad_digests \
         WHERE status = 'processed' \
           AND id <> $2 \
           AND embedding IS NOT NULL \
           AND (brand = $1 OR digest -> 'meta' ->> 'brand_guess' = $1) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $3",
    )
    .bind(brand)
    .bind(exclude)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(vectors)
}

/// Store `embedding` only when the digest has none, returning the stored vector.
///
/// A concurrent writer that got there first wins; its vector is returned.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no digest has `id`, or [`DbError::Sqlx`]
/// if the statement fails.
pub async fn set_embedding_if_absent(
    pool: &PgPool,
    id: Uuid,
    embedding: &[f32],
) -> Result<Vec<f32>, DbError> {
    let stored: Option<Option<Vec<f32>>> = sqlx::query_scalar(
        "WITH updated AS ( \
             UPDATE ad_digests SET embedding = $2 \
             WHERE id = $1 AND embedding IS NULL \
             RETURNING embedding \
         ) \
         SELECT embedding FROM updated \
         UNION ALL \
         SELECT embedding FROM ad_digests \
         WHERE id = $1 AND NOT EXISTS (SELECT 1 FROM updated)",
    )
    .bind(id)
    .bind(embedding)
    .fetch_optional(pool)
    .await?;

    stored.flatten().ok_or(DbError::NotFound)
}

/// Mark a digest anomalous, overwriting any earlier score and reason.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no digest has `id`, or [`DbError::Sqlx`]
/// if the update fails.
pub async fn flag_anomaly(pool: &PgPool, id: Uuid, score: f32, reason: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE ad_digests \
         SET is_anomaly = TRUE, anomaly_score = $2, anomaly_reason = $3 \
         WHERE id = $1",
    )
    .bind(id)
    .bind(score.clamp(0.0, 1.0))
    .bind(reason)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Fetch one digest by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_ad_digest(pool: &PgPool, id: Uuid) -> Result<Option<AdDigestRow>, DbError> {
    let sql = format!("{SELECT_COLUMNS} WHERE id = $1");
    let row = sqlx::query_as::<_, AdDigestRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}
