//! Database operations for the insert-only `pulse_reports` table.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `pulse_reports` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PulseReportRow {
    pub id: i64,
    pub report_text: String,
    pub ad_count: i32,
    pub anomalies_detected: i32,
    pub surges: Value,
    pub created_at: DateTime<Utc>,
}

/// Append a pulse report and return the stored row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_pulse_report(
    pool: &PgPool,
    report_text: &str,
    ad_count: i32,
    anomalies_detected: i32,
    surges: Value,
) -> Result<PulseReportRow, DbError> {
    let row = sqlx::query_as::<_, PulseReportRow>(
        "INSERT INTO pulse_reports (report_text, ad_count, anomalies_detected, surges) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id, report_text, ad_count, anomalies_detected, surges, created_at",
    )
    .bind(report_text)
    .bind(ad_count)
    .bind(anomalies_detected)
    .bind(surges)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// List pulse reports, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_pulse_reports(pool: &PgPool, limit: i64) -> Result<Vec<PulseReportRow>, DbError> {
    let rows = sqlx::query_as::<_, PulseReportRow>(
        "SELECT id, report_text, ad_count, anomalies_detected, surges, created_at \
         FROM pulse_reports \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
