//! The engine's storage contracts over Postgres.

use adsignal_core::Record;
use adsignal_engine::{
    AnomalyFlag, EngineError, NewPulseReport, PulseReport, RecordQuery, RecordStore, ReportStore,
};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::pulse_reports::PulseReportRow;
use crate::{ad_digests, pulse_reports, DbError};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl From<PulseReportRow> for PulseReport {
    fn from(row: PulseReportRow) -> Self {
        Self {
            id: row.id,
            report_text: row.report_text,
            ad_count: row.ad_count,
            anomalies_detected: row.anomalies_detected,
            surges: row.surges,
            created_at: row.created_at,
        }
    }
}

fn count(value: usize) -> Result<i32, EngineError> {
    i32::try_from(value)
        .map_err(|_| EngineError::store(DbError::InvalidValue(format!("count {value} overflows i32"))))
}

#[async_trait]
impl RecordStore for PgStore {
    async fn processed_records(&self, query: &RecordQuery) -> Result<Vec<Record>, EngineError> {
        let rows = ad_digests::list_processed_digests(
            &self.pool,
            query.since,
            query.until,
            query.category.as_deref(),
        )
        .await
        .map_err(EngineError::store)?;

        rows.into_iter()
            .map(|row| Record::try_from(row).map_err(EngineError::store))
            .collect()
    }

    async fn brand_embeddings(
        &self,
        brand: &str,
        exclude: Uuid,
        limit: usize,
    ) -> Result<Vec<Vec<f32>>, EngineError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        ad_digests::list_brand_embeddings(&self.pool, brand, exclude, limit)
            .await
            .map_err(EngineError::store)
    }

    async fn store_embedding_if_absent(
        &self,
        id: Uuid,
        embedding: &[f32],
    ) -> Result<Vec<f32>, EngineError> {
        ad_digests::set_embedding_if_absent(&self.pool, id, embedding)
            .await
            .map_err(EngineError::store)
    }

    async fn flag_anomaly(&self, id: Uuid, flag: &AnomalyFlag) -> Result<(), EngineError> {
        #[allow(clippy::cast_possible_truncation)]
        let score = flag.score as f32;
        ad_digests::flag_anomaly(&self.pool, id, score, &flag.reason)
            .await
            .map_err(EngineError::store)
    }
}

#[async_trait]
impl ReportStore for PgStore {
    async fn append_pulse_report(
        &self,
        report: &NewPulseReport,
    ) -> Result<PulseReport, EngineError> {
        let surges = serde_json::to_value(&report.surges).map_err(EngineError::store)?;
        let row = pulse_reports::insert_pulse_report(
            &self.pool,
            &report.report_text,
            count(report.ad_count)?,
            count(report.anomalies_detected)?,
            surges,
        )
        .await
        .map_err(EngineError::store)?;
        Ok(row.into())
    }

    async fn recent_pulse_reports(&self, limit: i64) -> Result<Vec<PulseReport>, EngineError> {
        let rows = pulse_reports::list_pulse_reports(&self.pool, limit)
            .await
            .map_err(EngineError::store)?;
        Ok(rows.into_iter().map(PulseReport::from).collect())
    }
}
