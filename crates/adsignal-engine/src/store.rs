//! Contracts the engine consumes from its collaborators.
//!
//! The engine performs no I/O of its own: records come from a [`RecordStore`],
//! reports go to a [`ReportStore`], and embeddings, webhooks and narrative
//! prose are produced by external services behind the remaining traits.

use adsignal_core::Record;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::EngineError;
use crate::surge::Surge;

/// Range read over `processed` records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    /// Inclusive lower bound on `created_at`.
    pub since: DateTime<Utc>,
    /// Inclusive upper bound on `created_at`.
    pub until: DateTime<Utc>,
    /// Exact match on the digest's product category guess.
    pub category: Option<String>,
}

/// Mutation written onto a record judged anomalous.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyFlag {
    /// `1 - similarity`, clamped to `[0, 1]`.
    pub score: f64,
    pub reason: String,
}

/// Insert-only pulse report row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPulseReport {
    pub report_text: String,
    pub ad_count: usize,
    pub anomalies_detected: usize,
    pub surges: Vec<Surge>,
}

/// A persisted pulse report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseReport {
    pub id: i64,
    pub report_text: String,
    pub ad_count: i32,
    pub anomalies_detected: i32,
    pub surges: Value,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All `processed` records in the query range, ordered by `(created_at, id)`.
    async fn processed_records(&self, query: &RecordQuery) -> Result<Vec<Record>, EngineError>;

    /// Up to `limit` embeddings of other processed records for `brand`,
    /// newest first, matched on assigned brand or brand guess.
    async fn brand_embeddings(
        &self,
        brand: &str,
        exclude: Uuid,
        limit: usize,
    ) -> Result<Vec<Vec<f32>>, EngineError>;

    /// Write `embedding` only if the record has none yet and return whichever
    /// vector is stored afterwards.
    async fn store_embedding_if_absent(
        &self,
        id: Uuid,
        embedding: &[f32],
    ) -> Result<Vec<f32>, EngineError>;

    async fn flag_anomaly(&self, id: Uuid, flag: &AnomalyFlag) -> Result<(), EngineError>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn append_pulse_report(&self, report: &NewPulseReport)
        -> Result<PulseReport, EngineError>;

    /// Newest first.
    async fn recent_pulse_reports(&self, limit: i64) -> Result<Vec<PulseReport>, EngineError>;
}

/// `text -> vector`, fixed dimensionality across calls.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError>;
}

/// Fire-and-forget event delivery scoped to an organization.
#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn notify(&self, org_id: Uuid, event_type: &str, payload: Value)
        -> Result<(), EngineError>;
}

/// Turns aggregated signal context into prose.
#[async_trait]
pub trait NarrativeSynthesizer: Send + Sync {
    async fn synthesize(&self, context: &str) -> Result<String, EngineError>;
}
