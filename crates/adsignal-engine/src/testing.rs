//! In-memory collaborators for engine and downstream router tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use adsignal_core::{Digest, Record, RecordStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::EngineError;
use crate::store::{
    AnomalyFlag, EmbeddingService, NarrativeSynthesizer, NewPulseReport, PulseReport,
    RecordQuery, RecordStore, ReportStore, WebhookSink,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn injected(what: &str) -> EngineError {
    EngineError::store(std::io::Error::other(format!("injected {what} failure")))
}

/// A processed record with a fresh id and the given raw digest JSON.
#[must_use]
pub fn record_at(at: DateTime<Utc>, digest: Value) -> Record {
    let id = Uuid::new_v4();
    Record {
        id,
        org_id: None,
        brand: None,
        media_url: Some(format!("https://cdn.example.test/{id}.mp4")),
        status: RecordStatus::Processed,
        digest: Digest::from_value(digest),
        embedding: None,
        created_at: at,
    }
}

/// A processed record assigned to `brand`, optionally already embedded.
#[must_use]
pub fn brand_record(brand: &str, at: DateTime<Utc>, embedding: Option<Vec<f32>>) -> Record {
    let mut record = record_at(
        at,
        serde_json::json!({
            "meta": { "brand_guess": brand },
            "classification": { "trigger_mechanic": "Authority" },
            "strategy": { "positioning_claim": "Clinically proven" }
        }),
    );
    record.brand = Some(brand.to_string());
    record.embedding = embedding;
    record
}

#[derive(Default)]
struct StoreState {
    records: Vec<Record>,
    flags: HashMap<Uuid, AnomalyFlag>,
    reports: Vec<PulseReport>,
    embedding_writes: usize,
    fail_reads: bool,
    fail_report_writes: bool,
}

/// `RecordStore` + `ReportStore` over a vector.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn insert(&self, record: Record) {
        lock(&self.state).records.push(record);
    }

    pub fn fail_reads(&self, fail: bool) {
        lock(&self.state).fail_reads = fail;
    }

    pub fn fail_report_writes(&self, fail: bool) {
        lock(&self.state).fail_report_writes = fail;
    }

    #[must_use]
    pub fn record(&self, id: Uuid) -> Option<Record> {
        lock(&self.state).records.iter().find(|r| r.id == id).cloned()
    }

    #[must_use]
    pub fn flag(&self, id: Uuid) -> Option<AnomalyFlag> {
        lock(&self.state).flags.get(&id).cloned()
    }

    #[must_use]
    pub fn flag_count(&self) -> usize {
        lock(&self.state).flags.len()
    }

    #[must_use]
    pub fn embedding_writes(&self) -> usize {
        lock(&self.state).embedding_writes
    }

    #[must_use]
    pub fn reports(&self) -> Vec<PulseReport> {
        lock(&self.state).reports.clone()
    }
}

fn matches_brand(record: &Record, brand: &str) -> bool {
    record.brand.as_deref() == Some(brand) || record.digest.meta.brand_guess.as_deref() == Some(brand)
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn processed_records(&self, query: &RecordQuery) -> Result<Vec<Record>, EngineError> {
        let state = lock(&self.state);
        if state.fail_reads {
            return Err(injected("read"));
        }
        let mut records: Vec<Record> = state
            .records
            .iter()
            .filter(|r| r.status == RecordStatus::Processed)
            .filter(|r| r.created_at >= query.since && r.created_at <= query.until)
            .filter(|r| match &query.category {
                Some(category) => {
                    r.digest.meta.product_category_guess.as_deref() == Some(category.as_str())
                }
                None => true,
            })
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.created_at, r.id));
        Ok(records)
    }

    async fn brand_embeddings(
        &self,
        brand: &str,
        exclude: Uuid,
        limit: usize,
    ) -> Result<Vec<Vec<f32>>, EngineError> {
        let state = lock(&self.state);
        if state.fail_reads {
            return Err(injected("read"));
        }
        let mut history: Vec<&Record> = state
            .records
            .iter()
            .filter(|r| r.id != exclude && r.status == RecordStatus::Processed)
            .filter(|r| r.embedding.is_some() && matches_brand(r, brand))
            .collect();
        history.sort_by_key(|r| std::cmp::Reverse((r.created_at, r.id)));
        Ok(history
            .into_iter()
            .take(limit)
            .filter_map(|r| r.embedding.clone())
            .collect())
    }

    async fn store_embedding_if_absent(
        &self,
        id: Uuid,
        embedding: &[f32],
    ) -> Result<Vec<f32>, EngineError> {
        let mut state = lock(&self.state);
        let mut wrote = false;
        let stored = {
            let record = state
                .records
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| injected("missing record"))?;
            if record.embedding.is_none() {
                record.embedding = Some(embedding.to_vec());
                wrote = true;
            }
            record.embedding.clone().unwrap_or_default()
        };
        if wrote {
            state.embedding_writes += 1;
        }
        Ok(stored)
    }

    async fn flag_anomaly(&self, id: Uuid, flag: &AnomalyFlag) -> Result<(), EngineError> {
        lock(&self.state).flags.insert(id, flag.clone());
        Ok(())
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn append_pulse_report(
        &self,
        report: &NewPulseReport,
    ) -> Result<PulseReport, EngineError> {
        let mut state = lock(&self.state);
        if state.fail_report_writes {
            return Err(injected("write"));
        }
        let id = i64::try_from(state.reports.len()).unwrap_or(i64::MAX) + 1;
        let row = PulseReport {
            id,
            report_text: report.report_text.clone(),
            ad_count: i32::try_from(report.ad_count).unwrap_or(i32::MAX),
            anomalies_detected: i32::try_from(report.anomalies_detected).unwrap_or(i32::MAX),
            surges: serde_json::to_value(&report.surges).unwrap_or(Value::Null),
            created_at: Utc::now(),
        };
        state.reports.push(row.clone());
        Ok(row)
    }

    async fn recent_pulse_reports(&self, limit: i64) -> Result<Vec<PulseReport>, EngineError> {
        let state = lock(&self.state);
        if state.fail_reads {
            return Err(injected("read"));
        }
        let limit = usize::try_from(limit.max(0)).unwrap_or(0);
        Ok(state.reports.iter().rev().take(limit).cloned().collect())
    }
}

/// Embedding service answering from a table keyed by input text.
#[derive(Default)]
pub struct FakeEmbedder {
    vectors: Mutex<HashMap<String, Vec<f32>>>,
    fallback: Option<Vec<f32>>,
    fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeEmbedder {
    /// Every input embeds to `vector`.
    #[must_use]
    pub fn returning(vector: Vec<f32>) -> Self {
        Self {
            fallback: Some(vector),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set(&self, text: &str, vector: Vec<f32>) {
        lock(&self.vectors).insert(text.to_string(), vector);
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingService for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(EngineError::Embedding("injected embedding failure".to_string()));
        }
        let known = lock(&self.vectors).get(text).cloned();
        known
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| EngineError::Embedding(format!("no vector for {text:?}")))
    }
}

/// Records every delivery instead of sending it.
#[derive(Default)]
pub struct RecordingWebhooks {
    deliveries: Mutex<Vec<(Uuid, String, Value)>>,
    fail: bool,
}

impl RecordingWebhooks {
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn deliveries(&self) -> Vec<(Uuid, String, Value)> {
        lock(&self.deliveries).clone()
    }
}

#[async_trait]
impl WebhookSink for RecordingWebhooks {
    async fn notify(
        &self,
        org_id: Uuid,
        event_type: &str,
        payload: Value,
    ) -> Result<(), EngineError> {
        lock(&self.deliveries).push((org_id, event_type.to_string(), payload));
        if self.fail {
            return Err(EngineError::Webhook("injected webhook failure".to_string()));
        }
        Ok(())
    }
}

/// Narrator returning canned prose and keeping the contexts it was given.
#[derive(Default)]
pub struct FakeNarrator {
    reply: Option<String>,
    contexts: Mutex<Vec<String>>,
}

impl FakeNarrator {
    #[must_use]
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            ..Self::default()
        }
    }

    /// A narrator whose every call fails.
    #[must_use]
    pub fn failing() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contexts(&self) -> Vec<String> {
        lock(&self.contexts).clone()
    }
}

#[async_trait]
impl NarrativeSynthesizer for FakeNarrator {
    async fn synthesize(&self, context: &str) -> Result<String, EngineError> {
        lock(&self.contexts).push(context.to_string());
        self.reply
            .clone()
            .ok_or_else(|| EngineError::Narrative("injected narrative failure".to_string()))
    }
}
