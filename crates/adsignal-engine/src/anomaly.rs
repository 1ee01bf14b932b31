//! Embedding drift detection against a brand's recent creative centroid.
//!
//! Each eligible record is embedded (once; the store only keeps the first
//! vector written), compared to the mean of up to [`HISTORY_LIMIT`] other
//! embedded records of the same brand, and flagged when the cosine
//! similarity falls below [`SIMILARITY_THRESHOLD`].
//!
//! Records are grouped by brand. Groups run concurrently on a bounded pool;
//! records within a group run one at a time, oldest first, so a brand's
//! verdicts do not depend on scheduling.

use std::collections::HashMap;
use std::time::Duration;

use adsignal_core::{AppConfig, Record};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{bounded, EngineError};
use crate::store::{AnomalyFlag, EmbeddingService, RecordStore, WebhookSink};
use crate::vector::{centroid, cosine_similarity};

pub const SIMILARITY_THRESHOLD: f64 = 0.85;
/// Fewer historical vectors than this and the record is not yet eligible.
pub const MIN_HISTORY: usize = 3;
pub const HISTORY_LIMIT: usize = 10;
pub const ANOMALY_EVENT: &str = "strategic_anomaly";

const MAX_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorSettings {
    /// Brand groups evaluated at once.
    pub concurrency: usize,
    /// Deadline for each embedding, webhook or narrative call.
    pub call_timeout: Duration,
    /// Deadline for the whole detection phase.
    pub deadline: Duration,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            call_timeout: Duration::from_secs(20),
            deadline: Duration::from_secs(240),
        }
    }
}

impl DetectorSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            concurrency: config.anomaly_concurrency.clamp(1, MAX_CONCURRENCY),
            call_timeout: Duration::from_secs(config.external_timeout_secs),
            deadline: Duration::from_secs(config.pass_deadline_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub record_id: Uuid,
    pub brand: String,
    pub similarity: f64,
    pub score: f64,
    pub reason: String,
}

/// Verdict for one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Nominal { similarity: f64 },
    Anomalous(Anomaly),
    /// Fewer than [`MIN_HISTORY`] embedded records for the brand.
    InsufficientHistory { available: usize },
    /// A zero-magnitude vector; similarity has no meaning.
    Undefined,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionSummary {
    /// Records that reached a nominal or anomalous verdict.
    pub evaluated: usize,
    /// In input order.
    pub anomalies: Vec<Anomaly>,
    pub skipped: usize,
    pub failed: usize,
    /// Records not reached before the deadline.
    pub unfinished: usize,
}

enum Outcome {
    Done(Evaluation),
    Failed,
    Unfinished,
}

pub struct AnomalyDetector<'a> {
    store: &'a dyn RecordStore,
    embedder: &'a dyn EmbeddingService,
    webhooks: &'a dyn WebhookSink,
    settings: DetectorSettings,
}

impl<'a> AnomalyDetector<'a> {
    #[must_use]
    pub fn new(
        store: &'a dyn RecordStore,
        embedder: &'a dyn EmbeddingService,
        webhooks: &'a dyn WebhookSink,
        settings: DetectorSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            webhooks,
            settings,
        }
    }

    /// Evaluate every record that carries a brand.
    ///
    /// Per-record failures are logged and counted, never propagated. Records
    /// still waiting when the deadline passes are counted as unfinished.
    pub async fn run(&self, records: &[Record]) -> DetectionSummary {
        let deadline = Instant::now() + self.settings.deadline;
        let groups = group_by_brand(records);
        let concurrency = self.settings.concurrency.clamp(1, MAX_CONCURRENCY);

        tracing::info!(
            records = records.len(),
            brands = groups.len(),
            concurrency,
            "anomaly: starting detection"
        );

        let outcomes: Vec<Vec<(usize, Outcome)>> = stream::iter(groups)
            .map(|(brand, members)| async move { self.run_group(brand, members, deadline).await })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut summary = DetectionSummary::default();
        let mut anomalies = Vec::new();
        for (index, outcome) in outcomes.into_iter().flatten() {
            match outcome {
                Outcome::Done(Evaluation::Anomalous(anomaly)) => {
                    summary.evaluated += 1;
                    anomalies.push((index, anomaly));
                }
                Outcome::Done(Evaluation::Nominal { .. }) => summary.evaluated += 1,
                Outcome::Done(_) => summary.skipped += 1,
                Outcome::Failed => summary.failed += 1,
                Outcome::Unfinished => summary.unfinished += 1,
            }
        }
        anomalies.sort_by_key(|(index, _)| *index);
        summary.anomalies = anomalies.into_iter().map(|(_, a)| a).collect();

        if summary.unfinished > 0 {
            tracing::warn!(
                unfinished = summary.unfinished,
                deadline_secs = self.settings.deadline.as_secs(),
                "anomaly: pass deadline reached, records left unevaluated"
            );
        }
        tracing::info!(
            evaluated = summary.evaluated,
            anomalies = summary.anomalies.len(),
            skipped = summary.skipped,
            failed = summary.failed,
            "anomaly: detection complete"
        );
        summary
    }

    async fn run_group(
        &self,
        brand: String,
        members: Vec<(usize, Record)>,
        deadline: Instant,
    ) -> Vec<(usize, Outcome)> {
        let mut outcomes = Vec::with_capacity(members.len());
        for (index, record) in members {
            let record = &record;
            if Instant::now() >= deadline {
                outcomes.push((index, Outcome::Unfinished));
                continue;
            }
            let outcome =
                match tokio::time::timeout_at(deadline, self.evaluate(&brand, record)).await {
                    Ok(Ok(evaluation)) => {
                        log_evaluation(record.id, &brand, &evaluation);
                        Outcome::Done(evaluation)
                    }
                    Ok(Err(e)) => {
                        if e.is_contract_violation() {
                            tracing::error!(record_id = %record.id, brand = %brand, error = %e, "anomaly: contract violation");
                        } else {
                            tracing::warn!(record_id = %record.id, brand = %brand, error = %e, "anomaly: skipping record");
                        }
                        Outcome::Failed
                    }
                    Err(_) => Outcome::Unfinished,
                };
            outcomes.push((index, outcome));
        }
        outcomes
    }

    /// Evaluate one record of `brand`, writing the embedding and any flag.
    ///
    /// # Errors
    ///
    /// Embedding or store failures, call timeouts and dimension mismatches.
    pub async fn evaluate(&self, brand: &str, record: &Record) -> Result<Evaluation, EngineError> {
        let embedding = self.ensure_embedding(record).await?;

        let history = self
            .store
            .brand_embeddings(brand, record.id, HISTORY_LIMIT)
            .await?;
        if history.len() < MIN_HISTORY {
            return Ok(Evaluation::InsufficientHistory {
                available: history.len(),
            });
        }

        let center = centroid(&history)?;
        let Some(similarity) = cosine_similarity(&embedding, &center)? else {
            return Ok(Evaluation::Undefined);
        };
        if similarity >= SIMILARITY_THRESHOLD {
            return Ok(Evaluation::Nominal { similarity });
        }

        let score = (1.0 - similarity).clamp(0.0, 1.0);
        let reason = drift_reason(brand, score);
        self.store
            .flag_anomaly(
                record.id,
                &AnomalyFlag {
                    score,
                    reason: reason.clone(),
                },
            )
            .await?;

        let anomaly = Anomaly {
            record_id: record.id,
            brand: brand.to_string(),
            similarity,
            score,
            reason,
        };
        if let Some(org_id) = record.org_id {
            self.notify(org_id, &anomaly).await;
        }
        Ok(Evaluation::Anomalous(anomaly))
    }

    async fn ensure_embedding(&self, record: &Record) -> Result<Vec<f32>, EngineError> {
        if let Some(existing) = record.embedding.as_ref().filter(|e| !e.is_empty()) {
            return Ok(existing.clone());
        }
        let input = record.embedding_input();
        let computed = bounded(
            "embedding",
            self.settings.call_timeout,
            self.embedder.embed(&input),
        )
        .await?;
        self.store
            .store_embedding_if_absent(record.id, &computed)
            .await
    }

    async fn notify(&self, org_id: Uuid, anomaly: &Anomaly) {
        let payload = json!({
            "ad_id": anomaly.record_id,
            "brand": anomaly.brand,
            "reason": anomaly.reason,
            "score": anomaly.score,
        });
        let sent = bounded(
            "webhook",
            self.settings.call_timeout,
            self.webhooks.notify(org_id, ANOMALY_EVENT, payload),
        )
        .await;
        if let Err(e) = sent {
            tracing::warn!(record_id = %anomaly.record_id, org_id = %org_id, error = %e, "anomaly: webhook notification failed");
        }
    }
}

fn drift_reason(brand: &str, score: f64) -> String {
    format!(
        "Strategic pivot: creative is {:.1}% dissimilar to {brand}'s recent centroid",
        score * 100.0
    )
}

fn log_evaluation(record_id: Uuid, brand: &str, evaluation: &Evaluation) {
    match evaluation {
        Evaluation::Anomalous(a) => {
            tracing::info!(record_id = %record_id, brand = %brand, score = a.score, "anomaly: flagged");
        }
        Evaluation::Nominal { similarity } => {
            tracing::debug!(record_id = %record_id, brand = %brand, similarity, "anomaly: nominal");
        }
        Evaluation::InsufficientHistory { available } => {
            tracing::debug!(record_id = %record_id, brand = %brand, available, "anomaly: insufficient history");
        }
        Evaluation::Undefined => {
            tracing::warn!(record_id = %record_id, brand = %brand, "anomaly: zero-magnitude vector, similarity undefined");
        }
    }
}

/// Brand groups in first-seen order; members keep their input index.
/// Members are owned; group futures borrow nothing from `records`.
fn group_by_brand(records: &[Record]) -> Vec<(String, Vec<(usize, Record)>)> {
    let mut groups: Vec<(String, Vec<(usize, Record)>)> = Vec::new();
    let mut slots: HashMap<&str, usize> = HashMap::new();
    for (index, record) in records.iter().enumerate() {
        let Some(brand) = record.brand_key() else {
            continue;
        };
        let slot = *slots.entry(brand).or_insert_with(|| {
            groups.push((brand.to_string(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push((index, record.clone()));
    }
    for (_, members) in &mut groups {
        members.sort_by_key(|(index, r)| (r.created_at, *index));
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{brand_record, record_at, FakeEmbedder, MemoryStore, RecordingWebhooks};
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap()
    }

    fn seed_acme_history(store: &MemoryStore) {
        for (i, v) in [vec![1.0, 0.0], vec![0.9, 0.1], vec![0.95, 0.05]]
            .into_iter()
            .enumerate()
        {
            let days = i64::try_from(i).unwrap();
            store.insert(brand_record("Acme", t0() + ChronoDuration::days(days), Some(v)));
        }
    }

    fn settings() -> DetectorSettings {
        DetectorSettings {
            concurrency: 4,
            call_timeout: Duration::from_millis(200),
            deadline: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn acme_pivot_is_flagged() {
        let store = MemoryStore::default();
        seed_acme_history(&store);
        let mut fresh = brand_record("Acme", t0() + ChronoDuration::days(10), Some(vec![0.0, 1.0]));
        let org = Uuid::new_v4();
        fresh.org_id = Some(org);
        store.insert(fresh.clone());

        let embedder = FakeEmbedder::failing();
        let hooks = RecordingWebhooks::default();
        let detector = AnomalyDetector::new(&store, &embedder, &hooks, settings());
        let summary = detector.run(std::slice::from_ref(&fresh)).await;

        assert_eq!(summary.evaluated, 1);
        assert_eq!(summary.anomalies.len(), 1);
        let anomaly = &summary.anomalies[0];
        assert!(anomaly.similarity < SIMILARITY_THRESHOLD);
        assert!((anomaly.score - 0.947).abs() < 1e-2, "score {}", anomaly.score);
        assert!(anomaly.reason.contains("Acme"));

        let flag = store.flag(fresh.id).expect("flag persisted");
        assert!((flag.score - anomaly.score).abs() < f64::EPSILON);
        assert_eq!(embedder.calls(), 0, "stored embedding is reused");

        let deliveries = hooks.deliveries();
        assert_eq!(deliveries.len(), 1);
        let (org_id, event, payload) = &deliveries[0];
        assert_eq!(*org_id, org);
        assert_eq!(event, ANOMALY_EVENT);
        assert_eq!(payload["ad_id"], json!(fresh.id));
        assert_eq!(payload["brand"], "Acme");
        assert!(payload["reason"].is_string());
        assert!(payload["score"].is_f64());
    }

    #[tokio::test]
    async fn similar_creative_is_nominal() {
        let store = MemoryStore::default();
        seed_acme_history(&store);
        let fresh = brand_record("Acme", t0() + ChronoDuration::days(10), Some(vec![0.97, 0.03]));
        store.insert(fresh.clone());

        let embedder = FakeEmbedder::default();
        let hooks = RecordingWebhooks::default();
        let detector = AnomalyDetector::new(&store, &embedder, &hooks, settings());
        let evaluation = detector.evaluate("Acme", &fresh).await.unwrap();
        assert!(matches!(evaluation, Evaluation::Nominal { similarity } if similarity > 0.99));
        assert_eq!(store.flag_count(), 0);
        assert!(hooks.deliveries().is_empty());
    }

    #[tokio::test]
    async fn short_history_never_flags() {
        let store = MemoryStore::default();
        store.insert(brand_record("Acme", t0(), Some(vec![1.0, 0.0])));
        store.insert(brand_record("Acme", t0() + ChronoDuration::days(1), Some(vec![1.0, 0.0])));
        let fresh = brand_record("Acme", t0() + ChronoDuration::days(2), Some(vec![0.0, 1.0]));
        store.insert(fresh.clone());

        let embedder = FakeEmbedder::default();
        let hooks = RecordingWebhooks::default();
        let detector = AnomalyDetector::new(&store, &embedder, &hooks, settings());
        let summary = detector.run(std::slice::from_ref(&fresh)).await;

        assert_eq!(summary.skipped, 1);
        assert!(summary.anomalies.is_empty());
        assert_eq!(store.flag_count(), 0);
    }

    #[tokio::test]
    async fn missing_embedding_is_computed_and_stored_once() {
        let store = MemoryStore::default();
        seed_acme_history(&store);
        let fresh = brand_record("Acme", t0() + ChronoDuration::days(10), None);
        store.insert(fresh.clone());

        let embedder = FakeEmbedder::returning(vec![0.96, 0.04]);
        let hooks = RecordingWebhooks::default();
        let detector = AnomalyDetector::new(&store, &embedder, &hooks, settings());
        detector.evaluate("Acme", &fresh).await.unwrap();
        detector.evaluate("Acme", &fresh).await.unwrap();

        assert_eq!(embedder.calls(), 2);
        assert_eq!(store.embedding_writes(), 1);
        assert_eq!(store.record(fresh.id).unwrap().embedding, Some(vec![0.96, 0.04]));
    }

    #[tokio::test]
    async fn embedding_failure_skips_only_that_record() {
        let store = MemoryStore::default();
        seed_acme_history(&store);
        let unembedded = brand_record("Acme", t0() + ChronoDuration::days(10), None);
        let embedded = brand_record("Acme", t0() + ChronoDuration::days(11), Some(vec![0.0, 1.0]));
        store.insert(unembedded.clone());
        store.insert(embedded.clone());

        let embedder = FakeEmbedder::failing();
        let hooks = RecordingWebhooks::default();
        let detector = AnomalyDetector::new(&store, &embedder, &hooks, settings());
        let summary = detector.run(&[unembedded, embedded.clone()]).await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.anomalies.len(), 1);
        assert_eq!(summary.anomalies[0].record_id, embedded.id);
    }

    #[tokio::test]
    async fn dimension_mismatch_fails_the_record() {
        let store = MemoryStore::default();
        seed_acme_history(&store);
        let fresh = brand_record("Acme", t0() + ChronoDuration::days(10), Some(vec![0.0, 1.0, 0.0]));
        store.insert(fresh.clone());

        let embedder = FakeEmbedder::default();
        let hooks = RecordingWebhooks::default();
        let detector = AnomalyDetector::new(&store, &embedder, &hooks, settings());
        let err = detector.evaluate("Acme", &fresh).await.unwrap_err();
        assert!(err.is_contract_violation());

        let summary = detector.run(&[fresh]).await;
        assert_eq!(summary.failed, 1);
        assert_eq!(store.flag_count(), 0);
    }

    #[tokio::test]
    async fn webhook_requires_an_organization() {
        let store = MemoryStore::default();
        seed_acme_history(&store);
        let fresh = brand_record("Acme", t0() + ChronoDuration::days(10), Some(vec![0.0, 1.0]));
        store.insert(fresh.clone());

        let embedder = FakeEmbedder::default();
        let hooks = RecordingWebhooks::default();
        let detector = AnomalyDetector::new(&store, &embedder, &hooks, settings());
        let summary = detector.run(&[fresh]).await;
        assert_eq!(summary.anomalies.len(), 1);
        assert!(hooks.deliveries().is_empty());
    }

    #[tokio::test]
    async fn webhook_failure_keeps_the_verdict() {
        let store = MemoryStore::default();
        seed_acme_history(&store);
        let mut fresh = brand_record("Acme", t0() + ChronoDuration::days(10), Some(vec![0.0, 1.0]));
        fresh.org_id = Some(Uuid::new_v4());
        store.insert(fresh.clone());

        let embedder = FakeEmbedder::default();
        let hooks = RecordingWebhooks::failing();
        let detector = AnomalyDetector::new(&store, &embedder, &hooks, settings());
        let summary = detector.run(std::slice::from_ref(&fresh)).await;
        assert_eq!(summary.anomalies.len(), 1);
        assert_eq!(summary.failed, 0);
        assert!(store.flag(fresh.id).is_some());
    }

    #[tokio::test]
    async fn unbranded_records_are_not_eligible() {
        let store = MemoryStore::default();
        let record = record_at(t0(), json!({ "classification": { "trigger_mechanic": "Authority" } }));
        store.insert(record.clone());

        let embedder = FakeEmbedder::returning(vec![1.0, 0.0]);
        let hooks = RecordingWebhooks::default();
        let detector = AnomalyDetector::new(&store, &embedder, &hooks, settings());
        let summary = detector.run(&[record]).await;
        assert_eq!(summary, DetectionSummary::default());
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_embedding_times_out() {
        let store = MemoryStore::default();
        seed_acme_history(&store);
        let fresh = brand_record("Acme", t0() + ChronoDuration::days(10), None);
        store.insert(fresh.clone());

        let embedder = FakeEmbedder::returning(vec![0.0, 1.0]).with_delay(Duration::from_secs(30));
        let hooks = RecordingWebhooks::default();
        let detector = AnomalyDetector::new(&store, &embedder, &hooks, settings());
        let err = detector.evaluate("Acme", &fresh).await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout { operation: "embedding", .. }));
        assert_eq!(store.embedding_writes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pass_deadline_leaves_remaining_records_unfinished() {
        let store = MemoryStore::default();
        seed_acme_history(&store);
        let mut pending = Vec::new();
        for i in 0..3 {
            let record = brand_record("Acme", t0() + ChronoDuration::days(10 + i), None);
            store.insert(record.clone());
            pending.push(record);
        }

        let embedder = FakeEmbedder::returning(vec![0.0, 1.0]).with_delay(Duration::from_secs(3));
        let hooks = RecordingWebhooks::default();
        let detector = AnomalyDetector::new(
            &store,
            &embedder,
            &hooks,
            DetectorSettings {
                concurrency: 1,
                call_timeout: Duration::from_secs(10),
                deadline: Duration::from_secs(5),
            },
        );
        let summary = detector.run(&pending).await;
        assert_eq!(summary.evaluated, 1);
        assert_eq!(summary.unfinished, 2);
    }

    #[tokio::test]
    async fn anomalies_come_back_in_input_order() {
        let store = MemoryStore::default();
        let mut batch = Vec::new();
        for brand in ["Zeta", "Acme", "Mid"] {
            for (i, v) in [vec![1.0, 0.0], vec![0.9, 0.1], vec![0.95, 0.05]]
                .into_iter()
                .enumerate()
            {
                let days = i64::try_from(i).unwrap();
                store.insert(brand_record(brand, t0() + ChronoDuration::days(days), Some(v)));
            }
            let fresh = brand_record(brand, t0() + ChronoDuration::days(10), Some(vec![0.0, 1.0]));
            store.insert(fresh.clone());
            batch.push(fresh);
        }

        let embedder = FakeEmbedder::default();
        let hooks = RecordingWebhooks::default();
        let detector = AnomalyDetector::new(&store, &embedder, &hooks, settings());
        let summary = detector.run(&batch).await;
        let brands: Vec<&str> = summary.anomalies.iter().map(|a| a.brand.as_str()).collect();
        assert_eq!(brands, vec!["Zeta", "Acme", "Mid"]);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn detection_future_is_send() {
        let store = MemoryStore::default();
        let embedder = FakeEmbedder::default();
        let hooks = RecordingWebhooks::default();
        let detector = AnomalyDetector::new(&store, &embedder, &hooks, settings());
        let records = vec![brand_record("Acme", t0(), None)];
        let fut = detector.run(&records);
        assert_send(&fut);
    }

    #[tokio::test]
    async fn centroid_uses_only_the_newest_history() {
        let store = MemoryStore::default();
        // Two oldest vectors would pull the centroid toward the fresh creative.
        for day in 0..2 {
            store.insert(brand_record("Acme", t0() + ChronoDuration::days(day), Some(vec![0.0, 10.0])));
        }
        for day in 2..12 {
            store.insert(brand_record("Acme", t0() + ChronoDuration::days(day), Some(vec![1.0, 0.0])));
        }
        let fresh = brand_record("Acme", t0() + ChronoDuration::days(20), Some(vec![0.8, 0.6]));
        store.insert(fresh.clone());

        let embedder = FakeEmbedder::default();
        let hooks = RecordingWebhooks::default();
        let detector = AnomalyDetector::new(&store, &embedder, &hooks, settings());
        let evaluation = detector.evaluate("Acme", &fresh).await.unwrap();

        // Newest ten average to [1, 0]; all twelve would give ~0.894 and pass.
        let Evaluation::Anomalous(anomaly) = evaluation else {
            panic!("expected an anomaly, got {evaluation:?}");
        };
        assert!((anomaly.similarity - 0.8).abs() < 1e-6, "similarity {}", anomaly.similarity);
        assert!((anomaly.score - 0.2).abs() < 1e-6);
        assert!(store.flag(fresh.id).is_some());
    }

    #[test]
    fn groups_follow_first_seen_brand_order() {
        let a = brand_record("A", t0() + ChronoDuration::days(2), None);
        let b = brand_record("B", t0(), None);
        let a_old = brand_record("A", t0(), None);
        let records = vec![a, b, a_old.clone()];
        let groups = group_by_brand(&records);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "A");
        assert_eq!(groups[0].1[0].1.id, a_old.id, "oldest first within a brand");
    }
}
