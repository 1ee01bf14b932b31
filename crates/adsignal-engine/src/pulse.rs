//! Weekly pulse: surges, anomalies and a synthesized narrative, appended as
//! one immutable report per invocation.

use adsignal_core::{Record, PULSE_FIELDS};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::aggregate;
use crate::anomaly::{Anomaly, AnomalyDetector, DetectorSettings};
use crate::error::{bounded, EngineError};
use crate::store::{
    EmbeddingService, NarrativeSynthesizer, NewPulseReport, RecordQuery, RecordStore,
    ReportStore, WebhookSink,
};
use crate::surge::{detect_surges, Surge};
use crate::window::{Bucket, WindowPair};

pub const EMPTY_PULSE_REPORT: &str = "No new ads to synthesize.";
pub const NARRATIVE_UNAVAILABLE: &str =
    "Narrative synthesis is unavailable for this pulse. Surges and anomalies are listed below.";

/// Everything a pulse pass talks to.
#[derive(Clone, Copy)]
pub struct PulseServices<'a> {
    pub records: &'a dyn RecordStore,
    pub reports: &'a dyn ReportStore,
    pub embedder: &'a dyn EmbeddingService,
    pub webhooks: &'a dyn WebhookSink,
    pub narrator: &'a dyn NarrativeSynthesizer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseResponse {
    pub date: DateTime<Utc>,
    pub ad_count: usize,
    pub anomalies_detected: usize,
    pub report: String,
    pub surges: Vec<Surge>,
}

/// Run one pulse pass ending at `now`.
///
/// # Errors
///
/// Store reads and the final report append abort the pass. Embedding,
/// webhook and narrative failures do not.
pub async fn run_pulse(
    services: PulseServices<'_>,
    settings: DetectorSettings,
    now: DateTime<Utc>,
) -> Result<PulseResponse, EngineError> {
    let windows = WindowPair::pulse(now);
    let records = services
        .records
        .processed_records(&RecordQuery {
            since: windows.start(),
            until: windows.end(),
            category: None,
        })
        .await?;

    let aggregation = aggregate(&records, &PULSE_FIELDS, &windows);
    let surges = detect_surges(&aggregation);

    let recent: Vec<Record> = records
        .into_iter()
        .filter(|r| windows.bucket(r.created_at) == Some(Bucket::Recent))
        .collect();
    tracing::info!(
        recent = recent.len(),
        baseline = aggregation.totals.baseline,
        surges = surges.len(),
        "pulse: aggregated"
    );

    let detector = AnomalyDetector::new(
        services.records,
        services.embedder,
        services.webhooks,
        settings,
    );
    let detection = detector.run(&recent).await;

    let report = if recent.is_empty() {
        EMPTY_PULSE_REPORT.to_string()
    } else {
        let context = narrative_context(&recent, &surges, &detection.anomalies);
        match bounded(
            "narrative",
            settings.call_timeout,
            services.narrator.synthesize(&context),
        )
        .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "pulse: narrative synthesis failed, using fallback");
                fallback_report(&surges, &detection.anomalies)
            }
        }
    };

    let stored = services
        .reports
        .append_pulse_report(&NewPulseReport {
            report_text: report.clone(),
            ad_count: recent.len(),
            anomalies_detected: detection.anomalies.len(),
            surges: surges.clone(),
        })
        .await?;
    tracing::info!(
        report_id = stored.id,
        ad_count = recent.len(),
        anomalies = detection.anomalies.len(),
        "pulse: report appended"
    );

    Ok(PulseResponse {
        date: now,
        ad_count: recent.len(),
        anomalies_detected: detection.anomalies.len(),
        report,
        surges,
    })
}

/// Prompt body for the narrator: one line per recent ad, then the signals.
#[must_use]
pub fn narrative_context(recent: &[Record], surges: &[Surge], anomalies: &[Anomaly]) -> String {
    let mut out = String::from("Ads from the last 7 days:\n");
    for record in recent {
        out.push_str(&format!(
            "Brand: {} | Trigger: {} | Position: {}\n",
            record.brand_key().unwrap_or("Unknown"),
            record
                .digest
                .classification
                .trigger_mechanic
                .as_deref()
                .unwrap_or("n/a"),
            record
                .digest
                .strategy
                .positioning_claim
                .as_deref()
                .unwrap_or("n/a"),
        ));
    }
    write_signals(&mut out, surges, anomalies);
    out
}

fn fallback_report(surges: &[Surge], anomalies: &[Anomaly]) -> String {
    let mut out = String::from(NARRATIVE_UNAVAILABLE);
    out.push('\n');
    write_signals(&mut out, surges, anomalies);
    out
}

fn write_signals(out: &mut String, surges: &[Surge], anomalies: &[Anomaly]) {
    if !surges.is_empty() {
        out.push_str("\nSurging signals:\n");
        for s in surges {
            out.push_str(&format!(
                "- {} \"{}\": {} this week vs {:.1}/week baseline (+{}%)\n",
                s.label, s.value, s.recent_count, s.baseline_weekly, s.increase
            ));
        }
    }
    if !anomalies.is_empty() {
        out.push_str("\nStrategic anomalies:\n");
        for a in anomalies {
            out.push_str(&format!("- {}: {}\n", a.brand, a.reason));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        brand_record, record_at, FakeEmbedder, FakeNarrator, MemoryStore, RecordingWebhooks,
    };
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 8, 6, 0, 0).unwrap()
    }

    fn services<'a>(
        store: &'a MemoryStore,
        embedder: &'a FakeEmbedder,
        hooks: &'a RecordingWebhooks,
        narrator: &'a FakeNarrator,
    ) -> PulseServices<'a> {
        PulseServices {
            records: store,
            reports: store,
            embedder,
            webhooks: hooks,
            narrator,
        }
    }

    #[tokio::test]
    async fn empty_week_appends_placeholder_report() {
        let store = MemoryStore::default();
        let embedder = FakeEmbedder::default();
        let hooks = RecordingWebhooks::default();
        let narrator = FakeNarrator::replying("unused");

        let response = run_pulse(
            services(&store, &embedder, &hooks, &narrator),
            DetectorSettings::default(),
            now(),
        )
        .await
        .unwrap();

        assert_eq!(response.report, EMPTY_PULSE_REPORT);
        assert_eq!((response.ad_count, response.anomalies_detected), (0, 0));
        assert!(narrator.contexts().is_empty());
        let reports = store.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].report_text, EMPTY_PULSE_REPORT);
    }

    #[tokio::test]
    async fn pulse_combines_surges_anomalies_and_narrative() {
        let store = MemoryStore::default();
        let windows = WindowPair::pulse(now());
        for i in 0..6 {
            store.insert(record_at(
                windows.cutoff() + Duration::hours(i),
                json!({ "classification": { "trigger_mechanic": "Authority" } }),
            ));
        }
        for i in 0..12 {
            store.insert(record_at(
                windows.start() + Duration::hours(i),
                json!({ "classification": { "trigger_mechanic": "Authority" } }),
            ));
        }
        for (i, v) in [vec![1.0, 0.0], vec![0.9, 0.1], vec![0.95, 0.05]]
            .into_iter()
            .enumerate()
        {
            let hours = i64::try_from(i).unwrap();
            store.insert(brand_record("Acme", windows.start() + Duration::hours(hours), Some(v)));
        }
        store.insert(brand_record(
            "Acme",
            windows.cutoff() + Duration::hours(20),
            Some(vec![0.0, 1.0]),
        ));

        let embedder = FakeEmbedder::default();
        let hooks = RecordingWebhooks::default();
        let narrator = FakeNarrator::replying("## Authority is everywhere");

        let response = run_pulse(
            services(&store, &embedder, &hooks, &narrator),
            DetectorSettings::default(),
            now(),
        )
        .await
        .unwrap();

        assert_eq!(response.ad_count, 7);
        assert_eq!(response.anomalies_detected, 1);
        assert_eq!(response.report, "## Authority is everywhere");
        let authority = response
            .surges
            .iter()
            .find(|s| s.value == "Authority")
            .expect("authority surge");
        // 7 recent (6 + the Acme ad) against 15 baseline (12 + 3 Acme history).
        assert_eq!((authority.recent_count, authority.baseline_count), (7, 15));
        assert_eq!(authority.increase, 40);

        let contexts = narrator.contexts();
        assert_eq!(contexts.len(), 1);
        assert!(contexts[0].starts_with("Ads from the last 7 days:\n"));
        assert!(contexts[0].contains("Brand: Acme | Trigger: Authority | Position: Clinically proven"));
        assert!(contexts[0].contains("Strategic anomalies:"));

        let reports = store.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].ad_count, 7);
        assert_eq!(reports[0].anomalies_detected, 1);
        assert_eq!(reports[0].surges[0]["value"], "Authority");
    }

    #[tokio::test]
    async fn narrative_failure_falls_back() {
        let store = MemoryStore::default();
        let windows = WindowPair::pulse(now());
        for i in 0..3 {
            store.insert(record_at(
                windows.cutoff() + Duration::hours(i),
                json!({ "classification": { "narrative_framework": "Problem_Agitation_Solution" } }),
            ));
        }
        let embedder = FakeEmbedder::default();
        let hooks = RecordingWebhooks::default();
        let narrator = FakeNarrator::failing();

        let response = run_pulse(
            services(&store, &embedder, &hooks, &narrator),
            DetectorSettings::default(),
            now(),
        )
        .await
        .unwrap();

        assert!(response.report.starts_with(NARRATIVE_UNAVAILABLE));
        assert!(response.report.contains("Problem_Agitation_Solution"));
        assert_eq!(store.reports().len(), 1);
    }

    #[tokio::test]
    async fn store_read_failure_aborts_without_report() {
        let store = MemoryStore::default();
        store.fail_reads(true);
        let embedder = FakeEmbedder::default();
        let hooks = RecordingWebhooks::default();
        let narrator = FakeNarrator::replying("unused");

        let err = run_pulse(
            services(&store, &embedder, &hooks, &narrator),
            DetectorSettings::default(),
            now(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
        assert!(store.reports().is_empty());
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn pulse_future_is_send() {
        let store = MemoryStore::default();
        let embedder = FakeEmbedder::default();
        let hooks = RecordingWebhooks::default();
        let narrator = FakeNarrator::replying("unused");
        let fut = run_pulse(
            services(&store, &embedder, &hooks, &narrator),
            DetectorSettings::default(),
            now(),
        );
        assert_send(&fut);
    }

    #[test]
    fn response_serializes_camel_case() {
        let response = PulseResponse {
            date: now(),
            ad_count: 2,
            anomalies_detected: 1,
            report: "ok".to_string(),
            surges: Vec::new(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["adCount"], 2);
        assert_eq!(json["anomaliesDetected"], 1);
        assert!(json["date"].is_string());
        assert!(json["surges"].as_array().unwrap().is_empty());
    }
}
