//! Radar and pulse commands, printed as pretty JSON on stdout.

use adsignal_clients::{EmbeddingClient, NarrativeClient, WebhookDispatcher};
use adsignal_core::AppConfig;
use adsignal_db::PgStore;
use adsignal_engine::{
    run_pulse, run_radar, DetectorSettings, PulseServices, RadarParams, ReportStore,
};
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) async fn run_radar_command(
    pool: &PgPool,
    days: Option<i64>,
    category: Option<String>,
    top: Option<i64>,
) -> anyhow::Result<()> {
    let store = PgStore::new(pool.clone());
    let params = RadarParams::new(days, category, top);
    let report = run_radar(&store, &params, Utc::now()).await?;
    print_json(&report)
}

/// Intended for an external weekly cron.
pub(crate) async fn run_pulse_command(config: &AppConfig, pool: &PgPool) -> anyhow::Result<()> {
    let store = PgStore::new(pool.clone());
    let embedder = EmbeddingClient::from_app_config(config)?;
    let webhooks = WebhookDispatcher::new(pool.clone(), config.external_timeout_secs)?;
    let narrator = NarrativeClient::from_app_config(config)?;

    let services = PulseServices {
        records: &store,
        reports: &store,
        embedder: &embedder,
        webhooks: &webhooks,
        narrator: &narrator,
    };
    let started = std::time::Instant::now();
    let response = run_pulse(services, DetectorSettings::from_app_config(config), Utc::now()).await?;
    tracing::info!(
        ad_count = response.ad_count,
        anomalies = response.anomalies_detected,
        elapsed_ms = started.elapsed().as_millis(),
        "pulse: pass finished"
    );
    print_json(&response)
}

pub(crate) async fn run_reports_command(pool: &PgPool, limit: i64) -> anyhow::Result<()> {
    let store = PgStore::new(pool.clone());
    let reports = store.recent_pulse_reports(limit.clamp(1, 100)).await?;
    print_json(&reports)
}
