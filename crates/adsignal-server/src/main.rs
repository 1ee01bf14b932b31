mod api;
mod middleware;

use std::sync::Arc;

use adsignal_clients::{EmbeddingClient, NarrativeClient, WebhookDispatcher};
use adsignal_db::PgStore;
use adsignal_engine::DetectorSettings;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = adsignal_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = adsignal_db::PoolConfig::from_app_config(&config);
    let pool = adsignal_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = adsignal_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations up to date");

    let store = Arc::new(PgStore::new(pool.clone()));
    let state = AppState {
        records: store.clone(),
        reports: store,
        embedder: Arc::new(EmbeddingClient::from_app_config(&config)?),
        webhooks: Arc::new(WebhookDispatcher::new(
            pool.clone(),
            config.external_timeout_secs,
        )?),
        narrator: Arc::new(NarrativeClient::from_app_config(&config)?),
        detector: DetectorSettings::from_app_config(&config),
        pool: Some(pool),
    };

    let auth = AuthState::from_env(matches!(
        config.env,
        adsignal_core::Environment::Development
    ))?;
    let app = build_app(state, auth, default_rate_limit_state());

    tracing::info!(bind_addr = %config.bind_addr, env = %config.env, "adsignal-server listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
