use std::env::VarError;
use std::fmt::Display;
use std::str::FromStr;

use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Upper bound for the anomaly worker pool.
const MAX_ANOMALY_CONCURRENCY: usize = 8;

/// Load `.env` (if present) and then the process environment.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Same as [`load_app_config`] without touching `.env`.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

type Lookup<'a> = dyn Fn(&str) -> Result<String, VarError> + 'a;

fn or_default(lookup: &Lookup<'_>, var: &str, default: &str) -> String {
    lookup(var).unwrap_or_else(|_| default.to_string())
}

/// Parse `var` (or `default` when unset) into any `FromStr` type.
fn parse_var<T>(lookup: &Lookup<'_>, var: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    or_default(lookup, var, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
}

/// Pure parsing over an env lookup, so tests can feed a `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let lookup: &Lookup<'_> = &lookup;
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };
    let text = |var: &str, default: &str| or_default(lookup, var, default);

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&text("ADSIGNAL_ENV", "development"));
    let bind_addr = parse_var(lookup, "ADSIGNAL_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = text("ADSIGNAL_LOG_LEVEL", "info");

    let db_max_connections = parse_var::<u32>(lookup, "ADSIGNAL_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_var::<u32>(lookup, "ADSIGNAL_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_var::<u64>(lookup, "ADSIGNAL_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let embedding_url = text("ADSIGNAL_EMBEDDING_URL", "https://api.openai.com/v1");
    let embedding_model = text("ADSIGNAL_EMBEDDING_MODEL", "text-embedding-3-small");
    let embedding_dim = parse_var::<usize>(lookup, "ADSIGNAL_EMBEDDING_DIM", "1536")?;
    if embedding_dim == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "ADSIGNAL_EMBEDDING_DIM".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    let narrative_url = text("ADSIGNAL_NARRATIVE_URL", "https://api.openai.com/v1");
    let narrative_model = text("ADSIGNAL_NARRATIVE_MODEL", "gpt-4o");
    let openai_api_key = lookup("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());

    let external_timeout_secs = parse_var::<u64>(lookup, "ADSIGNAL_EXTERNAL_TIMEOUT_SECS", "20")?;
    let pass_deadline_secs = parse_var::<u64>(lookup, "ADSIGNAL_PASS_DEADLINE_SECS", "240")?;
    let anomaly_concurrency = parse_var::<usize>(lookup, "ADSIGNAL_ANOMALY_CONCURRENCY", "4")?
        .clamp(1, MAX_ANOMALY_CONCURRENCY);
    let max_retries = parse_var::<u32>(lookup, "ADSIGNAL_MAX_RETRIES", "2")?;
    let retry_backoff_base_ms = parse_var::<u64>(lookup, "ADSIGNAL_RETRY_BACKOFF_BASE_MS", "500")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        embedding_url,
        embedding_model,
        embedding_dim,
        narrative_url,
        narrative_model,
        openai_api_key,
        external_timeout_secs,
        pass_deadline_secs,
        anomaly_concurrency,
        max_retries,
        retry_backoff_base_ms,
    })
}

/// Unrecognized values fall back to development.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
