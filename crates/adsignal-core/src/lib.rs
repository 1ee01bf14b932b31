//! Shared domain types and configuration for the adsignal workspace.

pub mod app_config;
pub mod config;
pub mod fields;
pub mod record;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use fields::{FieldDescriptor, FieldKind, PULSE_FIELDS, RADAR_FIELDS};
pub use record::{Classification, Digest, Exemplar, Meta, Record, RecordStatus, Strategy};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
