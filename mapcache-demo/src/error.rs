//! Error types for the demo binary

use mapcache_core::{ConfigError, MapCacheError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DemoError {
    #[error("Cache error: {0}")]
    Cache(#[from] MapCacheError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to initialize logging: {0}")]
    Telemetry(String),

    #[error("Scenario step '{step}' failed: expected {expected}, got {actual}")]
    Scenario {
        step: &'static str,
        expected: String,
        actual: String,
    },
}

pub type DemoResult<T> = Result<T, DemoError>;
