use thiserror::Error;

use crate::config::ConfigError;
use crate::services::publisher::PublishError;

/// Startup-time failures. Anything returned from here ends the process.
///
/// Steady-state failures never reach this type: sources, the dedup store and
/// the publisher each degrade locally and the runner only logs them.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache connection error: {0}")]
    Cache(String),

    #[error("Broker error: {0}")]
    Broker(#[from] PublishError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IngestionError>;
