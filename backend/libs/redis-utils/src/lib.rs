use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{Client, IntoConnectionInfo, RedisError};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Failure of a single bounded Redis command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("redis command failed: {0}")]
    Redis(#[from] RedisError),

    #[error("redis command timed out after {0:?}")]
    Timeout(Duration),
}

/// Redis connection pool backed by a single auto-reconnecting manager.
///
/// The manager is created on first use, not at construction, so a cache that
/// is down at startup only degrades the commands issued while it stays down.
pub struct RedisPool {
    client: Client,
    manager: Mutex<Option<ConnectionManager>>,
    endpoint: String,
}

impl RedisPool {
    /// Parse the URL and build the client without dialing.
    pub fn open(redis_url: &str) -> Result<Self> {
        let info = redis_url
            .into_connection_info()
            .context("failed to parse REDIS_URL connection string")?;
        let endpoint = info.addr.to_string();

        let client = Client::open(info).context("failed to construct Redis client")?;

        Ok(Self {
            client,
            manager: Mutex::new(None),
            endpoint,
        })
    }

    /// Open and dial at once, for callers that cannot do anything useful
    /// without the cache.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let pool = Self::open(redis_url)?;
        pool.connection()
            .await
            .with_context(|| format!("failed to connect to Redis at {}", pool.endpoint))?;
        Ok(pool)
    }

    /// The shared connection manager, establishing it if this is the first
    /// successful call. A failed attempt is retried by the next caller.
    pub async fn connection(&self) -> Result<ConnectionManager, RedisError> {
        let mut slot = self.manager.lock().await;
        if let Some(manager) = slot.as_ref() {
            return Ok(manager.clone());
        }

        match ConnectionManager::new(self.client.clone()).await {
            Ok(manager) => {
                info!(endpoint = %self.endpoint, "Redis connection manager ready");
                *slot = Some(manager.clone());
                Ok(manager)
            }
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "Redis connection attempt failed");
                Err(e)
            }
        }
    }

    /// Host and port of the configured node, without credentials.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Run one Redis command, giving up after `limit`.
///
/// The connection manager reconnects lazily, so a dead node otherwise shows up
/// as a hang rather than an error.
pub async fn with_timeout_of<F, T>(limit: Duration, future: F) -> Result<T, CommandError>
where
    F: Future<Output = Result<T, RedisError>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result.map_err(CommandError::from),
        Err(_) => Err(CommandError::Timeout(limit)),
    }
}
