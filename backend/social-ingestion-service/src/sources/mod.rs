//! Platform adapters.
//!
//! Each adapter owns its own authentication and returns posts already
//! normalized into [`Post`]. Adapters report failures as [`SourceError`]; the
//! runner logs them and counts the source as empty for that pass.

pub mod bluesky;
pub mod telegram;

use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;
use thiserror::Error;

use crate::models::Post;

pub use bluesky::BlueskySource;
pub use telegram::TelegramSource;

pub const TELEGRAM: &str = "telegram";
pub const BLUESKY: &str = "bluesky";

/// Every source name that may appear in a fingerprint.
pub const REGISTERED_SOURCES: &[&str] = &[TELEGRAM, BLUESKY];

/// Longest response body kept in an error message.
const MAX_ERROR_BODY: usize = 256;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        // Request URLs can carry credentials (the bot token is in the path).
        let err = err.without_url();
        if err.is_decode() {
            SourceError::Decode(err.to_string())
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable platform name; part of every fingerprint.
    fn name(&self) -> &'static str;

    /// Recent posts in platform order.
    async fn fetch_posts(&self) -> Result<Vec<Post>, SourceError>;
}

/// HTTP client shared by adapters; `timeout` bounds each request end to end.
pub fn http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("social-ingestion-service/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Turn a non-2xx response into [`SourceError::Api`].
pub(crate) async fn ensure_success(resp: Response) -> Result<Response, SourceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let mut message = resp.text().await.unwrap_or_default();
    if message.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }

    Err(SourceError::Api {
        status: status.as_u16(),
        message,
    })
}
