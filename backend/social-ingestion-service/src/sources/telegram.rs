use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{ensure_success, SourceAdapter, SourceError, TELEGRAM};
use crate::config::TelegramConfig;
use crate::models::Post;

const POST_ID_PREFIX: &str = "tg";

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    #[serde(default = "default_ok")]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Vec<Update>,
}

fn default_ok() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct Update {
    #[serde(default)]
    channel_post: Option<ChannelPost>,
}

#[derive(Debug, Deserialize)]
struct ChannelPost {
    message_id: i64,
    #[serde(default)]
    text: Option<String>,
    date: i64,
    chat: Chat,
}

#[derive(Debug, Deserialize)]
struct Chat {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    username: Option<String>,
}

/// Bot API adapter reading channel posts from `getUpdates`.
///
/// No update offset is kept, so every call can return updates seen before.
/// Downstream dedup is what keeps repeats from being dispatched twice.
pub struct TelegramSource {
    client: Client,
    config: TelegramConfig,
}

impl TelegramSource {
    pub fn new(client: Client, config: TelegramConfig) -> Self {
        Self { client, config }
    }

    fn updates_url(&self) -> String {
        format!(
            "{}/bot{}/getUpdates",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }

    fn channel_allowed(&self, username: &str) -> bool {
        self.config.channels.is_empty()
            || self
                .config
                .channels
                .iter()
                .any(|c| c.eq_ignore_ascii_case(username))
    }

    fn normalize(&self, update: Update) -> Option<Post> {
        let post = update.channel_post?;
        let text = post.text.filter(|t| !t.is_empty())?;
        let username = post.chat.username.unwrap_or_default();

        if !self.channel_allowed(&username) {
            debug!(channel = %username, "Skipping post from channel outside allow-list");
            return None;
        }

        let Some(posted_at) = DateTime::from_timestamp(post.date, 0) else {
            debug!(
                message_id = post.message_id,
                date = post.date,
                "Skipping post with out-of-range date"
            );
            return None;
        };
        let timestamp = posted_at.to_rfc3339_opts(SecondsFormat::Secs, true);

        Some(Post {
            id: format!("{}-{}", POST_ID_PREFIX, post.message_id),
            url: message_url(&username, post.chat.id, post.message_id),
            author: username,
            text,
            timestamp,
        })
    }
}

/// Public link for a channel message. Channels without a username only have
/// the numeric `t.me/c/` form.
fn message_url(username: &str, chat_id: i64, message_id: i64) -> String {
    if username.is_empty() {
        let chat = chat_id.to_string();
        let internal = chat.trim_start_matches("-100");
        format!("https://t.me/c/{}/{}", internal, message_id)
    } else {
        format!("https://t.me/{}/{}", username, message_id)
    }
}

#[async_trait]
impl SourceAdapter for TelegramSource {
    fn name(&self) -> &'static str {
        TELEGRAM
    }

    async fn fetch_posts(&self) -> Result<Vec<Post>, SourceError> {
        let resp = self.client.get(self.updates_url()).send().await?;
        let resp = ensure_success(resp).await?;
        let body: UpdatesResponse = resp.json().await?;

        if !body.ok {
            return Err(SourceError::Api {
                status: 200,
                message: body.description.unwrap_or_else(|| "ok=false".to_string()),
            });
        }

        let total = body.result.len();
        let posts: Vec<Post> = body
            .result
            .into_iter()
            .filter_map(|u| self.normalize(u))
            .collect();

        debug!(updates = total, posts = posts.len(), "Telegram updates normalized");
        Ok(posts)
    }
}
