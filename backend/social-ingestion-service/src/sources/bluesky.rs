use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ensure_success, SourceAdapter, SourceError, BLUESKY};
use crate::config::BlueskyConfig;
use crate::models::Post;

const PROFILE_BASE: &str = "https://bsky.app/profile";

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    #[serde(default)]
    access_jwt: String,
    #[serde(default)]
    did: String,
}

#[derive(Debug, Deserialize)]
struct Timeline {
    #[serde(default)]
    feed: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    post: FeedPost,
}

#[derive(Debug, Deserialize)]
struct FeedPost {
    uri: String,
    author: Author,
    #[serde(default)]
    record: Record,
}

#[derive(Debug, Deserialize)]
struct Author {
    handle: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Record {
    #[serde(default)]
    text: String,
    #[serde(default)]
    created_at: String,
}

impl From<FeedItem> for Post {
    fn from(item: FeedItem) -> Self {
        let post = item.post;
        Post {
            id: post.uri,
            url: format!("{}/{}", PROFILE_BASE, post.author.handle),
            author: post.author.handle,
            text: post.record.text,
            timestamp: post.record.created_at,
        }
    }
}

/// Session-authenticated timeline adapter.
///
/// A new session is created on every fetch; tokens are never cached between
/// passes.
pub struct BlueskySource {
    client: Client,
    config: BlueskyConfig,
}

impl BlueskySource {
    pub fn new(client: Client, config: BlueskyConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), method)
    }

    async fn create_session(&self) -> Result<Session, SourceError> {
        let resp = self
            .client
            .post(self.endpoint("com.atproto.server.createSession"))
            .json(&CreateSessionRequest {
                identifier: &self.config.handle,
                password: &self.config.password,
            })
            .send()
            .await?;

        let resp = match ensure_success(resp).await {
            Ok(resp) => resp,
            Err(SourceError::Api { status, message })
                if status == StatusCode::UNAUTHORIZED.as_u16()
                    || status == StatusCode::BAD_REQUEST.as_u16() =>
            {
                return Err(SourceError::Auth(message));
            }
            Err(e) => return Err(e),
        };

        let session: Session = resp.json().await?;
        if session.access_jwt.is_empty() {
            return Err(SourceError::Auth("session response had no accessJwt".to_string()));
        }

        debug!(did = %session.did, "Bluesky session created");
        Ok(session)
    }
}

#[async_trait]
impl SourceAdapter for BlueskySource {
    fn name(&self) -> &'static str {
        BLUESKY
    }

    async fn fetch_posts(&self) -> Result<Vec<Post>, SourceError> {
        let session = self.create_session().await?;

        let resp = self
            .client
            .get(self.endpoint("app.bsky.feed.getTimeline"))
            .query(&[("limit", self.config.timeline_limit)])
            .bearer_auth(&session.access_jwt)
            .send()
            .await?;
        let timeline: Timeline = ensure_success(resp).await?.json().await?;

        Ok(timeline.feed.into_iter().map(Post::from).collect())
    }
}
