use serde::{Deserialize, Serialize};

/// Value of the `type` field for hazardous social-media posts.
pub const SOCIAL_MEDIA_POST: &str = "social-media-post";

/// A social-media post that mentioned at least one hazard term.
///
/// Serialized flat:
///
/// ```json
/// {"type":"social-media-post","source":"telegram","post_id":"tg-42",
///  "author":"coastwatch","content":"Storm surge warning issued",
///  "timestamp":"2024-05-01T06:30:00Z","hazards":["storm surge","surge"],
///  "raw_url":"https://t.me/coastwatch/42"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialMediaPostEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub post_id: String,
    pub author: String,
    pub content: String,
    /// ISO-8601, as reported by the platform.
    pub timestamp: String,
    /// Matched terms in vocabulary order.
    pub hazards: Vec<String>,
    pub raw_url: String,
}

impl SocialMediaPostEvent {
    /// Build an event; `None` when `hazards` is empty, since a post with no
    /// hazard terms is never reportable.
    pub fn new(
        source: impl Into<String>,
        post_id: impl Into<String>,
        author: impl Into<String>,
        content: impl Into<String>,
        timestamp: impl Into<String>,
        hazards: Vec<String>,
        raw_url: impl Into<String>,
    ) -> Option<Self> {
        if hazards.is_empty() {
            return None;
        }

        Some(Self {
            event_type: SOCIAL_MEDIA_POST.to_string(),
            source: source.into(),
            post_id: post_id.into(),
            author: author.into(),
            content: content.into(),
            timestamp: timestamp.into(),
            hazards,
            raw_url: raw_url.into(),
        })
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
