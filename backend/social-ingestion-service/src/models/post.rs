use serde::{Deserialize, Serialize};

/// A post normalized from any platform. Lives for a single pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Unique within the originating platform only.
    pub id: String,
    pub author: String,
    pub text: String,
    pub url: String,
    /// ISO-8601 string as produced by the adapter.
    pub timestamp: String,
}

impl Post {
    /// Posts without an id cannot be fingerprinted and are dropped.
    pub fn has_id(&self) -> bool {
        !self.id.trim().is_empty()
    }
}
