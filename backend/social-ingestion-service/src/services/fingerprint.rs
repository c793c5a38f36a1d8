use sha2::{Digest, Sha256};
use std::fmt;

/// Hex SHA-256 of `source || post_id`, used as the dedup cache key.
///
/// The two parts are concatenated with no separator, matching keys already
/// written by earlier deployments. That stays unambiguous only while no
/// registered source name is a prefix of another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(source: &str, post_id: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update(post_id.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
