//! Fingerprint-keyed record of dispatched posts.
//!
//! # Failure policy
//!
//! The store fails OPEN. When the cache cannot be reached, reads report
//! "not seen" and claims report [`ClaimOutcome::Unavailable`], which the runner
//! treats like a fresh claim. A cache outage therefore produces duplicate
//! events rather than lost ones; ingestion keeps running either way. Writes
//! (`mark`, `release`) are best effort and only logged on failure.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis_utils::{with_timeout_of, CommandError, RedisPool};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::fingerprint::Fingerprint;
use crate::metrics;

/// Result of an atomic insert-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// No live record existed; one now does, with a fresh expiry.
    Claimed,
    /// A live record already existed and was left untouched.
    AlreadySeen,
    /// The cache could not answer. Treated as not seen.
    Unavailable,
}

#[async_trait]
pub trait DedupStore: Send + Sync {
    /// True iff a live record exists. Cache errors read as `false`.
    async fn exists(&self, fingerprint: &Fingerprint) -> bool;

    /// Insert or overwrite the record with a fresh expiry. Errors are logged.
    async fn mark(&self, fingerprint: &Fingerprint);

    /// Check and mark as one atomic operation.
    async fn claim(&self, fingerprint: &Fingerprint) -> ClaimOutcome;

    /// Drop the record so a later pass may dispatch the post again.
    /// Returns whether the cache confirmed the delete.
    async fn release(&self, fingerprint: &Fingerprint) -> bool;
}

/// Redis-backed store. Keys are the bare hex fingerprint, value `"1"`.
///
/// The connection is established by the first command that needs it; until
/// then every command fails open like any other cache error.
#[derive(Clone)]
pub struct RedisDedupStore {
    redis: Arc<RedisPool>,
    ttl: Duration,
    op_timeout: Duration,
}

impl RedisDedupStore {
    pub fn new(redis: Arc<RedisPool>, ttl: Duration, op_timeout: Duration) -> Self {
        Self {
            redis,
            ttl,
            op_timeout,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }

    /// Like [`DedupStore::exists`] but surfaces cache errors.
    pub async fn try_exists(&self, key: &str) -> Result<bool, CommandError> {
        with_timeout_of(self.op_timeout, async {
            let mut conn = self.redis.connection().await?;
            conn.exists::<_, bool>(key).await
        })
        .await
    }

    /// Seconds until the record expires; `None` when there is no record.
    pub async fn try_remaining_ttl(&self, key: &str) -> Result<Option<u64>, CommandError> {
        let ttl: i64 = with_timeout_of(self.op_timeout, async {
            let mut conn = self.redis.connection().await?;
            conn.ttl::<_, i64>(key).await
        })
        .await?;

        // -2: no key, -1: key without expiry
        Ok(u64::try_from(ttl).ok())
    }

    pub async fn try_mark(&self, key: &str) -> Result<(), CommandError> {
        with_timeout_of(self.op_timeout, async {
            let mut conn = self.redis.connection().await?;
            redis::cmd("SET")
                .arg(key)
                .arg("1")
                .arg("EX")
                .arg(self.ttl_secs())
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await
    }

    pub async fn try_claim(&self, key: &str) -> Result<bool, CommandError> {
        // SET key 1 NX EX ttl replies OK when written and nil when the key exists.
        let reply: Option<String> = with_timeout_of(self.op_timeout, async {
            let mut conn = self.redis.connection().await?;
            redis::cmd("SET")
                .arg(key)
                .arg("1")
                .arg("NX")
                .arg("EX")
                .arg(self.ttl_secs())
                .query_async(&mut conn)
                .await
        })
        .await?;

        Ok(reply.is_some())
    }

    pub async fn try_release(&self, key: &str) -> Result<(), CommandError> {
        with_timeout_of(self.op_timeout, async {
            let mut conn = self.redis.connection().await?;
            conn.del::<_, ()>(key).await
        })
        .await
    }
}

#[async_trait]
impl DedupStore for RedisDedupStore {
    async fn exists(&self, fingerprint: &Fingerprint) -> bool {
        match self.try_exists(fingerprint.as_str()).await {
            Ok(found) => found,
            Err(e) => {
                metrics::record_dedup_fail_open("exists");
                warn!(
                    fingerprint = %fingerprint,
                    error = %e,
                    "Dedup lookup failed, treating post as not seen"
                );
                false
            }
        }
    }

    async fn mark(&self, fingerprint: &Fingerprint) {
        if let Err(e) = self.try_mark(fingerprint.as_str()).await {
            warn!(fingerprint = %fingerprint, error = %e, "Failed to mark fingerprint as seen");
        }
    }

    async fn claim(&self, fingerprint: &Fingerprint) -> ClaimOutcome {
        match self.try_claim(fingerprint.as_str()).await {
            Ok(true) => ClaimOutcome::Claimed,
            Ok(false) => {
                debug!(fingerprint = %fingerprint, "Fingerprint already claimed");
                ClaimOutcome::AlreadySeen
            }
            Err(e) => {
                metrics::record_dedup_fail_open("claim");
                warn!(
                    fingerprint = %fingerprint,
                    error = %e,
                    "Dedup claim failed, treating post as not seen"
                );
                ClaimOutcome::Unavailable
            }
        }
    }

    async fn release(&self, fingerprint: &Fingerprint) -> bool {
        match self.try_release(fingerprint.as_str()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(fingerprint = %fingerprint, error = %e, "Failed to release dedup claim");
                false
            }
        }
    }
}
