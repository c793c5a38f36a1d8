#![allow(dead_code)]

use async_trait::async_trait;
use event_schema::SocialMediaPostEvent;
use social_ingestion_service::models::Post;
use social_ingestion_service::services::{
    ClaimOutcome, DedupStore, EventPublisher, Fingerprint, PublishError,
};
use social_ingestion_service::sources::{SourceAdapter, SourceError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn post(id: &str, text: &str) -> Post {
    Post {
        id: id.to_string(),
        author: "coastwatch".to_string(),
        text: text.to_string(),
        url: format!("https://t.me/coastwatch/{}", id),
        timestamp: "2024-05-01T06:30:00Z".to_string(),
    }
}

/// In-memory dedup store. `set_unavailable` makes every operation behave
/// like an unreachable cache.
#[derive(Default)]
pub struct MemoryDedupStore {
    seen: Mutex<HashSet<String>>,
    unavailable: AtomicBool,
    fail_release: AtomicBool,
    pub marks: AtomicUsize,
    pub releases: AtomicUsize,
}

impl MemoryDedupStore {
    pub fn set_unavailable(&self, value: bool) {
        self.unavailable.store(value, Ordering::SeqCst);
    }

    pub fn set_fail_release(&self, value: bool) {
        self.fail_release.store(value, Ordering::SeqCst);
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.seen.lock().unwrap().contains(fingerprint.as_str())
    }

    pub fn insert(&self, fingerprint: &Fingerprint) {
        self.seen
            .lock()
            .unwrap()
            .insert(fingerprint.as_str().to_string());
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn is_unavailable(&self) -> bool {
        self.unavailable.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn exists(&self, fingerprint: &Fingerprint) -> bool {
        !self.is_unavailable() && self.contains(fingerprint)
    }

    async fn mark(&self, fingerprint: &Fingerprint) {
        self.marks.fetch_add(1, Ordering::SeqCst);
        if !self.is_unavailable() {
            self.insert(fingerprint);
        }
    }

    async fn claim(&self, fingerprint: &Fingerprint) -> ClaimOutcome {
        if self.is_unavailable() {
            return ClaimOutcome::Unavailable;
        }
        let inserted = self
            .seen
            .lock()
            .unwrap()
            .insert(fingerprint.as_str().to_string());
        if inserted {
            ClaimOutcome::Claimed
        } else {
            ClaimOutcome::AlreadySeen
        }
    }

    async fn release(&self, fingerprint: &Fingerprint) -> bool {
        self.releases.fetch_add(1, Ordering::SeqCst);
        if self.is_unavailable() || self.fail_release.load(Ordering::SeqCst) {
            return false;
        }
        self.seen.lock().unwrap().remove(fingerprint.as_str());
        true
    }
}

/// Records every accepted event; rejects everything while `set_failing(true)`.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<SocialMediaPostEvent>>,
    failing: AtomicBool,
    pub attempts: AtomicUsize,
}

impl RecordingPublisher {
    pub fn set_failing(&self, value: bool) {
        self.failing.store(value, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<SocialMediaPostEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &SocialMediaPostEvent) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::Nack {
                queue: "reports".to_string(),
            });
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Returns the same posts on every fetch, optionally after a delay.
pub struct StaticSource {
    name: &'static str,
    posts: Vec<Post>,
    delay: Option<Duration>,
    pub fetches: AtomicUsize,
}

impl StaticSource {
    pub fn new(name: &'static str, posts: Vec<Post>) -> Self {
        Self {
            name,
            posts,
            delay: None,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for StaticSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_posts(&self) -> Result<Vec<Post>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.posts.clone())
    }
}

pub struct FailingSource {
    name: &'static str,
}

impl FailingSource {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl SourceAdapter for FailingSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_posts(&self) -> Result<Vec<Post>, SourceError> {
        Err(SourceError::Network("connection refused".to_string()))
    }
}
