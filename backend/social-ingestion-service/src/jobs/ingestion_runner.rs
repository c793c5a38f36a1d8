//! Ingestion pass and the interval loop that drives it.
//!
//! One pass visits every source in order, and each source's posts in the
//! order the adapter returned them:
//!
//! 1. drop posts without an id
//! 2. detect hazard terms, drop posts with none
//! 3. claim the fingerprint in the dedup store, drop if already seen
//! 4. publish the event; on failure release the claim so the next pass retries
//!
//! Nothing in a pass is fatal. A failing source counts as zero posts, a
//! failing cache reads as "not seen", a failing publish is logged and retried
//! on a later pass.

use event_schema::SocialMediaPostEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::models::Post;
use crate::services::{ClaimOutcome, DedupStore, EventPublisher, Fingerprint, HazardDetector};
use crate::sources::SourceAdapter;

/// Per-source tallies for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceReport {
    pub source: String,
    /// Set when the adapter failed; all counts are then zero.
    pub error: Option<String>,
    pub fetched: usize,
    pub hazardous: usize,
    pub duplicates: usize,
    pub published: usize,
    pub publish_failures: usize,
}

#[derive(Debug, Clone)]
pub struct PassReport {
    pub pass_id: Uuid,
    /// True when another pass was still running and this one did nothing.
    pub skipped: bool,
    pub sources: Vec<SourceReport>,
    pub duration: Duration,
}

impl PassReport {
    pub fn published(&self) -> usize {
        self.sources.iter().map(|s| s.published).sum()
    }

    pub fn degraded_sources(&self) -> Vec<&str> {
        self.sources
            .iter()
            .filter(|s| s.error.is_some())
            .map(|s| s.source.as_str())
            .collect()
    }
}

enum Dispatch {
    Published,
    Duplicate,
    Failed,
}

/// Clears the in-progress flag when a pass ends, including when the pass
/// future is dropped mid-flight.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct IngestionRunner {
    sources: Vec<Arc<dyn SourceAdapter>>,
    detector: HazardDetector,
    dedup: Arc<dyn DedupStore>,
    publisher: Arc<dyn EventPublisher>,
    in_progress: AtomicBool,
}

impl IngestionRunner {
    pub fn new(
        sources: Vec<Arc<dyn SourceAdapter>>,
        detector: HazardDetector,
        dedup: Arc<dyn DedupStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            sources,
            detector,
            dedup,
            publisher,
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Run one pass over all sources. Never fails; see [`PassReport`].
    pub async fn run_pass(&self) -> PassReport {
        let pass_id = Uuid::new_v4();
        let started = Instant::now();

        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(pass_id = %pass_id, "Previous pass still running, skipping");
            metrics::record_pass("skipped", started.elapsed());
            return PassReport {
                pass_id,
                skipped: true,
                sources: Vec::new(),
                duration: started.elapsed(),
            };
        }
        let _guard = PassGuard(&self.in_progress);

        info!(pass_id = %pass_id, sources = self.sources.len(), "Ingestion pass starting");

        let mut reports = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            reports.push(self.process_source(source.as_ref()).await);
        }

        let report = PassReport {
            pass_id,
            skipped: false,
            sources: reports,
            duration: started.elapsed(),
        };

        metrics::record_pass("completed", report.duration);
        info!(
            pass_id = %pass_id,
            published = report.published(),
            degraded = ?report.degraded_sources(),
            duration_ms = report.duration.as_millis(),
            "Ingestion pass completed"
        );

        report
    }

    async fn process_source(&self, source: &dyn SourceAdapter) -> SourceReport {
        let name = source.name();
        let mut report = SourceReport {
            source: name.to_string(),
            ..SourceReport::default()
        };

        let posts = match source.fetch_posts().await {
            Ok(posts) => posts,
            Err(e) => {
                metrics::record_source_failure(name);
                warn!(source = name, error = %e, "Source fetch failed, no posts this pass");
                report.error = Some(e.to_string());
                return report;
            }
        };
        report.fetched = posts.len();

        for post in posts {
            if !post.has_id() {
                debug!(source = name, "Dropping post without id");
                continue;
            }

            let hazards = self.detector.detect(&post.text);
            if hazards.is_empty() {
                continue;
            }
            report.hazardous += 1;

            match self.dispatch(name, post, hazards).await {
                Dispatch::Published => report.published += 1,
                Dispatch::Duplicate => report.duplicates += 1,
                Dispatch::Failed => report.publish_failures += 1,
            }
        }

        metrics::record_posts(name, "fetched", report.fetched as u64);
        metrics::record_posts(name, "hazardous", report.hazardous as u64);
        metrics::record_posts(name, "duplicate", report.duplicates as u64);
        metrics::record_posts(name, "published", report.published as u64);
        metrics::record_posts(name, "publish_failed", report.publish_failures as u64);

        debug!(
            source = name,
            fetched = report.fetched,
            hazardous = report.hazardous,
            duplicates = report.duplicates,
            published = report.published,
            "Source processed"
        );
        report
    }

    async fn dispatch(&self, source: &str, post: Post, hazards: Vec<String>) -> Dispatch {
        let fingerprint = Fingerprint::of(source, &post.id);

        let claim = self.dedup.claim(&fingerprint).await;
        if claim == ClaimOutcome::AlreadySeen {
            debug!(source, post_id = %post.id, "Skipping already dispatched post");
            return Dispatch::Duplicate;
        }

        let post_id = post.id.clone();
        let Some(event) = SocialMediaPostEvent::new(
            source,
            post.id,
            post.author,
            post.text,
            post.timestamp,
            hazards,
            post.url,
        ) else {
            // detect() returned terms, so this only guards the schema invariant.
            if claim == ClaimOutcome::Claimed {
                self.dedup.release(&fingerprint).await;
            }
            return Dispatch::Failed;
        };

        match self.publisher.publish(&event).await {
            Ok(()) => {
                if claim == ClaimOutcome::Unavailable {
                    self.dedup.mark(&fingerprint).await;
                }
                info!(source, post_id = %post_id, hazards = ?event.hazards, "Hazard event published");
                Dispatch::Published
            }
            Err(e) => {
                warn!(source, post_id = %post_id, error = %e, "Publish failed, will retry next pass");
                if claim == ClaimOutcome::Claimed && !self.dedup.release(&fingerprint).await {
                    metrics::record_release_failure();
                    error!(
                        source,
                        post_id = %post_id,
                        fingerprint = %fingerprint,
                        "Publish failed and claim could not be released; event is lost until the record expires"
                    );
                }
                Dispatch::Failed
            }
        }
    }
}

/// Run a pass immediately, then again one full `interval` after each pass
/// finishes, until `shutdown` fires.
///
/// The wait starts after the pass, so a slow pass delays the schedule
/// instead of producing back-to-back passes. A shutdown received mid-pass
/// takes effect once that pass completes.
pub async fn start_ingestion_loop(
    runner: Arc<IngestionRunner>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!(
        interval_secs = interval.as_secs(),
        sources = ?runner.source_names(),
        "Starting ingestion loop"
    );

    loop {
        runner.run_pass().await;

        tokio::select! {
            _ = sleep(interval) => {}
            _ = shutdown.recv() => {
                info!("Ingestion loop shutting down");
                break;
            }
        }
    }
}
