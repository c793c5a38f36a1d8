//! End-to-end pass behaviour against in-memory dedup and publisher fakes.

mod common;

use common::{post, FailingSource, MemoryDedupStore, RecordingPublisher, StaticSource};
use sha2::{Digest, Sha256};
use social_ingestion_service::jobs::{start_ingestion_loop, IngestionRunner};
use social_ingestion_service::services::{Fingerprint, HazardDetector};
use social_ingestion_service::sources::SourceAdapter;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

struct Harness {
    runner: Arc<IngestionRunner>,
    dedup: Arc<MemoryDedupStore>,
    publisher: Arc<RecordingPublisher>,
}

fn harness(sources: Vec<Arc<dyn SourceAdapter>>) -> Harness {
    let dedup = Arc::new(MemoryDedupStore::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let runner = Arc::new(IngestionRunner::new(
        sources,
        HazardDetector::default(),
        dedup.clone(),
        publisher.clone(),
    ));
    Harness {
        runner,
        dedup,
        publisher,
    }
}

fn single(name: &'static str, posts: Vec<social_ingestion_service::Post>) -> Harness {
    harness(vec![Arc::new(StaticSource::new(name, posts))])
}

#[tokio::test]
async fn test_storm_surge_post_is_published_and_marked() {
    let h = single("telegram", vec![post("42", "Storm surge warning issued")]);

    let report = h.runner.run_pass().await;

    let events = h.publisher.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.event_type, "social-media-post");
    assert_eq!(event.source, "telegram");
    assert_eq!(event.post_id, "42");
    assert_eq!(event.content, "Storm surge warning issued");
    assert_eq!(event.raw_url, "https://t.me/coastwatch/42");
    assert_eq!(event.hazards, vec!["storm surge", "surge"]);

    let expected = hex::encode(Sha256::digest(b"telegram42"));
    let fingerprint = Fingerprint::of("telegram", "42");
    assert_eq!(fingerprint.as_str(), expected);
    assert!(h.dedup.contains(&fingerprint));

    assert!(!report.skipped);
    assert_eq!(report.published(), 1);
    assert_eq!(report.sources[0].hazardous, 1);
}

#[tokio::test]
async fn test_non_hazard_post_is_neither_published_nor_marked() {
    let h = single("telegram", vec![post("7", "Sunny day at the beach")]);

    let report = h.runner.run_pass().await;

    assert!(h.publisher.events().is_empty());
    assert_eq!(h.dedup.len(), 0);
    assert_eq!(report.sources[0].fetched, 1);
    assert_eq!(report.sources[0].hazardous, 0);
}

#[tokio::test]
async fn test_repeat_post_across_passes_is_published_once() {
    let h = single("telegram", vec![post("42", "TSUNAMI alert")]);

    let first = h.runner.run_pass().await;
    let second = h.runner.run_pass().await;

    assert_eq!(h.publisher.events().len(), 1);
    assert_eq!(first.published(), 1);
    assert_eq!(second.published(), 0);
    assert_eq!(second.sources[0].duplicates, 1);
}

#[tokio::test]
async fn test_repeat_post_within_one_fetch_is_published_once() {
    let h = single(
        "telegram",
        vec![post("42", "tsunami"), post("42", "tsunami again")],
    );

    let report = h.runner.run_pass().await;

    assert_eq!(h.publisher.events().len(), 1);
    assert_eq!(report.sources[0].duplicates, 1);
}

#[tokio::test]
async fn test_previously_marked_post_is_skipped() {
    let h = single("bluesky", vec![post("at://x/1", "High wave warning")]);
    h.dedup.insert(&Fingerprint::of("bluesky", "at://x/1"));

    h.runner.run_pass().await;

    assert!(h.publisher.events().is_empty());
    assert_eq!(h.publisher.attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_same_post_id_on_different_sources_is_distinct() {
    let h = harness(vec![
        Arc::new(StaticSource::new("telegram", vec![post("1", "surge")])),
        Arc::new(StaticSource::new("bluesky", vec![post("1", "surge")])),
    ]);

    h.runner.run_pass().await;

    let sources: Vec<String> = h.publisher.events().into_iter().map(|e| e.source).collect();
    assert_eq!(sources, vec!["telegram", "bluesky"]);
}

#[tokio::test]
async fn test_events_follow_source_then_post_order() {
    let h = harness(vec![
        Arc::new(StaticSource::new(
            "telegram",
            vec![
                post("3", "tsunami"),
                post("1", "nothing to see"),
                post("2", "storm surge"),
            ],
        )),
        Arc::new(StaticSource::new("bluesky", vec![post("9", "coastal flooding")])),
    ]);

    h.runner.run_pass().await;

    let ids: Vec<(String, String)> = h
        .publisher
        .events()
        .into_iter()
        .map(|e| (e.source, e.post_id))
        .collect();
    assert_eq!(
        ids,
        vec![
            ("telegram".to_string(), "3".to_string()),
            ("telegram".to_string(), "2".to_string()),
            ("bluesky".to_string(), "9".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_post_without_id_is_dropped() {
    let h = single("telegram", vec![post("", "tsunami"), post("  ", "surge")]);

    let report = h.runner.run_pass().await;

    assert!(h.publisher.events().is_empty());
    assert_eq!(h.dedup.len(), 0);
    assert_eq!(report.sources[0].fetched, 2);
    assert_eq!(report.sources[0].hazardous, 0);
}

#[tokio::test]
async fn test_failed_publish_releases_claim_and_retries_next_pass() {
    let h = single("telegram", vec![post("42", "Storm surge warning issued")]);
    let fingerprint = Fingerprint::of("telegram", "42");

    h.publisher.set_failing(true);
    let failed = h.runner.run_pass().await;

    assert_eq!(failed.sources[0].publish_failures, 1);
    assert!(!h.dedup.contains(&fingerprint));
    assert_eq!(h.dedup.releases.load(Ordering::SeqCst), 1);

    h.publisher.set_failing(false);
    let retried = h.runner.run_pass().await;

    assert_eq!(retried.published(), 1);
    assert_eq!(h.publisher.events().len(), 1);
    assert!(h.dedup.contains(&fingerprint));
}

#[tokio::test]
async fn test_unreleased_claim_suppresses_retry() {
    let h = single("telegram", vec![post("42", "tsunami")]);

    h.publisher.set_failing(true);
    h.dedup.set_fail_release(true);
    h.runner.run_pass().await;

    h.publisher.set_failing(false);
    let report = h.runner.run_pass().await;

    assert_eq!(report.published(), 0);
    assert_eq!(report.sources[0].duplicates, 1);
}

#[tokio::test]
async fn test_unavailable_cache_fails_open() {
    let h = single("telegram", vec![post("42", "tsunami")]);
    h.dedup.set_unavailable(true);

    let first = h.runner.run_pass().await;
    let second = h.runner.run_pass().await;

    // No dedup while the cache is down: duplicates, never losses.
    assert_eq!(first.published(), 1);
    assert_eq!(second.published(), 1);
    assert_eq!(h.publisher.events().len(), 2);
    assert_eq!(h.dedup.marks.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_post_published_during_outage_is_resent_once_after_recovery() {
    let h = single("telegram", vec![post("42", "tsunami")]);

    h.dedup.set_unavailable(true);
    h.runner.run_pass().await;
    h.dedup.set_unavailable(false);
    // The outage-time mark was dropped, so the first healthy pass re-sends.
    h.runner.run_pass().await;
    h.runner.run_pass().await;

    assert_eq!(h.publisher.events().len(), 2);
}

#[tokio::test]
async fn test_unavailable_claim_with_failed_publish_touches_nothing() {
    let h = single("telegram", vec![post("42", "tsunami")]);
    h.dedup.set_unavailable(true);
    h.publisher.set_failing(true);

    let report = h.runner.run_pass().await;

    assert_eq!(report.sources[0].publish_failures, 1);
    assert_eq!(h.dedup.marks.load(Ordering::SeqCst), 0);
    assert_eq!(h.dedup.releases.load(Ordering::SeqCst), 0);

    // Once both recover the post goes out on the next pass.
    h.dedup.set_unavailable(false);
    h.publisher.set_failing(false);
    assert_eq!(h.runner.run_pass().await.published(), 1);
}

#[tokio::test]
async fn test_failing_source_does_not_block_others() {
    let h = harness(vec![
        Arc::new(FailingSource::new("bluesky")),
        Arc::new(StaticSource::new("telegram", vec![post("42", "high wave")])),
    ]);

    let report = h.runner.run_pass().await;

    assert_eq!(report.degraded_sources(), vec!["bluesky"]);
    assert_eq!(report.sources[0].fetched, 0);
    assert_eq!(report.published(), 1);
}

#[tokio::test]
async fn test_all_sources_failing_is_an_empty_pass() {
    let h = harness(vec![
        Arc::new(FailingSource::new("telegram")),
        Arc::new(FailingSource::new("bluesky")),
    ]);

    let report = h.runner.run_pass().await;

    assert!(!report.skipped);
    assert_eq!(report.published(), 0);
    assert_eq!(report.degraded_sources().len(), 2);
}

#[tokio::test]
async fn test_custom_vocabulary() {
    let dedup = Arc::new(MemoryDedupStore::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let runner = IngestionRunner::new(
        vec![Arc::new(StaticSource::new(
            "telegram",
            vec![post("1", "Rip current near the pier"), post("2", "tsunami")],
        ))],
        HazardDetector::new(["rip current"]),
        dedup,
        publisher.clone(),
    );

    runner.run_pass().await;

    let events = publisher.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].hazards, vec!["rip current"]);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_pass_is_skipped() {
    let h = harness(vec![Arc::new(
        StaticSource::new("telegram", vec![post("42", "tsunami")])
            .with_delay(Duration::from_secs(60)),
    )]);

    let (a, b) = tokio::join!(h.runner.run_pass(), h.runner.run_pass());

    assert!(!a.skipped);
    assert!(b.skipped);
    assert_eq!(h.publisher.events().len(), 1);

    // The guard is released once the pass completes.
    assert!(!h.runner.run_pass().await.skipped);
}

#[tokio::test(start_paused = true)]
async fn test_loop_waits_full_interval_after_slow_pass() {
    let source = Arc::new(
        StaticSource::new("telegram", vec![]).with_delay(Duration::from_secs(45 * 60)),
    );
    let as_adapter: Arc<dyn SourceAdapter> = source.clone();
    let h = harness(vec![as_adapter]);
    let (shutdown_tx, _) = broadcast::channel(1);

    let handle = tokio::spawn(start_ingestion_loop(
        h.runner.clone(),
        Duration::from_secs(30 * 60),
        shutdown_tx.subscribe(),
    ));

    // First pass starts at once and ends at 45m; the next may not start
    // before 45m + 30m.
    tokio::time::sleep(Duration::from_secs(74 * 60)).await;
    assert_eq!(source.fetch_count(), 1);

    tokio::time::sleep(Duration::from_secs(2 * 60)).await;
    assert_eq!(source.fetch_count(), 2);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
    assert_eq!(source.fetch_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_loop_stops_on_shutdown_between_passes() {
    let source = Arc::new(StaticSource::new("telegram", vec![post("1", "surge")]));
    let as_adapter: Arc<dyn SourceAdapter> = source.clone();
    let h = harness(vec![as_adapter]);
    let (shutdown_tx, _) = broadcast::channel(1);

    let handle = tokio::spawn(start_ingestion_loop(
        h.runner.clone(),
        Duration::from_secs(30 * 60),
        shutdown_tx.subscribe(),
    ));

    tokio::time::sleep(Duration::from_secs(60)).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    assert_eq!(source.fetch_count(), 1);
    assert_eq!(h.publisher.events().len(), 1);
}
