pub mod dedup_store;
pub mod fingerprint;
pub mod hazard_detector;
pub mod publisher;

pub use dedup_store::{ClaimOutcome, DedupStore, RedisDedupStore};
pub use fingerprint::Fingerprint;
pub use hazard_detector::{HazardDetector, HazardMatch};
pub use publisher::{AmqpPublisher, EventPublisher, PublishError};
