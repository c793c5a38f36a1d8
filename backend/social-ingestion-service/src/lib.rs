pub mod config;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod services;
pub mod sources;

// Re-export commonly used types
pub use config::Config;
pub use error::{IngestionError, Result};
pub use jobs::{IngestionRunner, PassReport};
pub use models::Post;
pub use services::{
    AmqpPublisher, ClaimOutcome, DedupStore, EventPublisher, Fingerprint, HazardDetector,
    PublishError, RedisDedupStore,
};
pub use sources::{BlueskySource, SourceAdapter, SourceError, TelegramSource};
