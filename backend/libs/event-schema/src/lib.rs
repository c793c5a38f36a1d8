/// Event schemas for messages published to the `reports` queue.
///
/// Downstream consumers (alerting, reporting) decode these payloads directly,
/// so field names are part of the wire contract. Changing one means a new
/// event type, not an edit in place.
pub mod social;

pub use social::{SocialMediaPostEvent, SOCIAL_MEDIA_POST};
