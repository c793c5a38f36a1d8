use async_trait::async_trait;
use event_schema::SocialMediaPostEvent;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// AMQP delivery mode 2: the broker writes the message to disk.
const PERSISTENT: u8 = 2;
const CONTENT_TYPE_JSON: &str = "application/json";

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to connect to broker: {0}")]
    Connect(#[source] lapin::Error),

    #[error("broker channel error: {0}")]
    Channel(#[from] lapin::Error),

    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("broker rejected message for queue {queue}")]
    Nack { queue: String },
}

/// Sends events to the reports queue.
///
/// `Ok` means the broker accepted the message. Failures are returned, never
/// retried here; the caller decides what a failed dispatch means for dedup.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &SocialMediaPostEvent) -> Result<(), PublishError>;
}

/// Connection and confirm-mode channel with the queue declared on it.
struct Link {
    connection: Connection,
    channel: Channel,
}

impl Link {
    async fn open(url: &str, queue: &str) -> Result<Self, PublishError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(PublishError::Connect)?;
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        declare(&channel, queue).await?;

        Ok(Self {
            connection,
            channel,
        })
    }

    fn is_usable(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }
}

/// Declare the durable queue. Idempotent for identical parameters.
async fn declare(channel: &Channel, queue: &str) -> Result<(), PublishError> {
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;
    Ok(())
}

/// Publisher over a single AMQP channel in publisher-confirm mode.
///
/// A link found closed at publish time is reopened once before sending; if
/// that fails the publish fails and the next one tries again.
pub struct AmqpPublisher {
    url: String,
    queue: String,
    link: Mutex<Link>,
}

impl AmqpPublisher {
    /// Connect, enable confirms and declare the queue.
    ///
    /// Called once at startup; any error here is fatal to the process.
    pub async fn connect(url: &str, queue: impl Into<String>) -> Result<Self, PublishError> {
        let queue = queue.into();
        let link = Link::open(url, &queue).await?;

        info!(queue = %queue, "AMQP publisher ready");
        Ok(Self {
            url: url.to_string(),
            queue,
            link: Mutex::new(link),
        })
    }

    pub async fn declare_queue(&self) -> Result<(), PublishError> {
        let link = self.link.lock().await;
        declare(&link.channel, &self.queue).await
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.is_usable()
    }

    pub async fn close(&self) {
        let link = self.link.lock().await;
        if let Err(e) = link.connection.close(200, "shutting down").await {
            warn!(error = %e, "Failed to close AMQP connection cleanly");
        }
    }
}

#[async_trait]
impl EventPublisher for AmqpPublisher {
    async fn publish(&self, event: &SocialMediaPostEvent) -> Result<(), PublishError> {
        let payload = event.to_json()?;

        let properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT)
            .with_content_type(CONTENT_TYPE_JSON.into());

        let mut link = self.link.lock().await;
        if !link.is_usable() {
            warn!(queue = %self.queue, "AMQP link is down, reconnecting");
            *link = Link::open(&self.url, &self.queue).await?;
            info!(queue = %self.queue, "AMQP link re-established");
        }

        // Default exchange: the routing key is the queue name.
        let confirmation = link
            .channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await?
            .await?;

        if confirmation.is_nack() {
            return Err(PublishError::Nack {
                queue: self.queue.clone(),
            });
        }

        debug!(
            queue = %self.queue,
            source = %event.source,
            post_id = %event.post_id,
            bytes = payload.len(),
            "Event published"
        );
        Ok(())
    }
}
