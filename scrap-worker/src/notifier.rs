use std::time::Duration;

use async_trait::async_trait;
use rdkafka::producer::FutureProducer;
use scrap_common::kafka_context::KafkaContext;
use scrap_common::kafka_messages::dead_letter::ScrapDeadLetter;
use scrap_common::kafka_messages::scrap_processed::ScrapProcessed;
use scrap_common::kafka_producer::{flush_producer, send_json};
use tracing::{debug, error, info};

use crate::error::NotifyError;

/// Announces the outcome of processing a scrap to downstream consumers.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Publish a completion notification. Resolves once the broker acknowledged it.
    async fn publish(&self, notification: &ScrapProcessed) -> Result<(), NotifyError>;

    /// Record a scrap that failed processing.
    async fn dead_letter(&self, letter: &ScrapDeadLetter) -> Result<(), NotifyError>;

    /// Deliver anything still buffered. Called once, on shutdown.
    async fn close(&self);
}

pub struct KafkaNotifier {
    producer: FutureProducer<KafkaContext>,
    notification_topic: String,
    dead_letter_topic: Option<String>,
    flush_timeout: Duration,
}

impl KafkaNotifier {
    pub fn new(
        producer: FutureProducer<KafkaContext>,
        notification_topic: &str,
        dead_letter_topic: Option<&str>,
    ) -> Self {
        Self {
            producer,
            notification_topic: notification_topic.to_owned(),
            dead_letter_topic: dead_letter_topic.map(str::to_owned),
            flush_timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait]
impl Notifier for KafkaNotifier {
    async fn publish(&self, notification: &ScrapProcessed) -> Result<(), NotifyError> {
        send_json(
            &self.producer,
            &self.notification_topic,
            Some(notification.hash.as_str()),
            notification,
        )
        .await?;

        debug!(
            scrap_id = notification.scrap_id,
            hash = notification.hash,
            "published to {}",
            self.notification_topic
        );
        Ok(())
    }

    async fn dead_letter(&self, letter: &ScrapDeadLetter) -> Result<(), NotifyError> {
        let Some(topic) = &self.dead_letter_topic else {
            debug!(
                scrap_id = letter.scrap.id,
                hash = letter.scrap.hash,
                "no dead letter topic configured, dropping record"
            );
            return Ok(());
        };

        send_json(&self.producer, topic, Some(letter.scrap.hash.as_str()), letter).await?;
        Ok(())
    }

    async fn close(&self) {
        let producer = self.producer.clone();
        let timeout = self.flush_timeout;

        // librdkafka's flush blocks the calling thread.
        match tokio::task::spawn_blocking(move || flush_producer(&producer, timeout)).await {
            Ok(Ok(())) => info!("notification producer flushed"),
            Ok(Err(e)) => error!("failed to flush notification producer: {}", e),
            Err(e) => error!("notification producer flush task failed: {}", e),
        }
    }
}
