use std::num::NonZeroUsize;
use std::time::Duration;

use async_trait::async_trait;
use scrap_common::kafka_consumer::{BatchConsumer, ConsumedMessage};

use crate::error::WorkerError;

/// Where batches of scrap messages come from, and where their progress is recorded.
#[async_trait]
pub trait ScrapSource: Send + Sync {
    /// The next batch of messages. Empty when nothing arrived before the poll timeout.
    async fn next_batch(&self) -> Result<Vec<ConsumedMessage>, WorkerError>;

    /// Mark every message in `messages` as handled, so it is not delivered again.
    async fn commit(&self, messages: &[ConsumedMessage]) -> Result<(), WorkerError>;

    async fn close(&self);
}

pub struct KafkaScrapSource {
    consumer: BatchConsumer,
    max_records: usize,
    poll_timeout: Duration,
}

impl KafkaScrapSource {
    pub fn new(consumer: BatchConsumer, max_records: NonZeroUsize, poll_timeout: Duration) -> Self {
        Self {
            consumer,
            max_records: max_records.get(),
            poll_timeout,
        }
    }
}

#[async_trait]
impl ScrapSource for KafkaScrapSource {
    async fn next_batch(&self) -> Result<Vec<ConsumedMessage>, WorkerError> {
        Ok(self
            .consumer
            .recv_batch(self.max_records, self.poll_timeout)
            .await?)
    }

    async fn commit(&self, messages: &[ConsumedMessage]) -> Result<(), WorkerError> {
        Ok(self.consumer.commit(messages)?)
    }

    async fn close(&self) {
        self.consumer.close();
    }
}
