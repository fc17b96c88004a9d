use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::{ClientConfig, Message, Offset, TopicPartitionList};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

use crate::config::{ConsumerConfig, KafkaConfig};
use crate::health::HealthHandle;
use crate::kafka_context::KafkaContext;

/// A message pulled from Kafka, detached from the consumer so it can outlive the poll.
#[derive(Clone, PartialEq, Eq)]
pub struct ConsumedMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Option<Vec<u8>>,
}

impl fmt::Debug for ConsumedMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ topic: {}, partition: {}, offset: {} }}",
            self.topic, self.partition, self.offset
        )
    }
}

/// The offsets to commit once every message of a batch has been handled: for each
/// partition, one past the highest offset seen.
pub fn committable_offsets(messages: &[ConsumedMessage]) -> HashMap<(String, i32), i64> {
    let mut offsets: HashMap<(String, i32), i64> = HashMap::new();
    for message in messages {
        let next = message.offset + 1;
        offsets
            .entry((message.topic.clone(), message.partition))
            .and_modify(|current| *current = (*current).max(next))
            .or_insert(next);
    }
    offsets
}

/// A consumer on a single topic that hands out bounded batches and commits them by hand.
pub struct BatchConsumer {
    consumer: StreamConsumer<KafkaContext>,
    topic: String,
}

impl BatchConsumer {
    pub fn new(
        common_config: &KafkaConfig,
        consumer_config: &ConsumerConfig,
        liveness: HealthHandle,
    ) -> Result<Self, KafkaError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &common_config.kafka_hosts)
            .set("statistics.interval.ms", "10000")
            .set("group.id", &consumer_config.kafka_consumer_group)
            .set(
                "auto.offset.reset",
                &consumer_config.kafka_consumer_offset_reset,
            )
            // Offsets only move forward when a whole batch has been processed.
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false");

        if common_config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        debug!("rdkafka consumer configuration: {:?}", client_config);
        let consumer: StreamConsumer<KafkaContext> =
            client_config.create_with_context(KafkaContext::from(liveness))?;
        consumer.subscribe(&[consumer_config.kafka_consumer_topic.as_str()])?;

        info!(
            topic = consumer_config.kafka_consumer_topic,
            group_id = consumer_config.kafka_consumer_group,
            "kafka consumer subscribed"
        );

        Ok(Self {
            consumer,
            topic: consumer_config.kafka_consumer_topic.clone(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Collect up to `max` messages, waiting at most `timeout` overall. An empty
    /// batch just means nothing arrived in time. Any error from the broker
    /// connection is returned as is.
    pub async fn recv_batch(
        &self,
        max: usize,
        timeout: Duration,
    ) -> Result<Vec<ConsumedMessage>, KafkaError> {
        let deadline = Instant::now() + timeout;
        let mut batch = Vec::with_capacity(max);

        while batch.len() < max {
            let message = match timeout_at(deadline, self.consumer.recv()).await {
                Ok(received) => received?,
                Err(_) => break,
            };

            batch.push(ConsumedMessage {
                topic: message.topic().to_owned(),
                partition: message.partition(),
                offset: message.offset(),
                payload: message.payload().map(<[u8]>::to_vec),
            });
        }

        Ok(batch)
    }

    /// Synchronously commit the offsets covering every message in `messages`.
    pub fn commit(&self, messages: &[ConsumedMessage]) -> Result<(), KafkaError> {
        let offsets = committable_offsets(messages);
        if offsets.is_empty() {
            return Ok(());
        }

        let mut list = TopicPartitionList::new();
        for ((topic, partition), next_offset) in &offsets {
            list.add_partition_offset(topic, *partition, Offset::Offset(*next_offset))?;
        }

        self.consumer.commit(&list, CommitMode::Sync)?;
        debug!("committed offsets for {} partitions", offsets.len());

        Ok(())
    }

    pub fn close(&self) {
        self.consumer.unsubscribe();
        info!(topic = self.topic, "kafka consumer unsubscribed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(partition: i32, offset: i64) -> ConsumedMessage {
        ConsumedMessage {
            topic: "scraps".to_owned(),
            partition,
            offset,
            payload: None,
        }
    }

    #[test]
    fn commits_one_past_the_highest_offset_per_partition() {
        let batch = vec![message(0, 7), message(1, 3), message(0, 9), message(0, 8)];

        let offsets = committable_offsets(&batch);

        assert_eq!(offsets.len(), 2);
        assert_eq!(offsets.get(&("scraps".to_owned(), 0)), Some(&10));
        assert_eq!(offsets.get(&("scraps".to_owned(), 1)), Some(&4));
    }

    #[test]
    fn empty_batch_has_nothing_to_commit() {
        assert!(committable_offsets(&[]).is_empty());
    }
}
