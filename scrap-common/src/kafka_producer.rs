use std::time::Duration;

use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::KafkaConfig;
use crate::health::HealthHandle;
use crate::kafka_context::KafkaContext;

pub async fn create_kafka_producer(
    config: &KafkaConfig,
    liveness: HealthHandle,
) -> Result<FutureProducer<KafkaContext>, KafkaError> {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.kafka_hosts)
        .set("statistics.interval.ms", "10000")
        .set("linger.ms", config.kafka_producer_linger_ms.to_string())
        .set(
            "message.timeout.ms",
            config.kafka_message_timeout_ms.to_string(),
        )
        .set(
            "compression.codec",
            config.kafka_compression_codec.to_owned(),
        )
        .set(
            "queue.buffering.max.kbytes",
            (config.kafka_producer_queue_mib * 1024).to_string(),
        );

    if config.kafka_tls {
        client_config
            .set("security.protocol", "ssl")
            .set("enable.ssl.certificate.verification", "false");
    };

    debug!("rdkafka producer configuration: {:?}", client_config);
    let producer: FutureProducer<KafkaContext> =
        client_config.create_with_context(KafkaContext::from(liveness))?;

    // "Ping" the Kafka brokers by requesting metadata
    match producer
        .client()
        .fetch_metadata(None, Duration::from_secs(15))
    {
        Ok(metadata) => {
            info!(
                "Successfully connected to Kafka brokers. Found {} topics.",
                metadata.topics().len()
            );
        }
        Err(error) => {
            error!("Failed to fetch metadata from Kafka brokers: {:?}", error);
            return Err(error);
        }
    }

    Ok(producer)
}

#[derive(Error, Debug)]
pub enum KafkaProduceError {
    #[error("failed to serialize: {error}")]
    SerializationError { error: serde_json::Error },
    #[error("failed to produce to kafka: {error}")]
    KafkaProduceError { error: KafkaError },
    #[error("failed to produce to kafka (timeout)")]
    KafkaProduceCanceled,
}

/// Serialize `item` as JSON and wait until the broker acknowledged it.
pub async fn send_json<T: Serialize>(
    producer: &FutureProducer<KafkaContext>,
    topic: &str,
    key: Option<&str>,
    item: &T,
) -> Result<(), KafkaProduceError> {
    let payload = serde_json::to_string(item)
        .map_err(|error| KafkaProduceError::SerializationError { error })?;

    let record = FutureRecord {
        topic,
        key,
        payload: Some(&payload),
        timestamp: None,
        partition: None,
        headers: None,
    };

    let delivery = producer
        .send_result(record)
        .map_err(|(error, _)| KafkaProduceError::KafkaProduceError { error })?;

    match delivery.await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err((error, _))) => Err(KafkaProduceError::KafkaProduceError { error }),
        Err(_) => Err(KafkaProduceError::KafkaProduceCanceled),
    }
}

/// Block until every queued message has been delivered or `timeout` expires.
pub fn flush_producer(
    producer: &FutureProducer<KafkaContext>,
    timeout: Duration,
) -> Result<(), KafkaError> {
    producer.flush(Timeout::After(timeout))
}
