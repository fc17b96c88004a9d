use metrics_exporter_prometheus::BuildError;
use rdkafka::error::KafkaError;
use scrap_common::kafka_producer::KafkaProduceError;
use thiserror::Error;

/// Errors that stop the worker. Everything scoped to a single scrap is handled
/// inside the pipeline and never surfaces here.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("failed to read configuration from the environment: {0}")]
    EnvError(#[from] envconfig::Error),
    #[error("invalid configuration: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("failed to install the metrics recorder: {0}")]
    MetricsError(#[from] BuildError),
    #[error("a kafka error occurred while consuming scraps: {0}")]
    KafkaError(#[from] KafkaError),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported storage provider: {0}")]
    UnknownStorageProvider(String),
    #[error("unsupported share path style: {0}")]
    UnknownSharePathStyle(String),
}

/// A processor stage could not handle a scrap.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("stage {stage} failed: {message}")]
pub struct StageError {
    pub stage: String,
    pub message: String,
}

impl StageError {
    pub fn new(stage: &str, message: impl ToString) -> Self {
        Self {
            stage: stage.to_owned(),
            message: message.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error(transparent)]
    ProduceError(#[from] KafkaProduceError),
}
