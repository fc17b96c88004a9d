use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time;

use envconfig::Envconfig;
use scrap_common::config::{ConsumerConfig, KafkaConfig};

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3302")]
    pub port: u16,

    #[envconfig(default = "scrap-worker")]
    pub worker_name: String,

    #[envconfig(default = "100")]
    pub max_concurrent_scraps: NonZeroUsize,

    #[envconfig(default = "100")]
    pub max_poll_records: NonZeroUsize,

    #[envconfig(default = "1000")]
    pub poll_timeout: EnvMsDuration,

    /// How long the processing loop, and the consumer it polls, may go without
    /// reporting before liveness fails. Must outlast the slowest expected batch.
    #[envconfig(default = "60000")]
    pub liveness_deadline: EnvMsDuration,

    /// Parsed into a `StorageProvider` when the storage gateway is built.
    #[envconfig(default = "smb")]
    pub storage_provider: String,

    /// `unc` or `mounted`. Picked from the platform when unset.
    pub share_path_style: Option<String>,

    #[envconfig(default = "/tmp")]
    pub scratch_dir: String,

    #[envconfig(default = "scrap_processed")]
    pub notification_topic: NonEmptyString,

    pub dead_letter_topic: Option<NonEmptyString>,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    #[envconfig(nested = true)]
    pub consumer: ConsumerConfig,

    #[envconfig(nested = true)]
    pub object_store: ObjectStoreConfig,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Envconfig, Clone)]
pub struct ObjectStoreConfig {
    #[envconfig(from = "OBJECT_STORE_ENDPOINT", default = "http://localhost:9000")]
    pub endpoint: String,

    #[envconfig(from = "OBJECT_STORE_ACCESS_KEY", default = "minioadmin")]
    pub access_key: String,

    #[envconfig(from = "OBJECT_STORE_SECRET_KEY", default = "minioadmin")]
    pub secret_key: String,

    #[envconfig(from = "OBJECT_STORE_REGION", default = "us-east-1")]
    pub region: String,

    // MinIO only serves path-style bucket addressing
    #[envconfig(from = "OBJECT_STORE_FORCE_PATH_STYLE", default = "true")]
    pub force_path_style: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::error::ConfigError;
    use crate::storage::build_gateway;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::init_from_hashmap(&vars).unwrap()
    }

    #[test]
    fn defaults() {
        let config = config_from(&[]);

        assert_eq!(config.bind(), "0.0.0.0:3302");
        assert_eq!(config.max_concurrent_scraps.get(), 100);
        assert_eq!(config.max_poll_records.get(), 100);
        assert_eq!(config.poll_timeout.0, time::Duration::from_millis(1000));
        assert_eq!(config.storage_provider, "smb");
        assert_eq!(config.notification_topic.as_str(), "scrap_processed");
        assert!(config.dead_letter_topic.is_none());
        assert_eq!(config.consumer.kafka_consumer_topic, "scraps");
        assert_eq!(config.consumer.kafka_consumer_group, "processing_group");
        assert!(config.object_store.force_path_style);
        assert_eq!(config.liveness_deadline.0, time::Duration::from_secs(60));
    }

    #[test]
    fn zero_limits_fail_start_up() {
        for var in ["MAX_CONCURRENT_SCRAPS", "MAX_POLL_RECORDS"] {
            let vars = HashMap::from([(var.to_owned(), "0".to_owned())]);
            assert!(
                Config::init_from_hashmap(&vars).is_err(),
                "{var}=0 should be rejected"
            );
        }

        let config = config_from(&[("MAX_CONCURRENT_SCRAPS", "1"), ("MAX_POLL_RECORDS", "1")]);
        assert_eq!(config.max_concurrent_scraps.get(), 1);
        assert_eq!(config.max_poll_records.get(), 1);
    }

    #[test]
    fn unknown_storage_provider_fails_gateway_construction() {
        let config = config_from(&[("STORAGE_PROVIDER", "ftp")]);

        assert_eq!(
            build_gateway(&config).err(),
            Some(ConfigError::UnknownStorageProvider("ftp".to_owned()))
        );
    }

    #[test]
    fn provider_and_path_style_are_case_insensitive() {
        let config = config_from(&[("STORAGE_PROVIDER", "SMB"), ("SHARE_PATH_STYLE", "Mounted")]);
        assert!(build_gateway(&config).is_ok());

        let config = config_from(&[("STORAGE_PROVIDER", "smb"), ("SHARE_PATH_STYLE", "floppy")]);
        assert_eq!(
            build_gateway(&config).err(),
            Some(ConfigError::UnknownSharePathStyle("floppy".to_owned()))
        );
    }

    #[test]
    fn parses_millisecond_durations() {
        let duration: EnvMsDuration = "1500".parse().unwrap();
        assert_eq!(duration.0, time::Duration::from_millis(1500));

        assert_eq!(
            "1.5s".parse::<EnvMsDuration>().unwrap_err(),
            ParseEnvMsDurationError
        );
    }

    #[test]
    fn rejects_empty_topic_names() {
        assert_eq!(
            "".parse::<NonEmptyString>().unwrap_err(),
            StringIsEmptyError
        );
        assert_eq!(
            "scrap_processed".parse::<NonEmptyString>().unwrap().as_str(),
            "scrap_processed"
        );
    }
}
