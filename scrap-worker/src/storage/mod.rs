//! Turning storage locators into local files, and reclaiming them afterwards.
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use scrap_common::scrap::StorageLocator;
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::error::ConfigError;

pub mod object_store;
pub mod share;

use object_store::{ObjectStoreGateway, S3ObjectStore};
use share::{SharePathStyle, ShareGateway};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage locator has no {0}")]
    MissingField(&'static str),
    #[error("{provider} storage cannot resolve a {locator} locator")]
    ProviderMismatch {
        provider: StorageProvider,
        locator: &'static str,
    },
    #[error("object name {0} does not map to a scratch path")]
    InvalidObjectName(String),
    #[error("object store request failed: {0}")]
    ObjectStoreError(String),
    #[error("local storage I/O failed: {0}")]
    IoError(#[from] std::io::Error),
}

/// Resolves where a scrap's payload can be read from, and releases the backing
/// storage once the scrap has been processed.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Produce a local path for the payload. May download it first.
    async fn resolve(&self, locator: &StorageLocator) -> Result<PathBuf, StorageError>;

    /// Delete the payload. Releasing something already gone is not an error.
    async fn release(&self, locator: &StorageLocator) -> Result<(), StorageError>;

    /// Drop whatever local copy `resolve` made, leaving the payload itself in place.
    async fn discard(&self, locator: &StorageLocator) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageProvider {
    /// A file share (SMB) reachable through a mount point or a UNC path.
    Share,
    /// An S3-compatible object store such as MinIO.
    ObjectStore,
}

impl FromStr for StorageProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "smb" | "share" => Ok(StorageProvider::Share),
            "minio" | "s3" | "object-store" | "object_store" => Ok(StorageProvider::ObjectStore),
            _ => Err(ConfigError::UnknownStorageProvider(s.to_owned())),
        }
    }
}

impl fmt::Display for StorageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageProvider::Share => write!(f, "share"),
            StorageProvider::ObjectStore => write!(f, "object-store"),
        }
    }
}

/// Build the one gateway this worker will use, from `STORAGE_PROVIDER`.
pub fn build_gateway(config: &Config) -> Result<Arc<dyn StorageGateway>, ConfigError> {
    let provider = StorageProvider::from_str(&config.storage_provider)?;

    let gateway: Arc<dyn StorageGateway> = match provider {
        StorageProvider::Share => {
            let style = match &config.share_path_style {
                Some(style) => SharePathStyle::from_str(style)?,
                None => SharePathStyle::for_platform(),
            };
            info!("resolving scraps from a file share using {:?} paths", style);
            Arc::new(ShareGateway::new(style))
        }
        StorageProvider::ObjectStore => {
            let client = S3ObjectStore::from_config(&config.object_store);
            info!(
                "resolving scraps from object store at {}, scratch dir {}",
                config.object_store.endpoint, config.scratch_dir
            );
            Arc::new(ObjectStoreGateway::new(client, Path::new(&config.scratch_dir)))
        }
    };

    Ok(gateway)
}

/// Remove a local file, treating one that is already gone as removed.
pub(crate) async fn remove_local_file(path: &Path) -> Result<(), StorageError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::IoError(e)),
    }
}
