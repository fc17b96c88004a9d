use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use aws_config::{retry::RetryConfig, BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::Client as S3Client;
use scrap_common::scrap::StorageLocator;
use tracing::{debug, warn};

use super::{remove_local_file, StorageError, StorageGateway, StorageProvider};
use crate::config::ObjectStoreConfig;

/// The two object store operations the worker needs. Lets the gateway be tested
/// without a running object store.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Download `bucket/key` into the file at `dest`, replacing it if present.
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), StorageError>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
}

pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &ObjectStoreConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "environment",
        );
        let s3_config = aws_sdk_s3::config::Builder::new()
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .behavior_version(BehaviorVersion::latest())
            .retry_config(RetryConfig::standard())
            .force_path_style(config.force_path_style)
            .endpoint_url(&config.endpoint)
            .build();

        Self::new(S3Client::from_conf(s3_config))
    }
}

#[async_trait]
impl ObjectStoreClient for S3ObjectStore {
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), StorageError> {
        let object = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                StorageError::ObjectStoreError(format!("failed to get {bucket}/{key}: {e}"))
            })?;

        let body = object.body.collect().await.map_err(|e| {
            StorageError::ObjectStoreError(format!("failed to read body of {bucket}/{key}: {e}"))
        })?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, body.into_bytes()).await?;

        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                StorageError::ObjectStoreError(format!("failed to delete {bucket}/{key}: {e}"))
            })?;

        Ok(())
    }
}

/// Payloads held in an object store. Resolving downloads the object to a scratch
/// file at `<scratch_dir>/<bucket>/<key>`; releasing deletes both the object and
/// the scratch file, discarding only the scratch file.
pub struct ObjectStoreGateway<C> {
    client: C,
    scratch_dir: PathBuf,
}

impl<C: ObjectStoreClient> ObjectStoreGateway<C> {
    pub fn new(client: C, scratch_dir: &Path) -> Self {
        Self {
            client,
            scratch_dir: scratch_dir.to_path_buf(),
        }
    }

    /// Where `bucket/object_name` is downloaded to. Names that would escape the
    /// scratch directory, or a bucket directory other than their own, are refused.
    pub fn scratch_path(&self, bucket: &str, object_name: &str) -> Result<PathBuf, StorageError> {
        let bucket_dir = Path::new(bucket);
        let mut bucket_components = bucket_dir.components();
        let bucket_is_one_dir = matches!(bucket_components.next(), Some(Component::Normal(_)))
            && bucket_components.next().is_none();

        let relative = Path::new(object_name);
        let contained = !object_name.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));

        if !bucket_is_one_dir || !contained {
            return Err(StorageError::InvalidObjectName(format!(
                "{bucket}/{object_name}"
            )));
        }

        Ok(self.scratch_dir.join(bucket_dir).join(relative))
    }
}

fn object_parts(locator: &StorageLocator) -> Result<(&str, &str), StorageError> {
    match locator {
        StorageLocator::ObjectStore {
            bucket_name,
            object_name,
        } => Ok((bucket_name.as_str(), object_name.as_str())),
        other => Err(StorageError::ProviderMismatch {
            provider: StorageProvider::ObjectStore,
            locator: other.kind(),
        }),
    }
}

#[async_trait]
impl<C: ObjectStoreClient> StorageGateway for ObjectStoreGateway<C> {
    async fn resolve(&self, locator: &StorageLocator) -> Result<PathBuf, StorageError> {
        let (bucket, key) = object_parts(locator)?;
        let dest = self.scratch_path(bucket, key)?;

        if let Err(e) = self.client.download(bucket, key, &dest).await {
            // A failed download may have left part of the object behind.
            if let Err(cleanup) = remove_local_file(&dest).await {
                warn!("failed to remove partial download {}: {}", dest.display(), cleanup);
            }
            return Err(e);
        }
        debug!("downloaded {}/{} to {}", bucket, key, dest.display());

        Ok(dest)
    }

    async fn release(&self, locator: &StorageLocator) -> Result<(), StorageError> {
        let (bucket, key) = object_parts(locator)?;

        self.client.delete(bucket, key).await?;
        remove_local_file(&self.scratch_path(bucket, key)?).await?;
        debug!("removed {}/{} and its scratch copy", bucket, key);

        Ok(())
    }

    async fn discard(&self, locator: &StorageLocator) -> Result<(), StorageError> {
        let (bucket, key) = object_parts(locator)?;

        remove_local_file(&self.scratch_path(bucket, key)?).await?;
        debug!("discarded scratch copy of {}/{}", bucket, key);

        Ok(())
    }
}
