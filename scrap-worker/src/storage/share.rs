use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use scrap_common::scrap::StorageLocator;
use tracing::debug;

use super::{remove_local_file, StorageError, StorageGateway, StorageProvider};
use crate::error::ConfigError;

/// Which of the two paths published for a share-based scrap this host can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharePathStyle {
    /// `\\server\share\...`, for Windows hosts.
    Unc,
    /// A path under the local mount point of the share.
    Mounted,
}

impl SharePathStyle {
    pub fn for_platform() -> Self {
        if cfg!(windows) {
            SharePathStyle::Unc
        } else {
            SharePathStyle::Mounted
        }
    }
}

impl FromStr for SharePathStyle {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unc" => Ok(SharePathStyle::Unc),
            "mounted" => Ok(SharePathStyle::Mounted),
            _ => Err(ConfigError::UnknownSharePathStyle(s.to_owned())),
        }
    }
}

/// Payloads living on a file share the worker can already read: resolving is a
/// field lookup, releasing deletes the file.
pub struct ShareGateway {
    style: SharePathStyle,
}

impl ShareGateway {
    pub fn new(style: SharePathStyle) -> Self {
        Self { style }
    }

    fn path_for(&self, locator: &StorageLocator) -> Result<PathBuf, StorageError> {
        let StorageLocator::Share {
            mounted_path,
            unc_path,
        } = locator
        else {
            return Err(StorageError::ProviderMismatch {
                provider: StorageProvider::Share,
                locator: locator.kind(),
            });
        };

        let path = match self.style {
            SharePathStyle::Unc => unc_path.as_ref().ok_or(StorageError::MissingField("unc_path")),
            SharePathStyle::Mounted => mounted_path
                .as_ref()
                .ok_or(StorageError::MissingField("mounted_path")),
        }?;

        Ok(PathBuf::from(path))
    }
}

#[async_trait]
impl StorageGateway for ShareGateway {
    async fn resolve(&self, locator: &StorageLocator) -> Result<PathBuf, StorageError> {
        self.path_for(locator)
    }

    async fn release(&self, locator: &StorageLocator) -> Result<(), StorageError> {
        let path = self.path_for(locator)?;
        remove_local_file(&path).await?;
        debug!("removed {} from the share", path.display());
        Ok(())
    }

    async fn discard(&self, _: &StorageLocator) -> Result<(), StorageError> {
        // Share paths are read in place, there is no local copy.
        Ok(())
    }
}
