use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::scrap::{Scrap, StorageLocator};

/// Record of a scrap whose processing failed. The backing storage is left in
/// place, so `storage_info` still points at a live payload that can be replayed.
#[derive(Serialize, Debug, Clone)]
pub struct ScrapDeadLetter {
    pub scrap: Scrap,
    pub storage_info: StorageLocator,
    pub stage: String,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl ScrapDeadLetter {
    pub fn new(scrap: &Scrap, storage_info: &StorageLocator, stage: &str, error: &str) -> Self {
        Self {
            scrap: scrap.clone(),
            storage_info: storage_info.clone(),
            stage: stage.to_owned(),
            error: error.to_owned(),
            failed_at: Utc::now(),
        }
    }
}
