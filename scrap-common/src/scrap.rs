//! The unit of work flowing through the pipeline and the envelope it arrives in.
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// A scrap: some content stored outside of Kafka, identified by `id` and
/// fingerprinted by `hash`. Two deliveries with the same `hash` carry the same
/// logical content.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Scrap {
    #[serde(deserialize_with = "deserialize_scrap_id")]
    pub id: String,
    pub hash: String,
    /// Every other field of the scrap's own schema, passed through to stages untouched.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    /// Local path of the payload, only known once storage has been resolved.
    #[serde(skip)]
    pub file_path: Option<PathBuf>,
}

impl Scrap {
    pub fn new(id: &str, hash: &str) -> Self {
        Self {
            id: id.to_owned(),
            hash: hash.to_owned(),
            fields: Map::new(),
            file_path: None,
        }
    }
}

fn deserialize_scrap_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ScrapId {
        Text(String),
        Number(Number),
    }

    Ok(match ScrapId::deserialize(deserializer)? {
        ScrapId::Text(id) => id,
        ScrapId::Number(id) => id.to_string(),
    })
}

/// Where the payload of a scrap lives. The shape depends on the storage provider
/// that published it, so the variant is picked from the fields present.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StorageLocator {
    ObjectStore {
        bucket_name: String,
        object_name: String,
    },
    Share {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mounted_path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unc_path: Option<String>,
    },
}

impl StorageLocator {
    pub fn kind(&self) -> &'static str {
        match self {
            StorageLocator::ObjectStore { .. } => "object-store",
            StorageLocator::Share { .. } => "share",
        }
    }
}

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("message has no payload")]
    Empty,
    #[error("message is not a valid scrap envelope: {0}")]
    Json(#[from] serde_json::Error),
    #[error("scrap envelope has no storage_info")]
    MissingStorageInfo,
}

/// The JSON document published on the scraps topic.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScrapEnvelope {
    /// The scrap itself, either inline or as a JSON-encoded string.
    pub scrap_data: Value,
    #[serde(default)]
    pub storage_info: Option<StorageLocator>,
}

impl ScrapEnvelope {
    pub fn decode(payload: Option<&[u8]>) -> Result<Self, EnvelopeError> {
        let payload = payload.ok_or(EnvelopeError::Empty)?;
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn scrap(&self) -> Result<Scrap, EnvelopeError> {
        let scrap = match &self.scrap_data {
            Value::String(encoded) => serde_json::from_str(encoded)?,
            inline => Scrap::deserialize(inline)?,
        };
        Ok(scrap)
    }

    pub fn into_parts(self) -> Result<(Scrap, StorageLocator), EnvelopeError> {
        let scrap = self.scrap()?;
        let locator = self.storage_info.ok_or(EnvelopeError::MissingStorageInfo)?;
        Ok((scrap, locator))
    }
}
