use serde::{Deserialize, Serialize};

use crate::scrap::Scrap;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScrapStatus {
    Processed,
}

/// Completion notification, one per scrap that went through every applicable stage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScrapProcessed {
    pub scrap_id: String,
    pub hash: String,
    pub status: ScrapStatus,
}

impl From<&Scrap> for ScrapProcessed {
    fn from(scrap: &Scrap) -> Self {
        Self {
            scrap_id: scrap.id.clone(),
            hash: scrap.hash.clone(),
            status: ScrapStatus::Processed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_to_the_notification_schema() {
        let notification = ScrapProcessed::from(&Scrap::new("17", "cafe"));

        assert_eq!(
            serde_json::to_value(&notification).unwrap(),
            json!({"scrap_id": "17", "hash": "cafe", "status": "PROCESSED"})
        );
    }
}
