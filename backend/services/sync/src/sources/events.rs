use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tidemark_common::types::UpstreamItem;
use tidemark_db::events::models::SCOPE;

use super::{present, updated_at, ListingSource, UpstreamRecord};

/// `date_range` is free text such as `"2024-06-01 - 2024-06-03"`; it is
/// passed through untouched and scanned when stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub date_range: Option<String>,
    pub participants: Option<Value>,
    pub organization_id: Option<Value>,
    pub image_url: Option<String>,
    pub created: Option<String>,
    pub updated_at: Option<String>,
}

impl UpstreamRecord for EventRecord {
    const SCOPE: &'static str = SCOPE;
    const LIST_PATH: &'static str = "/events";

    fn external_id(&self) -> Option<String> {
        self.id.map(|id| id.to_string())
    }

    fn into_item(self, external_id: String, fetched_at: DateTime<Utc>) -> UpstreamItem {
        UpstreamItem::new(external_id, updated_at(self.updated_at.as_deref(), fetched_at))
            .with_text("title", self.title)
            .with_text("description", self.description)
            .with_text("location", self.location)
            .with_text("date_range", self.date_range)
            .with_optional("participants", present(self.participants))
            .with_optional("organization_id", present(self.organization_id))
            .with_text("image_url", self.image_url)
            .with_text("created", self.created)
    }
}

pub type EventSource = ListingSource<EventRecord>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn participants_pass_through_in_either_shape() {
        let as_array: EventRecord = serde_json::from_value(json!({
            "id": 1,
            "title": "Summit",
            "participants": [{ "name": "Ada" }]
        }))
        .unwrap();
        let item = as_array.into_item("1".to_string(), Utc::now());
        assert_eq!(item.get("participants"), Some(&json!([{ "name": "Ada" }])));

        let as_string: EventRecord = serde_json::from_value(json!({
            "id": 2,
            "participants": "[\"Grace\"]",
            "date_range": "2024-06-01 - 2024-06-03"
        }))
        .unwrap();
        let item = as_string.into_item("2".to_string(), Utc::now());
        assert_eq!(item.get("participants"), Some(&json!("[\"Grace\"]")));
        assert_eq!(item.str_field("date_range"), Some("2024-06-01 - 2024-06-03"));
    }

    #[test]
    fn null_participants_are_absent() {
        let record: EventRecord =
            serde_json::from_value(json!({ "id": 3, "participants": null })).unwrap();
        let item = record.into_item("3".to_string(), Utc::now());
        assert!(!item.payload.contains_key("participants"));
        assert!(!item.payload.contains_key("title"));
    }
}
