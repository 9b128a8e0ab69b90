use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tidemark_common::types::UpstreamItem;
use tidemark_db::news::models::SCOPE;

use super::{updated_at, ListingSource, UpstreamRecord};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsRecord {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub body: Option<String>,
    pub source_url: Option<String>,
    pub image_url: Option<String>,
    pub published_on: Option<String>,
    pub created: Option<String>,
    pub updated_at: Option<String>,
}

impl UpstreamRecord for NewsRecord {
    const SCOPE: &'static str = SCOPE;
    const LIST_PATH: &'static str = "/news";

    fn external_id(&self) -> Option<String> {
        self.id.map(|id| id.to_string())
    }

    fn into_item(self, external_id: String, fetched_at: DateTime<Utc>) -> UpstreamItem {
        UpstreamItem::new(external_id, updated_at(self.updated_at.as_deref(), fetched_at))
            .with_text("title", self.title)
            .with_text("summary", self.summary)
            .with_text("body", self.body)
            .with_text("source_url", self.source_url)
            .with_text("image_url", self.image_url)
            .with_text("published_on", self.published_on)
            .with_text("created", self.created)
    }
}

pub type NewsSource = ListingSource<NewsRecord>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn into_item_keeps_upstream_updated_at() {
        let record: NewsRecord = serde_json::from_value(json!({
            "id": 11,
            "title": "Launch",
            "image_url": "",
            "published_on": "2024-02-10",
            "updated_at": "2024-02-11T08:30:00Z"
        }))
        .unwrap();

        let item = record.into_item("11".to_string(), Utc::now());
        assert_eq!(item.str_field("title"), Some("Launch"));
        assert_eq!(item.str_field("published_on"), Some("2024-02-10"));
        assert!(!item.payload.contains_key("image_url"));
        assert_eq!(item.updated_at.to_rfc3339(), "2024-02-11T08:30:00+00:00");
    }

    #[test]
    fn unexpected_field_types_fail_to_decode() {
        let result = serde_json::from_value::<NewsRecord>(json!({ "id": "not-a-number" }));
        assert!(result.is_err());
    }
}
