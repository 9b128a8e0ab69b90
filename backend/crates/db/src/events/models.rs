use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coerce;
use tidemark_common::error::{TidemarkError, TidemarkResult};
use tidemark_common::types::UpstreamItem;

pub const SCOPE: &str = "events";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub date_range: Option<String>,
    pub starts_on: Option<NaiveDate>,
    pub ends_on: Option<NaiveDate>,
    pub participants: Value,
    pub organization_id: Option<i64>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn from_item(item: &UpstreamItem, synced_at: DateTime<Utc>) -> TidemarkResult<Self> {
        let id = item.external_id.parse::<i64>().map_err(|_| {
            TidemarkError::Validation(format!("event id {:?} is not numeric", item.external_id))
        })?;
        let title = coerce::text(item, "title").unwrap_or_else(|| format!("event #{id}"));
        let date_range = coerce::text(item, "date_range");
        let (starts_on, ends_on) = date_range
            .as_deref()
            .map(coerce::scan_date_range)
            .unwrap_or((None, None));

        Ok(Self {
            id,
            title,
            description: coerce::text(item, "description"),
            location: coerce::text(item, "location"),
            date_range,
            starts_on,
            ends_on,
            participants: coerce::json_list(item, "participants"),
            organization_id: coerce::int(item, "organization_id"),
            image_url: coerce::text(item, "image_url"),
            created_at: coerce::created_at(item, "created", synced_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_item_derives_dates_from_free_text() {
        let item = UpstreamItem::new("21", Utc::now())
            .with_field("title", "Summit")
            .with_field("date_range", "2024-09-12 to 2024-09-14, Lisbon");

        let event = Event::from_item(&item, Utc::now()).unwrap();
        assert_eq!(event.starts_on, NaiveDate::from_ymd_opt(2024, 9, 12));
        assert_eq!(event.ends_on, NaiveDate::from_ymd_opt(2024, 9, 14));
        assert_eq!(event.participants, json!([]));
    }

    #[test]
    fn from_item_keeps_participants() {
        let item = UpstreamItem::new("22", Utc::now())
            .with_field("title", "Meetup")
            .with_field("participants", json!([{ "name": "Ana", "role": "speaker" }]));

        let event = Event::from_item(&item, Utc::now()).unwrap();
        assert_eq!(event.participants[0]["name"], "Ana");
        assert_eq!(event.starts_on, None);
        assert_eq!(event.ends_on, None);
    }

    #[test]
    fn missing_title_gets_placeholder() {
        let event = Event::from_item(&UpstreamItem::new("23", Utc::now()), Utc::now()).unwrap();
        assert_eq!(event.title, "event #23");
    }
}
