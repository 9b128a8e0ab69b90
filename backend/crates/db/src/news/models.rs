use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::coerce;
use tidemark_common::error::{TidemarkError, TidemarkResult};
use tidemark_common::types::UpstreamItem;

pub const SCOPE: &str = "news";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: i64,
    pub title: String,
    pub summary: Option<String>,
    pub body: Option<String>,
    pub source_url: Option<String>,
    pub image_url: Option<String>,
    pub published_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl NewsArticle {
    pub fn from_item(item: &UpstreamItem, synced_at: DateTime<Utc>) -> TidemarkResult<Self> {
        let id = item.external_id.parse::<i64>().map_err(|_| {
            TidemarkError::Validation(format!("news id {:?} is not numeric", item.external_id))
        })?;
        let title = coerce::text(item, "title").unwrap_or_else(|| format!("news #{id}"));

        // Articles without an explicit creation date are dated by publication.
        let created_key = if item.get("created").is_some() {
            "created"
        } else {
            "published_on"
        };

        Ok(Self {
            id,
            title,
            summary: coerce::text(item, "summary"),
            body: coerce::text(item, "body"),
            source_url: coerce::text(item, "source_url"),
            image_url: coerce::text(item, "image_url"),
            published_on: coerce::optional_date(item, "published_on"),
            created_at: coerce::created_at(item, created_key, synced_at),
        })
    }
}
