use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coerce;
use tidemark_common::error::{TidemarkError, TidemarkResult};
use tidemark_common::types::UpstreamItem;

pub const SCOPE: &str = "organizations";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub logo_url: Option<String>,
    pub founded_on: Option<NaiveDate>,
    pub tags: Value,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    pub fn from_item(item: &UpstreamItem, synced_at: DateTime<Utc>) -> TidemarkResult<Self> {
        let id = item.external_id.parse::<i64>().map_err(|_| {
            TidemarkError::Validation(format!("organization id {:?} is not numeric", item.external_id))
        })?;
        let name = coerce::text(item, "name").unwrap_or_else(|| format!("organization #{id}"));

        Ok(Self {
            id,
            name,
            description: coerce::text(item, "description"),
            website: coerce::text(item, "website"),
            email: coerce::text(item, "email"),
            phone: coerce::text(item, "phone"),
            address: coerce::text(item, "address"),
            logo_url: coerce::text(item, "logo_url"),
            founded_on: coerce::optional_date(item, "founded_on"),
            tags: coerce::json_list(item, "tags"),
            created_at: coerce::created_at(item, "created", synced_at),
        })
    }
}
