use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::coerce;
use tidemark_common::error::{TidemarkError, TidemarkResult};
use tidemark_common::types::UpstreamItem;

pub const SCOPE: &str = "people";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: String,
    pub email: Option<String>,
    pub position: Option<String>,
    pub organization_id: Option<i64>,
    pub photo_url: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Person {
    pub fn from_item(item: &UpstreamItem, synced_at: DateTime<Utc>) -> TidemarkResult<Self> {
        let id = item.external_id.parse::<i64>().map_err(|_| {
            TidemarkError::Validation(format!("person id {:?} is not numeric", item.external_id))
        })?;
        let first_name = coerce::text(item, "first_name");
        let last_name = coerce::text(item, "last_name");
        let email = coerce::text(item, "email");

        Ok(Self {
            id,
            full_name: full_name(first_name.as_deref(), last_name.as_deref(), email.as_deref(), id),
            first_name,
            last_name,
            email,
            position: coerce::text(item, "position"),
            organization_id: coerce::int(item, "organization_id"),
            photo_url: coerce::text(item, "photo_url"),
            birth_date: coerce::optional_date(item, "birth_date"),
            created_at: coerce::created_at(item, "created", synced_at),
        })
    }
}

/// Display name: "first last", else the email, else a placeholder built from the id.
fn full_name(first: Option<&str>, last: Option<&str>, email: Option<&str>, id: i64) -> String {
    let joined = [first, last].into_iter().flatten().collect::<Vec<_>>().join(" ");
    if !joined.is_empty() {
        return joined;
    }
    email.map(str::to_owned).unwrap_or_else(|| format!("person #{id}"))
}
