use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tidemark_common::types::UpstreamItem;
use tidemark_db::people::models::SCOPE;

use super::{present, updated_at, ListingSource, UpstreamRecord};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub position: Option<String>,
    pub organization_id: Option<Value>,
    pub photo_url: Option<String>,
    pub birth_date: Option<String>,
    pub created: Option<String>,
    pub updated_at: Option<String>,
}

impl UpstreamRecord for PersonRecord {
    const SCOPE: &'static str = SCOPE;
    const LIST_PATH: &'static str = "/people";

    fn external_id(&self) -> Option<String> {
        self.id.map(|id| id.to_string())
    }

    fn into_item(self, external_id: String, fetched_at: DateTime<Utc>) -> UpstreamItem {
        UpstreamItem::new(external_id, updated_at(self.updated_at.as_deref(), fetched_at))
            .with_text("first_name", self.first_name)
            .with_text("last_name", self.last_name)
            .with_text("email", self.email)
            .with_text("position", self.position)
            .with_optional("organization_id", present(self.organization_id))
            .with_text("photo_url", self.photo_url)
            .with_text("birth_date", self.birth_date)
            .with_text("created", self.created)
    }
}

pub type PersonSource = ListingSource<PersonRecord>;
