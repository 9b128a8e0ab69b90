use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tidemark_common::types::UpstreamItem;
use tidemark_db::organizations::models::SCOPE;

use super::{present, updated_at, ListingSource, UpstreamRecord};

/// An organization as returned by `GET /organizations/{id}`. The listing only
/// carries `id` and `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationRecord {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub logo_url: Option<String>,
    pub founded_on: Option<String>,
    pub created: Option<String>,
    pub tags: Option<Value>,
    pub updated_at: Option<String>,
}

impl UpstreamRecord for OrganizationRecord {
    const SCOPE: &'static str = SCOPE;
    const LIST_PATH: &'static str = "/organizations";
    const DETAIL: bool = true;

    fn external_id(&self) -> Option<String> {
        self.id.map(|id| id.to_string())
    }

    fn into_item(self, external_id: String, fetched_at: DateTime<Utc>) -> UpstreamItem {
        UpstreamItem::new(external_id, updated_at(self.updated_at.as_deref(), fetched_at))
            .with_text("name", self.name)
            .with_text("description", self.description)
            .with_text("website", self.website)
            .with_text("email", self.email)
            .with_text("phone", self.phone)
            .with_text("address", self.address)
            .with_text("logo_url", self.logo_url)
            .with_text("founded_on", self.founded_on)
            .with_text("created", self.created)
            .with_optional("tags", present(self.tags))
    }
}

pub type OrganizationSource = ListingSource<OrganizationRecord>;
