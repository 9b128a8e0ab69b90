use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tidemark_common::types::UpstreamItem;
use tidemark_db::accounts::models::{normalize_email, SCOPE};

use super::{present, updated_at, ListingSource, UpstreamRecord};

/// Account entries are keyed by email rather than by numeric id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub person_id: Option<Value>,
    pub organization_id: Option<Value>,
    pub updated_at: Option<String>,
}

impl UpstreamRecord for AccountRecord {
    const SCOPE: &'static str = SCOPE;
    const LIST_PATH: &'static str = "/accounts";

    fn external_id(&self) -> Option<String> {
        self.email.as_deref().and_then(normalize_email)
    }

    fn into_item(self, external_id: String, fetched_at: DateTime<Utc>) -> UpstreamItem {
        let updated = updated_at(self.updated_at.as_deref(), fetched_at);
        UpstreamItem::new(external_id.clone(), updated)
            .with_field("email", external_id)
            .with_text("display_name", self.display_name)
            .with_text("role", self.role)
            .with_optional("person_id", present(self.person_id))
            .with_optional("organization_id", present(self.organization_id))
    }
}

pub type AccountSource = ListingSource<AccountRecord>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::testing::client_for;
    use crate::sources::Source;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn external_id_is_lowercased_email() {
        let record: AccountRecord =
            serde_json::from_value(json!({ "email": "  Ada@Example.COM " })).unwrap();
        assert_eq!(record.external_id().as_deref(), Some("ada@example.com"));

        let invalid: AccountRecord = serde_json::from_value(json!({ "email": "nope" })).unwrap();
        assert_eq!(invalid.external_id(), None);
    }

    #[tokio::test]
    async fn fetch_keys_accounts_by_email() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/accounts"))
            .and(query_param("skip", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "email": "Grace@Example.com", "display_name": "Grace", "role": "admin", "person_id": 3 },
                { "email": null, "display_name": "ghost" }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/accounts"))
            .and(query_param("skip", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let items = AccountSource::new(client_for(&server))
            .fetch_full(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        let grace = &items[0];
        assert_eq!(grace.external_id, "grace@example.com");
        assert_eq!(grace.str_field("email"), Some("grace@example.com"));
        assert_eq!(grace.str_field("role"), Some("admin"));
        assert_eq!(grace.get("person_id"), Some(&json!(3)));
        assert!(!grace.payload.contains_key("organization_id"));
    }
}
