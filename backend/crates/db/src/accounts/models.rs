use serde::{Deserialize, Serialize};

use crate::coerce;
use tidemark_common::error::{TidemarkError, TidemarkResult};
use tidemark_common::types::UpstreamItem;

pub const SCOPE: &str = "accounts";

pub const DEFAULT_ROLE: &str = "member";

/// The upstream-owned part of a local account.
///
/// Credentials and the local primary key are not represented here; a sync can
/// only ever touch the fields below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
    pub person_id: Option<i64>,
    pub organization_id: Option<i64>,
}

impl AccountProfile {
    pub fn from_item(item: &UpstreamItem) -> TidemarkResult<Self> {
        let email = normalize_email(&item.external_id).ok_or_else(|| {
            TidemarkError::Validation(format!("account key {:?} is not an email", item.external_id))
        })?;

        Ok(Self {
            email,
            display_name: coerce::text(item, "display_name"),
            role: coerce::text(item, "role").unwrap_or_else(|| DEFAULT_ROLE.to_owned()),
            person_id: coerce::int(item, "person_id"),
            organization_id: coerce::int(item, "organization_id"),
        })
    }
}

/// Trimmed, lower-cased email, or `None` when the value is not email-shaped.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn normalize_email_lowercases_and_validates() {
        assert_eq!(normalize_email(" Ada@Example.COM "), Some("ada@example.com".to_string()));
        assert_eq!(normalize_email("no-at-sign"), None);
        assert_eq!(normalize_email("@example.com"), None);
        assert_eq!(normalize_email("a@b@c"), None);
    }

    #[test]
    fn from_item_defaults_role() {
        let item = UpstreamItem::new("ada@example.com", Utc::now())
            .with_field("display_name", "Ada")
            .with_field("person_id", 10);

        let profile = AccountProfile::from_item(&item).unwrap();
        assert_eq!(profile.role, DEFAULT_ROLE);
        assert_eq!(profile.person_id, Some(10));
        assert_eq!(profile.organization_id, None);
    }
}
