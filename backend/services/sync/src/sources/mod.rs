pub mod accounts;
pub mod events;
pub mod news;
pub mod organizations;
pub mod people;

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use tidemark_common::types::UpstreamItem;

use crate::upstream::{UpstreamClient, UpstreamError};

/// Read side of one mirrored entity domain.
#[async_trait]
pub trait Source: Send + Sync {
    fn scope(&self) -> &str;

    async fn fetch_full(&self, cancel: &CancellationToken)
        -> Result<Vec<UpstreamItem>, UpstreamError>;

    /// Upstream offers no change feed, so this lists the whole collection.
    async fn fetch_incremental(
        &self,
        cancel: &CancellationToken,
        since: DateTime<Utc>,
    ) -> Result<Vec<UpstreamItem>, UpstreamError> {
        tracing::debug!(scope = self.scope(), %since, "no change feed upstream, listing everything");
        self.fetch_full(cancel).await
    }
}

/// Wire shape of one upstream listing entry.
pub trait UpstreamRecord: DeserializeOwned + Send + 'static {
    const SCOPE: &'static str;
    const LIST_PATH: &'static str;
    /// List entries are incomplete and must be re-read from `{LIST_PATH}/{id}`.
    const DETAIL: bool = false;

    /// `None` marks an entry that cannot be keyed; it is skipped.
    fn external_id(&self) -> Option<String>;

    fn into_item(self, external_id: String, fetched_at: DateTime<Utc>) -> UpstreamItem;
}

/// Paged listing source shared by every domain.
pub struct ListingSource<M> {
    client: UpstreamClient,
    _record: PhantomData<fn() -> M>,
}

impl<M: UpstreamRecord> ListingSource<M> {
    pub fn new(client: UpstreamClient) -> Self {
        Self {
            client,
            _record: PhantomData,
        }
    }
}

#[async_trait]
impl<M: UpstreamRecord> Source for ListingSource<M> {
    fn scope(&self) -> &str {
        M::SCOPE
    }

    async fn fetch_full(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<UpstreamItem>, UpstreamError> {
        let fetched_at = Utc::now();
        let rows = self.client.list_all(cancel, M::LIST_PATH).await?;

        let mut items = Vec::with_capacity(rows.len());
        let mut skipped = 0usize;
        for row in rows {
            let record: M = serde_json::from_value(row)
                .map_err(|e| UpstreamError::Decode(format!("{}: {e}", M::LIST_PATH)))?;

            let Some(external_id) = record.external_id() else {
                skipped += 1;
                continue;
            };

            let record = if M::DETAIL {
                let path = format!("{}/{}", M::LIST_PATH, external_id);
                self.client.get_json::<M>(cancel, &path).await?
            } else {
                record
            };

            items.push(record.into_item(external_id, fetched_at));
        }

        if skipped > 0 {
            tracing::warn!(scope = M::SCOPE, skipped, "skipped upstream entries without a usable key");
        }
        tracing::info!(scope = M::SCOPE, count = items.len(), "fetched upstream items");
        Ok(items)
    }
}

/// Upstream `updated_at` when it parses, otherwise the fetch time.
pub(crate) fn updated_at(raw: Option<&str>, fetched_at: DateTime<Utc>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or(fetched_at)
}

/// Drops JSON nulls and blank strings so they become absent payload keys.
pub(crate) fn present(value: Option<Value>) -> Option<Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        other => other,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn updated_at_falls_back_to_fetch_time() {
        let fetched = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(updated_at(None, fetched), fetched);
        assert_eq!(updated_at(Some("yesterday"), fetched), fetched);
        assert_eq!(
            updated_at(Some("2024-04-30T10:00:00+02:00"), fetched),
            Utc.with_ymd_and_hms(2024, 4, 30, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn present_filters_null_and_blank() {
        assert_eq!(present(None), None);
        assert_eq!(present(Some(Value::Null)), None);
        assert_eq!(present(Some(json!("  "))), None);
        assert_eq!(present(Some(json!(0))), Some(json!(0)));
        assert_eq!(present(Some(json!([]))), Some(json!([])));
    }
}
