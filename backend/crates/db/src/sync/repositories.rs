use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::sync::models::SyncState;
use tidemark_common::error::{TidemarkError, TidemarkResult};
use tidemark_common::types::UpstreamItem;

#[async_trait]
pub trait SyncStateRepository: Send + Sync {
    /// Current watermark for `name`, `None` if the scope was never synced.
    async fn get(&self, name: &str) -> TidemarkResult<Option<SyncState>>;

    /// Insert or overwrite the watermark for `name`.
    async fn put(&self, name: &str, watermark: DateTime<Utc>) -> TidemarkResult<SyncState>;
}

/// Write side of one mirrored entity domain.
#[async_trait]
pub trait MirrorRepository: Send + Sync {
    fn scope(&self) -> &str;

    /// Idempotent per item. Items are written one by one and the first
    /// failure aborts the batch.
    async fn upsert_batch(&self, items: &[UpstreamItem]) -> TidemarkResult<()>;

    /// `Ok(None)` means "never synced" and is not an error.
    async fn last_incremental_watermark(&self) -> TidemarkResult<Option<DateTime<Utc>>>;

    async fn update_incremental_watermark(&self, watermark: DateTime<Utc>) -> TidemarkResult<()>;

    fn supports_reconciliation(&self) -> bool {
        false
    }

    /// Delete every stored record whose key is not in `keep`. Returns the
    /// number of deleted rows.
    ///
    /// Only valid right after a complete listing of the upstream collection;
    /// a partial keep-set deletes live records.
    async fn soft_delete_missing(&self, _keep: &HashSet<String>) -> TidemarkResult<u64> {
        Err(TidemarkError::Validation(format!(
            "scope {} does not support reconciliation",
            self.scope()
        )))
    }
}

/// Keys present in `stored` but absent from `keep`, in stored order.
pub fn missing_keys<I>(stored: I, keep: &HashSet<String>) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    stored.into_iter().filter(|k| !keep.contains(k)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn keep_set_equal_to_stored_removes_nothing() {
        let stored = keys(&["1", "2", "3"]);
        let keep: HashSet<String> = stored.iter().cloned().collect();
        assert!(missing_keys(stored, &keep).is_empty());
    }

    #[test]
    fn empty_keep_set_removes_everything() {
        let stored = keys(&["1", "2", "3"]);
        assert_eq!(missing_keys(stored.clone(), &HashSet::new()), stored);
    }

    #[test]
    fn only_absent_keys_are_reported() {
        let keep: HashSet<String> = keys(&["2", "9"]).into_iter().collect();
        assert_eq!(missing_keys(keys(&["1", "2", "3"]), &keep), keys(&["1", "3"]));
    }
}
