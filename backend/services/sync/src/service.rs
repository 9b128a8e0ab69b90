use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;

use tidemark_common::types::UpstreamItem;
use tidemark_db::sync::repositories::MirrorRepository;

use crate::connector::{Connector, SyncError};
use crate::sources::Source;

/// How far back an incremental run looks when the scope has no usable watermark.
pub const DEFAULT_LOOKBACK_HOURS: i64 = 24;

/// Moves one domain from its source into its repository.
pub struct SyncService<S, R> {
    source: S,
    repo: R,
    reconcile: bool,
}

impl<S, R> SyncService<S, R>
where
    S: Source,
    R: MirrorRepository,
{
    pub fn new(source: S, repo: R) -> Self {
        Self {
            source,
            repo,
            reconcile: false,
        }
    }

    /// Delete local records missing from upstream after each full run.
    /// Ignored for repositories without reconciliation support.
    pub fn with_reconciliation(mut self, enabled: bool) -> Self {
        self.reconcile = enabled;
        self
    }

    async fn start_watermark(&self, started: DateTime<Utc>) -> DateTime<Utc> {
        let fallback = started - Duration::hours(DEFAULT_LOOKBACK_HOURS);
        match self.repo.last_incremental_watermark().await {
            Ok(Some(watermark)) => watermark,
            Ok(None) => fallback,
            Err(e) => {
                tracing::warn!(scope = self.scope(), error = %e, "could not read watermark, using lookback");
                fallback
            }
        }
    }

    async fn reconcile(&self, items: &[UpstreamItem]) -> Result<(), SyncError> {
        if !self.reconcile {
            return Ok(());
        }
        if !self.repo.supports_reconciliation() {
            tracing::debug!(scope = self.scope(), "reconciliation not supported, skipping");
            return Ok(());
        }
        if items.is_empty() {
            tracing::warn!(scope = self.scope(), "reconciling against an empty listing, all rows will be removed");
        }

        let keep: HashSet<String> = items.iter().map(|i| i.external_id.clone()).collect();
        let deleted = self
            .repo
            .soft_delete_missing(&keep)
            .await
            .map_err(SyncError::Reconcile)?;
        tracing::info!(scope = self.scope(), deleted, "removed records missing upstream");
        Ok(())
    }
}

#[async_trait]
impl<S, R> Connector for SyncService<S, R>
where
    S: Source,
    R: MirrorRepository,
{
    fn scope(&self) -> &str {
        self.source.scope()
    }

    async fn full_sync(&self, cancel: &CancellationToken) -> Result<usize, SyncError> {
        let started = Utc::now();

        let items = self.source.fetch_full(cancel).await.map_err(|e| {
            tracing::error!(scope = self.scope(), error = %e, "full fetch failed");
            SyncError::Fetch(e)
        })?;

        self.repo
            .upsert_batch(&items)
            .await
            .map_err(SyncError::Persist)?;

        self.reconcile(&items).await?;

        let upserted = items.len();
        self.repo
            .update_incremental_watermark(started)
            .await
            .map_err(|source| SyncError::Watermark { upserted, source })?;

        tracing::info!(scope = self.scope(), upserted, "full sync completed");
        Ok(upserted)
    }

    async fn incremental_sync(&self, cancel: &CancellationToken) -> Result<usize, SyncError> {
        let started = Utc::now();
        let since = self.start_watermark(started).await;

        let items = self
            .source
            .fetch_incremental(cancel, since)
            .await
            .map_err(|e| {
                tracing::error!(scope = self.scope(), error = %e, "incremental fetch failed");
                SyncError::Fetch(e)
            })?;

        self.repo
            .upsert_batch(&items)
            .await
            .map_err(SyncError::Persist)?;

        let upserted = items.len();
        let watermark = items
            .iter()
            .map(|i| i.updated_at)
            .max()
            .map_or(started, |latest| latest.max(started));

        self.repo
            .update_incremental_watermark(watermark)
            .await
            .map_err(|source| SyncError::Watermark { upserted, source })?;

        tracing::info!(scope = self.scope(), upserted, %since, %watermark, "incremental sync completed");
        Ok(upserted)
    }
}
