use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use tidemark_common::error::TidemarkError;

use crate::upstream::UpstreamError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] UpstreamError),

    #[error("persist failed: {0}")]
    Persist(#[source] TidemarkError),

    #[error("reconciliation failed: {0}")]
    Reconcile(#[source] TidemarkError),

    #[error("watermark update failed after {upserted} upserts: {source}")]
    Watermark {
        upserted: usize,
        #[source]
        source: TidemarkError,
    },
}

impl SyncError {
    /// Items written before the failure, when that number is known.
    pub fn upserted(&self) -> usize {
        match self {
            SyncError::Watermark { upserted, .. } => *upserted,
            _ => 0,
        }
    }
}

/// One entity domain as seen by the multi-service.
#[async_trait]
pub trait Connector: Send + Sync {
    fn scope(&self) -> &str;
    async fn full_sync(&self, cancel: &CancellationToken) -> Result<usize, SyncError>;
    async fn incremental_sync(&self, cancel: &CancellationToken) -> Result<usize, SyncError>;
}
