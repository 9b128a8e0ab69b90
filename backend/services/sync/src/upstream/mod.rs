pub mod client;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use tidemark_common::error::{TidemarkError, TidemarkResult};
use tidemark_db::media::{FetchedImage, ImageFetcher};

pub use client::{UpstreamClient, UpstreamClientConfig, UpstreamError};

/// Serves `/{domain}/{id}/image` through the shared upstream client.
#[derive(Clone)]
pub struct UpstreamImages {
    client: UpstreamClient,
    cancel: CancellationToken,
}

impl UpstreamImages {
    pub fn new(client: UpstreamClient, cancel: CancellationToken) -> Self {
        Self { client, cancel }
    }
}

#[async_trait]
impl ImageFetcher for UpstreamImages {
    async fn get_image(
        &self,
        domain: &str,
        external_id: &str,
    ) -> TidemarkResult<Option<FetchedImage>> {
        let path = format!("/{domain}/{external_id}/image");
        self.client
            .get_image(&self.cancel, &path)
            .await
            .map_err(|e| TidemarkError::Upstream(e.to_string()))
    }
}
