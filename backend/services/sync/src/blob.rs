use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use tidemark_common::error::{TidemarkError, TidemarkResult};
use tidemark_db::media::BlobStore;

#[derive(Debug, Clone)]
pub struct BlobStoreConfig {
    pub upload_url: String,
    pub public_url: String,
    pub token: String,
}

impl BlobStoreConfig {
    /// Media resolution is disabled unless all three variables are set.
    pub fn from_env() -> Option<Self> {
        let upload_url = std::env::var("BLOB_UPLOAD_URL").ok()?;
        let public_url = std::env::var("BLOB_PUBLIC_URL").ok()?;
        let token = std::env::var("BLOB_TOKEN").ok()?;

        Some(Self {
            upload_url: upload_url.trim_end_matches('/').to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
            token,
        })
    }
}

/// Blob store reached with a bearer-authenticated `PUT` per object.
#[derive(Clone)]
pub struct HttpBlobStore {
    client: Client,
    config: BlobStoreConfig,
}

impl HttpBlobStore {
    pub fn new(config: BlobStoreConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> TidemarkResult<String> {
        let url = format!("{}/{}", self.config.upload_url, key);
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.config.token)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| TidemarkError::Upstream(format!("blob upload failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TidemarkError::Upstream(format!(
                "blob upload returned HTTP {status}: {body}"
            )));
        }

        Ok(format!("{}/{}", self.config.public_url, key))
    }
}
