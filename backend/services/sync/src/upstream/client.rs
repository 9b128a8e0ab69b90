use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use tidemark_config::env_or;
use tidemark_db::media::FetchedImage;

#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    pub base_url: String,
    pub group_token: String,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
    pub page_size: u32,
}

impl UpstreamClientConfig {
    /// Returns `None` unless both `UPSTREAM_BASE_URL` and `UPSTREAM_GROUP_TOKEN` are set.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("UPSTREAM_BASE_URL").ok()?;
        let group_token = std::env::var("UPSTREAM_GROUP_TOKEN").ok()?;

        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            group_token,
            max_attempts: env_or("UPSTREAM_MAX_ATTEMPTS", 3),
            retry_delay_ms: env_or("UPSTREAM_RETRY_DELAY_MS", 2000),
            timeout_secs: env_or("UPSTREAM_TIMEOUT_SECS", 30),
            page_size: env_or("UPSTREAM_PAGE_SIZE", 100),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("HTTP {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("unexpected payload: {0}")]
    Decode(String),

    #[error("request cancelled")]
    Cancelled,
}

/// Successful response body plus its declared content type.
struct RawResponse {
    content_type: Option<String>,
    body: Vec<u8>,
}

#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    config: UpstreamClientConfig,
}

impl UpstreamClient {
    pub fn new(config: UpstreamClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// For testing: point the client at a specific base URL (e.g., wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Walk a listing with `skip`/`limit` until a page comes back empty.
    pub async fn list_all(
        &self,
        cancel: &CancellationToken,
        path: &str,
    ) -> Result<Vec<Value>, UpstreamError> {
        let limit = self.config.page_size.max(1) as usize;
        let mut skip = 0usize;
        let mut all = Vec::new();

        loop {
            let page = self.list_page(cancel, path, skip, limit).await?;
            if page.is_empty() {
                break;
            }
            skip += page.len();
            all.extend(page);
        }

        tracing::debug!(path, count = all.len(), "listed upstream collection");
        Ok(all)
    }

    pub async fn list_page(
        &self,
        cancel: &CancellationToken,
        path: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Value>, UpstreamError> {
        let url = format!("{}{}?skip={}&limit={}", self.config.base_url, path, skip, limit);
        let raw = self.get_with_retry(cancel, &url, retry_all).await?;
        decode(&url, &raw.body)
    }

    /// Fetch and decode a single JSON document.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        path: &str,
    ) -> Result<T, UpstreamError> {
        let url = format!("{}{}", self.config.base_url, path);
        let raw = self.get_with_retry(cancel, &url, retry_all).await?;
        decode(&url, &raw.body)
    }

    /// Fetch binary media. A 404 or an empty body means there is no image.
    /// A 404 is answered at once and never retried.
    pub async fn get_image(
        &self,
        cancel: &CancellationToken,
        path: &str,
    ) -> Result<Option<FetchedImage>, UpstreamError> {
        let url = format!("{}{}", self.config.base_url, path);
        let raw = match self.get_with_retry(cancel, &url, retry_unless_not_found).await {
            Ok(raw) => raw,
            Err(UpstreamError::HttpError { status, .. }) if status == StatusCode::NOT_FOUND => {
                return Ok(None)
            }
            Err(e) => return Err(e),
        };

        if raw.body.is_empty() {
            return Ok(None);
        }

        let content_type = raw
            .content_type
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or_else(|| sniff_content_type(&raw.body).to_string());

        Ok(Some(FetchedImage {
            bytes: raw.body,
            content_type,
        }))
    }

    /// GET with a fixed delay between attempts. Errors for which `retryable`
    /// returns false end the loop at once; cancellation stops immediately.
    async fn get_with_retry(
        &self,
        cancel: &CancellationToken,
        url: &str,
        retryable: fn(&UpstreamError) -> bool,
    ) -> Result<RawResponse, UpstreamError> {
        let attempts = self.config.max_attempts.max(1);
        let delay = Duration::from_millis(self.config.retry_delay_ms);
        let mut attempt = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(UpstreamError::Cancelled);
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
                result = self.get_once(url) => result,
            };

            match result {
                Ok(raw) => return Ok(raw),
                Err(e) if !retryable(&e) => return Err(e),
                Err(e) if attempt >= attempts => {
                    tracing::error!(url, attempts, error = %e, "upstream request failed");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        url,
                        attempt,
                        delay_ms = self.config.retry_delay_ms,
                        error = %e,
                        "upstream request failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn get_once(&self, url: &str) -> Result<RawResponse, UpstreamError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.config.group_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::HttpError { status, body });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await?.to_vec();

        Ok(RawResponse { content_type, body })
    }
}

/// Transport errors and every non-2xx status are retried alike.
fn retry_all(_: &UpstreamError) -> bool {
    true
}

fn retry_unless_not_found(err: &UpstreamError) -> bool {
    !matches!(err, UpstreamError::HttpError { status, .. } if *status == StatusCode::NOT_FOUND)
}

fn decode<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T, UpstreamError> {
    serde_json::from_slice(body).map_err(|e| UpstreamError::Decode(format!("{url}: {e}")))
}

/// Guess an image MIME type from its magic bytes.
pub fn sniff_content_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else if bytes.starts_with(b"<svg") || bytes.starts_with(b"<?xml") {
        "image/svg+xml"
    } else {
        "application/octet-stream"
    }
}
