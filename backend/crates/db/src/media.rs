use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tidemark_common::error::{TidemarkError, TidemarkResult};

/// Raw image bytes as served upstream.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Pulls binary media for a record from upstream.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Returns `Ok(None)` when upstream has no image for the record.
    async fn get_image(&self, domain: &str, external_id: &str)
        -> TidemarkResult<Option<FetchedImage>>;
}

/// Stores blobs and hands back a publicly reachable URL.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> TidemarkResult<String>;
}

/// Table and column holding a record's media URL.
#[derive(Debug, Clone, Copy)]
pub struct MediaColumn {
    pub domain: &'static str,
    pub table: &'static str,
    pub column: &'static str,
}

/// Fills in missing media URLs by copying upstream images into the blob store.
#[derive(Clone)]
pub struct MediaResolver {
    images: Arc<dyn ImageFetcher>,
    blobs: Arc<dyn BlobStore>,
}

impl MediaResolver {
    pub fn new(images: Arc<dyn ImageFetcher>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { images, blobs }
    }

    /// Best effort: any failure is logged and reported as `None` so the
    /// surrounding upsert carries on.
    pub async fn resolve(&self, domain: &str, external_id: &str) -> Option<String> {
        let image = match self.images.get_image(domain, external_id).await {
            Ok(Some(image)) => image,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(domain, external_id, error = %e, "image fetch failed");
                return None;
            }
        };

        let key = blob_key(domain, external_id, &image.content_type);
        match self
            .blobs
            .upload(&key, &image.content_type, image.bytes)
            .await
        {
            Ok(url) => {
                tracing::debug!(domain, external_id, %url, "uploaded media");
                Some(url)
            }
            Err(e) => {
                tracing::warn!(domain, external_id, error = %e, "media upload failed");
                None
            }
        }
    }

    /// Resolve and store a media URL for row `id` if its column is still empty.
    ///
    /// The final update re-checks emptiness, so a URL written concurrently by
    /// someone else is never overwritten.
    pub async fn backfill(&self, pool: &PgPool, target: MediaColumn, id: i64) -> TidemarkResult<()> {
        let MediaColumn {
            domain,
            table,
            column,
        } = target;

        let select = format!("select {column} from {table} where id = $1");
        let current = sqlx::query_scalar::<_, Option<String>>(&select)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| TidemarkError::Database(e.to_string()))?;

        match current {
            Some(None) => {}
            Some(Some(url)) if url.trim().is_empty() => {}
            _ => return Ok(()),
        }

        let Some(url) = self.resolve(domain, &id.to_string()).await else {
            return Ok(());
        };

        let update = format!(
            "update {table} set {column} = $1 where id = $2 and ({column} is null or {column} = '')"
        );
        let result = sqlx::query(&update)
            .bind(&url)
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| TidemarkError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            tracing::debug!(domain, id, "media column filled concurrently, keeping existing url");
        }
        Ok(())
    }
}

/// `{domain}/{external_id}.{ext}`, with the extension derived from the MIME type.
pub fn blob_key(domain: &str, external_id: &str, content_type: &str) -> String {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let ext = match mime.as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        _ => "bin",
    };
    format!("{domain}/{external_id}.{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StaticImages(Option<FetchedImage>);

    #[async_trait]
    impl ImageFetcher for StaticImages {
        async fn get_image(
            &self,
            _domain: &str,
            _external_id: &str,
        ) -> TidemarkResult<Option<FetchedImage>> {
            Ok(self.0.clone())
        }
    }

    struct FailingImages;

    #[async_trait]
    impl ImageFetcher for FailingImages {
        async fn get_image(
            &self,
            _domain: &str,
            _external_id: &str,
        ) -> TidemarkResult<Option<FetchedImage>> {
            Err(TidemarkError::Upstream("HTTP 500".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingBlobs {
        uploads: Mutex<Vec<(String, String, usize)>>,
    }

    #[async_trait]
    impl BlobStore for RecordingBlobs {
        async fn upload(
            &self,
            key: &str,
            content_type: &str,
            bytes: Vec<u8>,
        ) -> TidemarkResult<String> {
            self.uploads
                .lock()
                .unwrap()
                .push((key.to_string(), content_type.to_string(), bytes.len()));
            Ok(format!("https://cdn.example.com/{key}"))
        }
    }

    fn png() -> FetchedImage {
        FetchedImage {
            bytes: vec![0x89, b'P', b'N', b'G'],
            content_type: "image/png".to_string(),
        }
    }

    #[tokio::test]
    async fn resolve_uploads_and_returns_url() {
        let blobs = Arc::new(RecordingBlobs::default());
        let resolver = MediaResolver::new(Arc::new(StaticImages(Some(png()))), blobs.clone());

        let url = resolver.resolve("organizations", "42").await;
        assert_eq!(
            url.as_deref(),
            Some("https://cdn.example.com/organizations/42.png")
        );

        let uploads = blobs.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "organizations/42.png");
        assert_eq!(uploads[0].1, "image/png");
        assert_eq!(uploads[0].2, 4);
    }

    #[tokio::test]
    async fn resolve_without_image_skips_upload() {
        let blobs = Arc::new(RecordingBlobs::default());
        let resolver = MediaResolver::new(Arc::new(StaticImages(None)), blobs.clone());

        assert!(resolver.resolve("people", "7").await.is_none());
        assert!(blobs.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolve_swallows_fetch_errors() {
        let blobs = Arc::new(RecordingBlobs::default());
        let resolver = MediaResolver::new(Arc::new(FailingImages), blobs.clone());

        assert!(resolver.resolve("news", "3").await.is_none());
        assert!(blobs.uploads.lock().unwrap().is_empty());
    }

    #[test]
    fn blob_key_maps_content_types() {
        assert_eq!(blob_key("news", "1", "image/jpeg"), "news/1.jpg");
        assert_eq!(blob_key("news", "1", "image/webp; q=0.9"), "news/1.webp");
        assert_eq!(blob_key("news", "1", "application/octet-stream"), "news/1.bin");
    }

    const NEWS_IMAGE: MediaColumn = MediaColumn {
        domain: "news",
        table: "news",
        column: "image_url",
    };

    /// Writes a URL into the row while the image is being fetched, so the
    /// conditional update runs against a column that was empty at select time.
    struct RacingImages {
        pool: PgPool,
        url: &'static str,
    }

    #[async_trait]
    impl ImageFetcher for RacingImages {
        async fn get_image(
            &self,
            _domain: &str,
            external_id: &str,
        ) -> TidemarkResult<Option<FetchedImage>> {
            let id: i64 = external_id.parse().expect("numeric id");
            sqlx::query("update news set image_url = $1 where id = $2")
                .bind(self.url)
                .bind(id)
                .execute(&self.pool)
                .await
                .expect("concurrent write");
            Ok(Some(png()))
        }
    }

    async fn seed_news(pool: &PgPool, id: i64, image_url: Option<&str>) {
        sqlx::query(
            "insert into news (id, title, image_url, created_at) values ($1, 'Seed', $2, now())",
        )
        .bind(id)
        .bind(image_url)
        .execute(pool)
        .await
        .expect("seed news");
    }

    async fn image_url(pool: &PgPool, id: i64) -> Option<String> {
        sqlx::query_scalar("select image_url from news where id = $1")
            .bind(id)
            .fetch_one(pool)
            .await
            .expect("select image_url")
    }

    async fn clean_db() -> Option<crate::TestDb> {
        let db = crate::test_db().await?;
        sqlx::query("delete from news")
            .execute(&db.pool)
            .await
            .expect("clear news");
        Some(db)
    }

    #[tokio::test]
    async fn backfill_fills_empty_column() {
        let db = match clean_db().await {
            Some(db) => db,
            None => return,
        };
        seed_news(&db.pool, 1, None).await;
        seed_news(&db.pool, 2, Some("")).await;

        let blobs = Arc::new(RecordingBlobs::default());
        let resolver = MediaResolver::new(Arc::new(StaticImages(Some(png()))), blobs.clone());
        resolver.backfill(&db.pool, NEWS_IMAGE, 1).await.expect("backfill null");
        resolver.backfill(&db.pool, NEWS_IMAGE, 2).await.expect("backfill blank");

        assert_eq!(
            image_url(&db.pool, 1).await.as_deref(),
            Some("https://cdn.example.com/news/1.png")
        );
        assert_eq!(
            image_url(&db.pool, 2).await.as_deref(),
            Some("https://cdn.example.com/news/2.png")
        );
        assert_eq!(blobs.uploads.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn backfill_leaves_filled_column_alone() {
        let db = match clean_db().await {
            Some(db) => db,
            None => return,
        };
        seed_news(&db.pool, 3, Some("https://elsewhere.test/3.jpg")).await;

        let blobs = Arc::new(RecordingBlobs::default());
        let resolver = MediaResolver::new(Arc::new(StaticImages(Some(png()))), blobs.clone());
        resolver.backfill(&db.pool, NEWS_IMAGE, 3).await.expect("backfill");

        assert_eq!(
            image_url(&db.pool, 3).await.as_deref(),
            Some("https://elsewhere.test/3.jpg")
        );
        assert!(blobs.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn backfill_keeps_url_written_concurrently() {
        let db = match clean_db().await {
            Some(db) => db,
            None => return,
        };
        seed_news(&db.pool, 4, None).await;

        let images = RacingImages {
            pool: db.pool.clone(),
            url: "https://other-writer.test/4.png",
        };
        let resolver = MediaResolver::new(Arc::new(images), Arc::new(RecordingBlobs::default()));
        resolver.backfill(&db.pool, NEWS_IMAGE, 4).await.expect("backfill");

        assert_eq!(
            image_url(&db.pool, 4).await.as_deref(),
            Some("https://other-writer.test/4.png")
        );
    }

    #[tokio::test]
    async fn backfill_ignores_missing_row() {
        let db = match clean_db().await {
            Some(db) => db,
            None => return,
        };

        let blobs = Arc::new(RecordingBlobs::default());
        let resolver = MediaResolver::new(Arc::new(StaticImages(Some(png()))), blobs.clone());
        resolver.backfill(&db.pool, NEWS_IMAGE, 99).await.expect("backfill");

        assert!(blobs.uploads.lock().unwrap().is_empty());
    }
}
