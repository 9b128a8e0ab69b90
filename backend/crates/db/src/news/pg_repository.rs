use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::media::{MediaColumn, MediaResolver};
use crate::news::models::{NewsArticle, SCOPE};
use crate::sync::pg_repository::PgSyncStateRepository;
use crate::sync::repositories::{MirrorRepository, SyncStateRepository};
use tidemark_common::error::{TidemarkError, TidemarkResult};
use tidemark_common::types::UpstreamItem;

const IMAGE: MediaColumn = MediaColumn {
    domain: SCOPE,
    table: "news",
    column: "image_url",
};

#[derive(Clone)]
pub struct PgNewsRepository {
    pool: PgPool,
    state: PgSyncStateRepository,
    media: Option<MediaResolver>,
}

impl PgNewsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            state: PgSyncStateRepository::new(pool.clone()),
            pool,
            media: None,
        }
    }

    pub fn with_media(mut self, media: Option<MediaResolver>) -> Self {
        self.media = media;
        self
    }
}

#[async_trait]
impl MirrorRepository for PgNewsRepository {
    fn scope(&self) -> &str {
        SCOPE
    }

    async fn upsert_batch(&self, items: &[UpstreamItem]) -> TidemarkResult<()> {
        let synced_at = Utc::now();

        for item in items {
            let article = NewsArticle::from_item(item, synced_at)?;
            sqlx::query(
                "insert into news
                 (id, title, summary, body, source_url, image_url, published_on, created_at, synced_at)
                 values ($1, $2, $3, $4, $5, $6, $7, $8, now())
                 on conflict (id) do nothing",
            )
            .bind(article.id)
            .bind(&article.title)
            .bind(&article.summary)
            .bind(&article.body)
            .bind(&article.source_url)
            .bind(&article.image_url)
            .bind(article.published_on)
            .bind(article.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| TidemarkError::Database(e.to_string()))?;

            if article.image_url.is_some() {
                continue;
            }
            if let Some(media) = &self.media {
                if let Err(e) = media.backfill(&self.pool, IMAGE, article.id).await {
                    tracing::warn!(id = article.id, error = %e, "failed to backfill news image");
                }
            }
        }

        Ok(())
    }

    async fn last_incremental_watermark(&self) -> TidemarkResult<Option<DateTime<Utc>>> {
        Ok(self.state.get(SCOPE).await?.map(|s| s.watermark))
    }

    async fn update_incremental_watermark(&self, watermark: DateTime<Utc>) -> TidemarkResult<()> {
        self.state.put(SCOPE, watermark).await.map(|_| ())
    }
}
