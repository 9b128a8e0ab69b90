use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::events::models::{Event, SCOPE};
use crate::media::{MediaColumn, MediaResolver};
use crate::sync::pg_repository::PgSyncStateRepository;
use crate::sync::repositories::{MirrorRepository, SyncStateRepository};
use tidemark_common::error::{TidemarkError, TidemarkResult};
use tidemark_common::types::UpstreamItem;

const IMAGE: MediaColumn = MediaColumn {
    domain: SCOPE,
    table: "events",
    column: "image_url",
};

#[derive(Clone)]
pub struct PgEventRepository {
    pool: PgPool,
    state: PgSyncStateRepository,
    media: Option<MediaResolver>,
}

impl PgEventRepository {
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
impl MirrorRepository for PgEventRepository {
    fn scope(&self) -> &str {
        SCOPE
    }

    async fn upsert_batch(&self, items: &[UpstreamItem]) -> TidemarkResult<()> {
        let synced_at = Utc::now();

        for item in items {
            let event = Event::from_item(item, synced_at)?;
            sqlx::query(
                "insert into events
                 (id, title, description, location, date_range, starts_on, ends_on, participants,
                  organization_id, image_url, created_at, synced_at)
                 values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now())
                 on conflict (id) do nothing",
            )
            .bind(event.id)
            .bind(&event.title)
            .bind(&event.description)
            .bind(&event.location)
            .bind(&event.date_range)
            .bind(event.starts_on)
            .bind(event.ends_on)
            .bind(&event.participants)
            .bind(event.organization_id)
            .bind(&event.image_url)
            .bind(event.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| TidemarkError::Database(e.to_string()))?;

            if event.image_url.is_none() {
                if let Some(media) = &self.media {
                    if let Err(e) = media.backfill(&self.pool, IMAGE, event.id).await {
                        tracing::warn!(id = event.id, error = %e, "failed to backfill event image");
                    }
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
