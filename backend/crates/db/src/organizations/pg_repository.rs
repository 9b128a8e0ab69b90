use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::media::{MediaColumn, MediaResolver};
use crate::organizations::models::{Organization, SCOPE};
use crate::sync::pg_repository::PgSyncStateRepository;
use crate::sync::repositories::{missing_keys, MirrorRepository, SyncStateRepository};
use tidemark_common::error::{TidemarkError, TidemarkResult};
use tidemark_common::types::UpstreamItem;

const LOGO: MediaColumn = MediaColumn {
    domain: SCOPE,
    table: "organizations",
    column: "logo_url",
};

#[derive(Clone)]
pub struct PgOrganizationRepository {
    pool: PgPool,
    state: PgSyncStateRepository,
    media: Option<MediaResolver>,
}

impl PgOrganizationRepository {
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

    /// Insert an organization; an existing row with the same id wins.
    pub async fn insert_if_absent(&self, org: &Organization) -> TidemarkResult<bool> {
        let result = sqlx::query(
            "insert into organizations
             (id, name, description, website, email, phone, address, logo_url, founded_on, tags, created_at, synced_at)
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now())
             on conflict (id) do nothing",
        )
        .bind(org.id)
        .bind(&org.name)
        .bind(&org.description)
        .bind(&org.website)
        .bind(&org.email)
        .bind(&org.phone)
        .bind(&org.address)
        .bind(&org.logo_url)
        .bind(org.founded_on)
        .bind(&org.tags)
        .bind(org.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| TidemarkError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl MirrorRepository for PgOrganizationRepository {
    fn scope(&self) -> &str {
        SCOPE
    }

    async fn upsert_batch(&self, items: &[UpstreamItem]) -> TidemarkResult<()> {
        let synced_at = Utc::now();
        let mut inserted = 0usize;

        for item in items {
            let org = Organization::from_item(item, synced_at)?;
            if self.insert_if_absent(&org).await? {
                inserted += 1;
            }

            if org.logo_url.is_none() {
                if let Some(media) = &self.media {
                    if let Err(e) = media.backfill(&self.pool, LOGO, org.id).await {
                        tracing::warn!(id = org.id, error = %e, "failed to backfill organization logo");
                    }
                }
            }
        }

        tracing::debug!(total = items.len(), inserted, "upserted organizations");
        Ok(())
    }

    async fn last_incremental_watermark(&self) -> TidemarkResult<Option<DateTime<Utc>>> {
        Ok(self.state.get(SCOPE).await?.map(|s| s.watermark))
    }

    async fn update_incremental_watermark(&self, watermark: DateTime<Utc>) -> TidemarkResult<()> {
        self.state.put(SCOPE, watermark).await.map(|_| ())
    }

    fn supports_reconciliation(&self) -> bool {
        true
    }

    async fn soft_delete_missing(&self, keep: &HashSet<String>) -> TidemarkResult<u64> {
        let stored: Vec<i64> = sqlx::query_scalar("select id from organizations")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| TidemarkError::Database(e.to_string()))?;

        let doomed: Vec<i64> = missing_keys(stored.iter().map(i64::to_string), keep)
            .iter()
            .filter_map(|k| k.parse().ok())
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("delete from organizations where id = any($1)")
            .bind(&doomed)
            .execute(&self.pool)
            .await
            .map_err(|e| TidemarkError::Database(e.to_string()))?;

        tracing::info!(deleted = result.rows_affected(), "removed organizations missing upstream");
        Ok(result.rows_affected())
    }
}
