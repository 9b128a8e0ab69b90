use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::media::{MediaColumn, MediaResolver};
use crate::people::models::{Person, SCOPE};
use crate::sync::pg_repository::PgSyncStateRepository;
use crate::sync::repositories::{MirrorRepository, SyncStateRepository};
use tidemark_common::error::{TidemarkError, TidemarkResult};
use tidemark_common::types::UpstreamItem;

const PHOTO: MediaColumn = MediaColumn {
    domain: SCOPE,
    table: "people",
    column: "photo_url",
};

#[derive(Clone)]
pub struct PgPersonRepository {
    pool: PgPool,
    state: PgSyncStateRepository,
    media: Option<MediaResolver>,
}

impl PgPersonRepository {
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

    pub async fn insert_if_absent(&self, person: &Person) -> TidemarkResult<bool> {
        let result = sqlx::query(
            "insert into people
             (id, first_name, last_name, full_name, email, position, organization_id, photo_url, birth_date, created_at, synced_at)
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now())
             on conflict (id) do nothing",
        )
        .bind(person.id)
        .bind(&person.first_name)
        .bind(&person.last_name)
        .bind(&person.full_name)
        .bind(&person.email)
        .bind(&person.position)
        .bind(person.organization_id)
        .bind(&person.photo_url)
        .bind(person.birth_date)
        .bind(person.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| TidemarkError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl MirrorRepository for PgPersonRepository {
    fn scope(&self) -> &str {
        SCOPE
    }

    async fn upsert_batch(&self, items: &[UpstreamItem]) -> TidemarkResult<()> {
        let synced_at = Utc::now();
        let mut inserted = 0usize;

        for item in items {
            let person = Person::from_item(item, synced_at)?;
            if self.insert_if_absent(&person).await? {
                inserted += 1;
            }

            if let (None, Some(media)) = (&person.photo_url, &self.media) {
                if let Err(e) = media.backfill(&self.pool, PHOTO, person.id).await {
                    tracing::warn!(id = person.id, error = %e, "failed to backfill person photo");
                }
            }
        }

        tracing::debug!(total = items.len(), inserted, "upserted people");
        Ok(())
    }

    async fn last_incremental_watermark(&self) -> TidemarkResult<Option<DateTime<Utc>>> {
        Ok(self.state.get(SCOPE).await?.map(|s| s.watermark))
    }

    async fn update_incremental_watermark(&self, watermark: DateTime<Utc>) -> TidemarkResult<()> {
        self.state.put(SCOPE, watermark).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let db = match crate::test_db().await {
            Some(db) => db,
            None => return,
        };
        sqlx::query("delete from people")
            .execute(&db.pool)
            .await
            .expect("clear people");
        let repo = PgPersonRepository::new(db.pool.clone());

        let items = vec![UpstreamItem::new("10", Utc::now())
            .with_field("first_name", "Ada")
            .with_field("last_name", "Lovelace")
            .with_field("organization_id", 1)];
        repo.upsert_batch(&items).await.expect("first");
        repo.upsert_batch(&items).await.expect("second");

        let rows: Vec<(i64, String, Option<i64>)> =
            sqlx::query_as("select id, full_name, organization_id from people")
                .fetch_all(&db.pool)
                .await
                .expect("select");
        assert_eq!(rows, vec![(10, "Ada Lovelace".to_string(), Some(1))]);
    }

    #[tokio::test]
    async fn reconciliation_is_not_supported() {
        // Building the repository does not touch the database.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .expect("lazy pool");
        let repo = PgPersonRepository::new(pool);
        assert!(!repo.supports_reconciliation());

        let err = repo
            .soft_delete_missing(&std::collections::HashSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TidemarkError::Validation(_)));
    }
}
