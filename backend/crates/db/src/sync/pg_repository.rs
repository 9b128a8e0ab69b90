use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::sync::models::SyncState;
use crate::sync::repositories::SyncStateRepository;
use tidemark_common::error::{TidemarkError, TidemarkResult};

#[derive(Clone)]
pub struct PgSyncStateRepository {
    pool: PgPool,
}

impl PgSyncStateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: sqlx::postgres::PgRow) -> SyncState {
        SyncState {
            name: row.get("name"),
            watermark: row.get("watermark"),
        }
    }
}

#[async_trait]
impl SyncStateRepository for PgSyncStateRepository {
    async fn get(&self, name: &str) -> TidemarkResult<Option<SyncState>> {
        let row = sqlx::query("select name, watermark from sync_state where name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| TidemarkError::Database(e.to_string()))?;

        Ok(row.map(Self::map_row))
    }

    async fn put(&self, name: &str, watermark: DateTime<Utc>) -> TidemarkResult<SyncState> {
        let row = sqlx::query(
            "insert into sync_state (name, watermark, updated_at)
             values ($1, $2, now())
             on conflict (name) do update set watermark = excluded.watermark, updated_at = now()
             returning name, watermark",
        )
        .bind(name)
        .bind(watermark)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| TidemarkError::Database(e.to_string()))?;

        Ok(Self::map_row(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, SubsecRound};
    use uuid::Uuid;

    async fn test_repo() -> Option<(PgSyncStateRepository, crate::TestDb)> {
        let db = crate::test_db().await?;
        Some((PgSyncStateRepository::new(db.pool.clone()), db))
    }

    #[tokio::test]
    async fn get_returns_none_for_unknown_scope() {
        let (repo, _db) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let scope = format!("scope-{}", Uuid::new_v4());
        assert!(repo.get(&scope).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn put_creates_then_overwrites_single_row() {
        let (repo, _db) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let scope = format!("scope-{}", Uuid::new_v4());
        let first = Utc::now().trunc_subsecs(6);
        let second = first + Duration::hours(1);

        repo.put(&scope, first).await.expect("first put");
        let stored = repo.put(&scope, second).await.expect("second put");
        assert_eq!(stored.watermark, second);

        let read = repo.get(&scope).await.expect("get").expect("row exists");
        assert_eq!(read.watermark, second);

        let count: i64 = sqlx::query_scalar("select count(*) from sync_state where name = $1")
            .bind(&scope)
            .fetch_one(&repo.pool)
            .await
            .expect("count");
        assert_eq!(count, 1);
    }
}
