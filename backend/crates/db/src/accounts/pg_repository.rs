use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::accounts::models::{AccountProfile, SCOPE};
use crate::sync::pg_repository::PgSyncStateRepository;
use crate::sync::repositories::{missing_keys, MirrorRepository, SyncStateRepository};
use tidemark_common::error::{TidemarkError, TidemarkResult};
use tidemark_common::types::UpstreamItem;

/// Accounts are keyed locally by uuid and matched to upstream by email.
#[derive(Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
    state: PgSyncStateRepository,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            state: PgSyncStateRepository::new(pool.clone()),
            pool,
        }
    }

    /// Insert a new account or merge the upstream-owned fields into the
    /// existing one. `id`, `password_hash` and `created_at` are never updated.
    pub async fn upsert_profile(&self, profile: &AccountProfile) -> TidemarkResult<()> {
        sqlx::query(
            "insert into accounts (id, email, display_name, role, person_id, organization_id, created_at, updated_at)
             values ($1, $2, $3, $4, $5, $6, now(), now())
             on conflict (email) do update set
               display_name = excluded.display_name,
               role = excluded.role,
               person_id = excluded.person_id,
               organization_id = excluded.organization_id,
               updated_at = now()
             where (accounts.display_name, accounts.role, accounts.person_id, accounts.organization_id)
                   is distinct from
                   (excluded.display_name, excluded.role, excluded.person_id, excluded.organization_id)",
        )
        .bind(Uuid::new_v4())
        .bind(&profile.email)
        .bind(&profile.display_name)
        .bind(&profile.role)
        .bind(profile.person_id)
        .bind(profile.organization_id)
        .execute(&self.pool)
        .await
        .map_err(|e| TidemarkError::Database(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl MirrorRepository for PgAccountRepository {
    fn scope(&self) -> &str {
        SCOPE
    }

    async fn upsert_batch(&self, items: &[UpstreamItem]) -> TidemarkResult<()> {
        for item in items {
            let profile = AccountProfile::from_item(item)?;
            self.upsert_profile(&profile).await?;
        }
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
        let stored: Vec<String> = sqlx::query_scalar("select email from accounts")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| TidemarkError::Database(e.to_string()))?;

        let doomed = missing_keys(stored, keep);
        if doomed.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("delete from accounts where email = any($1)")
            .bind(&doomed)
            .execute(&self.pool)
            .await
            .map_err(|e| TidemarkError::Database(e.to_string()))?;

        tracing::info!(deleted = result.rows_affected(), "removed accounts missing upstream");
        Ok(result.rows_affected())
    }
}
