pub mod accounts;
pub mod coerce;
pub mod events;
pub mod media;
pub mod news;
pub mod organizations;
pub mod people;
pub mod sync;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tidemark_common::error::{TidemarkError, TidemarkResult};

/// Create a Postgres connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> TidemarkResult<PgPool> {
    tracing::info!("connecting to database");
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| TidemarkError::Database(e.to_string()))
}

/// Apply the embedded schema migrations.
pub async fn run_migrations(pool: &PgPool) -> TidemarkResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| TidemarkError::Database(format!("migration failed: {e}")))?;
    tracing::info!("database migrations applied");
    Ok(())
}

#[cfg(test)]
static DB_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Migrated pool for database-backed tests. Holds a process-wide lock so
/// tests that wipe shared tables do not interleave.
#[cfg(test)]
pub(crate) struct TestDb {
    pub pool: PgPool,
    _guard: std::sync::MutexGuard<'static, ()>,
}

/// `None` when `TEST_DATABASE_URL` is unset; callers return early.
#[cfg(test)]
pub(crate) async fn test_db() -> Option<TestDb> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let guard = DB_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let pool = create_pool(&url).await.expect("db should connect");
    run_migrations(&pool).await.expect("migrations should apply");
    Some(TestDb {
        pool,
        _guard: guard,
    })
}
