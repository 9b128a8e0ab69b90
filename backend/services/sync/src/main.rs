mod api;
mod blob;
mod connector;
mod error;
mod multi;
mod scheduler;
mod service;
mod sources;
mod upstream;

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::PgPool;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use tidemark_common::types::ServiceInfo;
use tidemark_config::{init_tracing, AppConfig};
use tidemark_db::accounts::pg_repository::PgAccountRepository;
use tidemark_db::events::pg_repository::PgEventRepository;
use tidemark_db::media::MediaResolver;
use tidemark_db::news::pg_repository::PgNewsRepository;
use tidemark_db::organizations::pg_repository::PgOrganizationRepository;
use tidemark_db::people::pg_repository::PgPersonRepository;

use crate::api::{build_router, AppState};
use crate::blob::{BlobStoreConfig, HttpBlobStore};
use crate::connector::Connector;
use crate::multi::MultiService;
use crate::scheduler::{SchedulerConfig, SyncScheduler};
use crate::service::SyncService;
use crate::sources::accounts::AccountSource;
use crate::sources::events::EventSource;
use crate::sources::news::NewsSource;
use crate::sources::organizations::OrganizationSource;
use crate::sources::people::PersonSource;
use crate::upstream::{UpstreamClient, UpstreamClientConfig, UpstreamImages};

/// Connectors in dependency order: people and accounts reference organizations.
fn build_connectors(
    pool: &PgPool,
    client: &UpstreamClient,
    media: Option<MediaResolver>,
    reconcile: bool,
) -> Vec<Arc<dyn Connector>> {
    vec![
        Arc::new(
            SyncService::new(
                OrganizationSource::new(client.clone()),
                PgOrganizationRepository::new(pool.clone()).with_media(media.clone()),
            )
            .with_reconciliation(reconcile),
        ),
        Arc::new(SyncService::new(
            PersonSource::new(client.clone()),
            PgPersonRepository::new(pool.clone()).with_media(media.clone()),
        )),
        Arc::new(
            SyncService::new(
                AccountSource::new(client.clone()),
                PgAccountRepository::new(pool.clone()),
            )
            .with_reconciliation(reconcile),
        ),
        Arc::new(SyncService::new(
            NewsSource::new(client.clone()),
            PgNewsRepository::new(pool.clone()).with_media(media.clone()),
        )),
        Arc::new(SyncService::new(
            EventSource::new(client.clone()),
            PgEventRepository::new(pool.clone()).with_media(media),
        )),
    ]
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_tracing("info");

    let config = AppConfig::from_env().expect("failed to load config");
    tracing::info!(service = "tidemark-sync", "starting");

    let pool = tidemark_db::create_pool(&config.database_url)
        .await
        .expect("failed to create database pool");
    tidemark_db::run_migrations(&pool)
        .await
        .expect("failed to run migrations");

    let upstream_config = UpstreamClientConfig::from_env()
        .expect("UPSTREAM_BASE_URL and UPSTREAM_GROUP_TOKEN must be set");
    let client = UpstreamClient::new(upstream_config).expect("failed to create upstream client");

    // Image downloads run inside repository upserts, outside the scheduler's token.
    let media_cancel = CancellationToken::new();
    let media = match BlobStoreConfig::from_env() {
        Some(blob_config) => {
            let blobs = HttpBlobStore::new(blob_config).expect("failed to create blob store client");
            let images = UpstreamImages::new(client.clone(), media_cancel.clone());
            Some(MediaResolver::new(Arc::new(images), Arc::new(blobs)))
        }
        None => {
            tracing::info!("no blob store configured, media resolution disabled");
            None
        }
    };

    let scheduler_config = SchedulerConfig::from_env();
    let multi = MultiService::new(build_connectors(
        &pool,
        &client,
        media,
        scheduler_config.reconcile,
    ));
    tracing::info!(
        scopes = ?multi.scopes(),
        reconcile = scheduler_config.reconcile,
        "connectors configured"
    );

    let scheduler = SyncScheduler::new(Arc::new(multi), scheduler_config);
    scheduler
        .start()
        .await
        .expect("failed to start sync scheduler");

    let state = AppState {
        scheduler: scheduler.clone(),
        info: ServiceInfo::new("tidemark-sync"),
    };
    let app = build_router(state);
    let addr: SocketAddr = config.bind_addr().parse().expect("invalid bind address");

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    media_cancel.cancel();
    scheduler.shutdown().await;
    tracing::info!("shutting down");
}
