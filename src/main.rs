use std::sync::Arc;
use std::time::Duration;

use paxpal_api::{
    api::{create_router, AppState},
    config::{Config, StoreBackend},
    services::{CatalogClient, CollectionManager, HttpCatalogClient, RecommendationAggregator},
    store::{create_redis_client, FileStore, MemoryStore, PersistedStore, RedisStore, Store},
};
use tracing_subscriber::EnvFilter;

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::File => Arc::new(FileStore::open(config.store_dir.clone()).await?),
        StoreBackend::Redis => Arc::new(RedisStore::new(
            create_redis_client(&config.redis_url)?,
            config.store_namespace.clone(),
        )),
    };
    tracing::info!(backend = store.name(), "Collection store ready");
    Ok(store)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("paxpal_api=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let store = PersistedStore::new(open_store(&config).await?);
    let catalog: Arc<dyn CatalogClient> = Arc::new(HttpCatalogClient::new(
        config.catalog_api_url.clone(),
        Duration::from_secs(config.catalog_timeout_secs),
    )?);

    let collection = Arc::new(CollectionManager::new(
        store,
        catalog.clone(),
        config.cache_policy,
    ));
    // Recover from an interrupted eviction in a previous run
    collection.prune_orphans().await?;

    let recommendations = Arc::new(RecommendationAggregator::new(
        collection.clone(),
        catalog,
        config.recommendation_limit,
    ));
    let refresh_worker = recommendations.spawn_auto_refresh();

    let app = create_router(AppState::new(collection, recommendations));

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(addr = %config.bind_addr(), "Server running");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    refresh_worker.shutdown().await;
    Ok(())
}
