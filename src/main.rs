use std::sync::Arc;

use unirec_api::{
    config::Config,
    db::{
        create_pool, create_redis_client, postgres::run_migrations, Cache, MemoryStore, PgStore,
        RecommendationStore, Snapshot,
    },
    init_tracing,
    routes::{create_router, AppState},
    services::{providers::ChatCompletionsOracle, Augmenter},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env()?;
    let store = build_store(&config).await?;

    let oracle = ChatCompletionsOracle::new(
        config.oracle_api_key(),
        config.ark_api_base.clone(),
        config.ark_model_id.clone(),
    );
    if !oracle.is_configured() {
        tracing::warn!("ARK_API_KEY not set, narration will use fallback reasons");
    }

    let mut augmenter = Augmenter::new(
        Arc::new(oracle),
        config.narration_timeout(),
        config.narration_idle_timeout(),
    );

    let mut cache_writer = None;
    if let Some(redis_url) = &config.redis_url {
        let (cache, handle) = Cache::new(create_redis_client(redis_url)?);
        augmenter = augmenter.with_cache(cache, config.narration_cache_ttl);
        cache_writer = Some(handle);
        tracing::info!("Narration cache enabled");
    }

    let app = create_router(AppState::new(store, augmenter));

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(address = %address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = cache_writer {
        handle.shutdown().await;
    }

    Ok(())
}

/// Postgres when `DATABASE_URL` is set, otherwise the in-memory store
async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn RecommendationStore>> {
    let store: Arc<dyn RecommendationStore> = if let Some(url) = &config.database_url {
        let pool = create_pool(url, config.db_max_connections).await?;
        run_migrations(&pool).await?;
        Arc::new(PgStore::new(pool))
    } else if let Some(path) = &config.snapshot_path {
        let snapshot = Snapshot::load(path).await?;
        tracing::info!(
            path = %path,
            users = snapshot.users.len(),
            items = snapshot.items.len(),
            interactions = snapshot.interactions.len(),
            social_edges = snapshot.social_edges.len(),
            "Loaded snapshot"
        );
        Arc::new(MemoryStore::from_snapshot(snapshot))
    } else {
        tracing::warn!("Neither DATABASE_URL nor SNAPSHOT_PATH set, starting with an empty store");
        Arc::new(MemoryStore::new())
    };

    tracing::info!(store = store.name(), "Store ready");
    Ok(store)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
