//! Livechat API server

use anyhow::Context;
use livechat_api::{
    config::{LogFormat, PresenceBackend, StoreBackend},
    presence::{MemoryPresenceStore, PresenceStore, RedisPresenceStore},
    routes::create_router,
    store::MemoryStore,
    AppState, Collaborators, Config,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,livechat_api=debug"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.log_format);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting livechat API");

    let (collaborators, pool) = match config.store_backend {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres store")?;
            let pool = livechat_shared::db::create_pool(url, config.database_max_connections)
                .await
                .context("Failed to connect to database")?;
            livechat_shared::db::run_migrations(&pool)
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Database connected and migrated");
            (Collaborators::postgres(pool.clone()), Some(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory stores; data is lost on restart");
            (Collaborators::memory(MemoryStore::new()), None)
        }
    };

    let presence_store: Arc<dyn PresenceStore> = match config.presence_backend {
        PresenceBackend::Redis => {
            let store = RedisPresenceStore::connect(&config.redis_url, config.presence_ttl)
                .await
                .context("Failed to connect to Redis")?;
            tracing::info!("Redis presence store connected");
            Arc::new(store)
        }
        PresenceBackend::Memory => Arc::new(MemoryPresenceStore::new(config.presence_ttl)),
    };

    let bind_address = config.bind_address.clone();
    let state = AppState::new(config, collaborators, presence_store, pool);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    tracing::info!(address = %bind_address, "Listening");

    axum::serve(listener, app).await?;

    Ok(())
}
