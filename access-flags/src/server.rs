use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::database::{get_pool, run_migrations};
use crate::flags::flag_service::AccessService;
use crate::flags::flag_store::{FlagStore, PostgresFlagStore};
use crate::flags::flags_cache::CachedFlagStore;
use crate::router;
use crate::usage::usage_store::{PostgresUsageStore, UsageStore};

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let pool = match get_pool(&config) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to create database pool: {}", e);
            return;
        }
    };

    if *config.run_migrations {
        if let Err(e) = run_migrations(&pool).await {
            tracing::error!("{}", e);
            return;
        }
    }

    let flag_store: Arc<dyn FlagStore> = Arc::new(PostgresFlagStore::new(pool.clone()));
    let usage_store: Arc<dyn UsageStore> = Arc::new(PostgresUsageStore::new(pool));

    serve_with_stores(config, listener, flag_store, usage_store, shutdown).await
}

/// Serves the API over the given stores. The flag store is wrapped in the snapshot cache here.
pub async fn serve_with_stores<F>(
    config: Config,
    listener: TcpListener,
    flag_store: Arc<dyn FlagStore>,
    usage_store: Arc<dyn UsageStore>,
    shutdown: F,
) where
    F: Future<Output = ()> + Send + 'static,
{
    let flag_cache = Arc::new(CachedFlagStore::new(
        flag_store,
        config.flag_cache_ttl(),
        config.flag_cache_max_entries,
    ));
    let service = AccessService::new(flag_cache.clone(), usage_store, config.environment);

    tracing::info!(environment = %config.environment, "starting access flags service");

    let app = router::router(service, flag_cache, config);

    match listener.local_addr() {
        Ok(addr) => tracing::info!("listening on {:?}", addr),
        Err(e) => tracing::warn!("could not read listener address: {}", e),
    }

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    {
        tracing::error!("server error: {}", e);
    }
}
