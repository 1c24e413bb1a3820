use calltrack::application::CallTracker;
use calltrack::config::{Config, StorageBackend};
use calltrack::domain::shared::SystemClock;
use calltrack::domain::storage::KeyValueStore;
use calltrack::infrastructure::notification::TracingNotificationPresenter;
use calltrack::infrastructure::persistence::{JsonFileKvStore, MemoryKvStore};
use calltrack::infrastructure::remote::InMemoryRemoteStore;
use calltrack::interface::api::{build_router, init_metrics, ApiState, LiveConsumerHub};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "postgres")]
use calltrack::infrastructure::persistence::{create_pool, run_migrations, DatabaseConfig, PgKvStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting calltrack");
    debug!("Effective configuration:\n{}", config.render());

    let store = open_store(&config).await?;
    let tracker = Arc::new(CallTracker::start(
        store,
        Arc::new(InMemoryRemoteStore::new()),
        Arc::new(TracingNotificationPresenter),
        Arc::new(SystemClock),
        config.tracker_settings(),
    ));

    let resumed = tracker.resume().await;
    if resumed > 0 {
        info!("Resumed {} delivery jobs from the previous run", resumed);
    }

    let prometheus_handle = init_metrics()?;
    let hub = Arc::new(LiveConsumerHub::new(tracker.clone(), 1000));
    let app = build_router(
        ApiState {
            tracker: tracker.clone(),
        },
        prometheus_handle,
        hub,
    );

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("HTTP API listening on {}", address);

    let api_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("API server failed: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    api_handle.abort();
    tracker.wait_idle().await;
    tracker.shutdown();

    info!("calltrack stopped");
    Ok(())
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage, state is lost on exit");
            Ok(Arc::new(MemoryKvStore::new()))
        }
        StorageBackend::File => Ok(Arc::new(JsonFileKvStore::open(&config.storage.path).await?)),
        #[cfg(feature = "postgres")]
        StorageBackend::Postgres => {
            let pool = create_pool(&DatabaseConfig::with_url(config.storage.database_url.clone())).await?;
            run_migrations(&pool).await?;
            Ok(Arc::new(PgKvStore::new(pool)))
        }
        #[cfg(not(feature = "postgres"))]
        StorageBackend::Postgres => {
            anyhow::bail!("storage backend `postgres` requires the `postgres` feature")
        }
    }
}
