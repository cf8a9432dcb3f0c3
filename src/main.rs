use std::sync::Arc;

use idempotency_gate::api::{create_router, AppState};
use idempotency_gate::config::{Settings, StoreBackend};
use idempotency_gate::gate::IdempotencyGate;
use idempotency_gate::observability::{init_logging, init_metrics, HealthChecker, LogConfig};
use idempotency_gate::store::{MemoryRecordStore, RecordStore, RedisRecordStore};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;

    // Initialize logging
    init_logging(&LogConfig {
        level: settings.application.log_level.clone(),
        format: settings.application.log_format.as_str().into(),
        ..LogConfig::default()
    });
    info!("Configuration loaded");

    // Initialize metrics
    let metrics_handle = init_metrics();

    // Build the record store
    let store: Arc<dyn RecordStore> = match settings.store.backend {
        StoreBackend::Redis => {
            info!("Connecting to Redis at {}...", settings.store.url);
            let store = RedisRecordStore::connect(&settings.store).await?;
            info!("Redis connection established");
            Arc::new(store)
        }
        StoreBackend::Memory => {
            info!("Using in-process record store");
            Arc::new(MemoryRecordStore::new())
        }
    };

    // Build the gate
    let gate = Arc::new(IdempotencyGate::new(
        Arc::clone(&store),
        settings.caching.idempotency_expiration_seconds,
    ));
    info!(
        ttl_seconds = settings.caching.idempotency_expiration_seconds,
        "Idempotency gate ready"
    );

    let health_checker = Arc::new(HealthChecker::new(store));
    let state = AppState::new(gate, health_checker)
        .with_metrics(metrics_handle)
        .with_body_cap(settings.gate.max_cacheable_body_bytes);

    let router = create_router(state);

    let addr = format!("0.0.0.0:{}", settings.application.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, router).await?;

    Ok(())
}
