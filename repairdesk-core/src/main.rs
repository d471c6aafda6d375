use repairdesk_core::clock::SystemClock;
use repairdesk_core::config::AppConfig;
use repairdesk_core::server::{create_router, AppState};
use repairdesk_core::service::RecordService;
use repairdesk_core::store::open_backend;
use repairdesk_core::workflow::TracingNotifier;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(LevelFilter::INFO.into());

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    info!("Starting RepairDesk Core Server...");

    let backend = open_backend(config.database_url.as_deref(), config.database_max_connections).await?;
    let service = RecordService::new(
        backend.records,
        backend.counter,
        Arc::new(TracingNotifier),
        Arc::new(SystemClock),
        config.service_settings(),
    );

    // Counters must sit above every stored ID before anything is minted
    service.seed_counters().await?;

    let app = create_router(AppState {
        service: Arc::new(service),
    });

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", address, e))?;

    info!("Server listening on {}", address);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
