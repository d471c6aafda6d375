use repairdesk_core::config::AppConfig;
use repairdesk_core::integrity::IntegritySweeper;
use repairdesk_core::store::open_backend;
use tokio::signal;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Background worker that scans the record store for integrity problems.
///
/// Findings are logged only; repairs stay an explicit operator action.
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

    info!("Starting RepairDesk integrity sweep worker...");

    if config.database_url.is_none() {
        anyhow::bail!("DATABASE_URL must be set; an in-memory store has nothing to sweep");
    }
    let backend = open_backend(config.database_url.as_deref(), config.database_max_connections).await?;

    let sweeper = IntegritySweeper::new(
        backend.records,
        Some(config.integrity_sweep_interval_seconds),
    );

    let worker = sweeper.clone();
    let mut sweeper_handle = tokio::spawn(async move {
        worker.start().await;
    });

    tokio::select! {
        result = signal::ctrl_c() => {
            result?;
            info!("Received Ctrl+C, shutting down gracefully...");
            sweeper.stop().await;
            sweeper_handle.abort();
        }
        _ = &mut sweeper_handle => {
            info!("Sweeper task completed");
        }
    }

    info!("RepairDesk integrity sweep worker stopped");
    Ok(())
}
