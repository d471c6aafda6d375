use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::StoreError;
use crate::integrity::scan::scan_store;
use crate::integrity::types::IntegrityReport;
use crate::store::RecordStore;

/// Periodic, read-only integrity pass.
///
/// Scans the store at a fixed interval and logs what it finds. It never
/// repairs anything; repairs are requested explicitly by an operator.
#[derive(Clone)]
pub struct IntegritySweeper {
    store: Arc<dyn RecordStore>,

    /// Pause between sweeps in seconds
    interval_seconds: u64,

    /// Shared so a clone can stop a running loop
    running: Arc<RwLock<bool>>,
}

impl IntegritySweeper {
    /// Creates a sweeper.
    ///
    /// # Arguments
    ///
    /// * `store` - Store to scan
    /// * `interval_seconds` - Pause between sweeps (default: 300)
    pub fn new(store: Arc<dyn RecordStore>, interval_seconds: Option<u64>) -> Self {
        Self {
            store,
            interval_seconds: interval_seconds.unwrap_or(300),
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Runs sweeps until [`IntegritySweeper::stop`] is called.
    ///
    /// A failed sweep is logged and the loop keeps going.
    pub async fn start(&self) {
        *self.running.write().await = true;
        info!(
            "IntegritySweeper started with interval: {} seconds",
            self.interval_seconds
        );

        while *self.running.read().await {
            if let Err(e) = self.sweep_once().await {
                error!("Integrity sweep failed: {}", e);
            }
            sleep(Duration::from_secs(self.interval_seconds)).await;
        }

        info!("IntegritySweeper stopped");
    }

    /// Ends the loop after the current iteration.
    pub async fn stop(&self) {
        info!("Stopping IntegritySweeper...");
        *self.running.write().await = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Scans once and logs a summary of the findings.
    pub async fn sweep_once(&self) -> Result<IntegrityReport, StoreError> {
        let report = scan_store(self.store.as_ref()).await?;

        if report.is_clean() {
            info!("Integrity sweep found no issues");
        } else {
            warn!(
                "Integrity sweep found {} issue(s): {} orphaned order(s), {} orphaned visit(s), \
                 {} mismatched visit id(s), {} misindexed device set(s), {} dangling visit ref(s)",
                report.total(),
                report.orphaned_orders.len(),
                report.orphaned_visits.len(),
                report.mismatched_visit_ids.len(),
                report.misindexed_devices.len(),
                report.dangling_visit_refs.len()
            );
        }

        Ok(report)
    }
}
