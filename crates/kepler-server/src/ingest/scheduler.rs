//! Periodic reconciliation

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::runner::IngestService;

/// Runs a reconciliation pass on a fixed interval until cancelled.
///
/// Passes never overlap within one scheduler; a pass that overruns the
/// interval delays the next tick.
pub struct ReconcileScheduler {
    service: Arc<IngestService>,
    period: Duration,
}

impl ReconcileScheduler {
    pub fn new(service: Arc<IngestService>, period: Duration) -> Self {
        Self { service, period }
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(interval_secs = self.period.as_secs(), "Reconcile scheduler started");
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.service.reconcile().await {
                        error!(error = %e, "Reconciliation pass failed");
                    }
                },
            }
        }

        info!("Reconcile scheduler stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ledger::{JobLedger, MemoryLedger};
    use crate::services::{
        ArchiveService, CatalogIndex, HostingService, HostingServices, ImportStatus,
        ServiceResult, Services, UploadKind,
    };
    use async_trait::async_trait;
    use std::path::Path;

    struct Unused;

    #[async_trait]
    impl HostingService for Unused {
        fn workspace(&self) -> &str {
            "mit"
        }
        fn wms_url(&self) -> String {
            String::new()
        }
        fn wfs_url(&self) -> String {
            String::new()
        }
        async fn create_import(&self, _: &Path, _: UploadKind, _: &str) -> ServiceResult<String> {
            unreachable!()
        }
        async fn import_status(&self, _: &str) -> ServiceResult<ImportStatus> {
            unreachable!()
        }
        async fn delete_import(&self, _: &str) -> ServiceResult<()> {
            unreachable!()
        }
        async fn delete_task(&self, _: &str) -> ServiceResult<()> {
            unreachable!()
        }
    }

    #[async_trait]
    impl ArchiveService for Unused {
        async fn submit(&self, _: &Path) -> ServiceResult<String> {
            unreachable!()
        }
        async fn file_urls(&self, _: &str) -> ServiceResult<Vec<String>> {
            unreachable!()
        }
    }

    #[async_trait]
    impl CatalogIndex for Unused {
        async fn write(&self, _: &[serde_json::Value]) -> ServiceResult<()> {
            unreachable!()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_stops_on_cancel() {
        let unused = Arc::new(Unused);
        let services = Services {
            hosting: HostingServices {
                public: unused.clone(),
                restricted: unused.clone(),
            },
            archive: unused.clone(),
            catalog: unused,
        };
        let ledger: Arc<dyn JobLedger> = Arc::new(MemoryLedger::new());
        let service = Arc::new(IngestService::new(ledger, services, "arrowsmith.mit.edu"));

        let cancel = CancellationToken::new();
        let handle = ReconcileScheduler::new(service, Duration::from_secs(60)).spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(150)).await;
        cancel.cancel();
        handle.await.unwrap();
    }
}
