//! Ingest engine
//!
//! - [`runner`]: job creation and the per-payload task pipeline
//! - [`tasks`]: the pipeline steps
//! - [`reconcile`]: settles PENDING jobs against remote import state
//! - [`publish`]: writes stored records to the catalog
//! - [`scheduler`]: runs reconciliation on an interval

pub mod publish;
pub mod reconcile;
pub mod runner;
pub mod scheduler;
pub mod tasks;

pub use reconcile::{classify, ImportOutcome, ReconcileReport};
pub use runner::{IngestService, JobRunner};
pub use scheduler::ReconcileScheduler;
pub use tasks::Step;

use crate::error::{IngestError, IngestResult};

/// Run file and XML work off the async runtime
pub(crate) async fn blocking<T, F>(work: F) -> IngestResult<T>
where
    F: FnOnce() -> IngestResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| IngestError::Io(std::io::Error::other(e)))?
}
