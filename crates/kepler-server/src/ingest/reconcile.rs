//! Import reconciliation
//!
//! A pass loads, for each item, its newest job if that job is PENDING,
//! asks the hosting service how the job's import is doing and settles the
//! job when the import has. Nothing is carried between passes, so a pass
//! can be re-run at any time.
//!
//! Cleanup of settled imports is best effort. Every job that ends FAILED or
//! COMPLETED here gets a delete request against its import. If the process
//! dies between settling a job and deleting its import, the import stays on
//! the hosting service; no later pass looks at it again.

use kepler_common::error::error_chain;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::runner::IngestService;
use crate::error::IngestResult;
use crate::models::{Job, JobStatus};
use crate::services::{HostingService, ImportStatus, ImportTask};

pub const IMPORT_COMPLETE: &str = "COMPLETE";
pub const IMPORT_PENDING: &str = "PENDING";
pub const TASK_ERROR: &str = "ERROR";
pub const TASK_NO_CRS: &str = "NO_CRS";

/// What a remote import status means for its job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// Import finished; publish the record
    Complete,
    /// Import will not finish; fail the job with this message
    Failed(String),
    /// Still running remotely
    Converging,
}

/// Classify a remote import status. Only `COMPLETE` and the `ERROR` and
/// `NO_CRS` task states settle a job.
pub fn classify(status: &ImportStatus) -> ImportOutcome {
    match status.state.as_str() {
        IMPORT_COMPLETE => ImportOutcome::Complete,
        IMPORT_PENDING => match status.tasks.first() {
            None => ImportOutcome::Failed("Import is PENDING but has no tasks".to_string()),
            Some(task) => match task.state.as_str() {
                TASK_ERROR => ImportOutcome::Failed("Task error".to_string()),
                TASK_NO_CRS => ImportOutcome::Failed("Missing CRS".to_string()),
                _ => ImportOutcome::Converging,
            },
        },
        _ => ImportOutcome::Converging,
    }
}

/// Counts from one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub examined: usize,
    pub completed: usize,
    pub failed: usize,
    pub converging: usize,
    /// Jobs left untouched because the ledger could not be read or written
    pub errors: usize,
}

impl IngestService {
    /// Run one reconciliation pass.
    ///
    /// Only a failure to load the pending jobs is returned. Every job is
    /// settled and persisted on its own; a failure on one job is logged and
    /// does not affect the others.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> IngestResult<ReconcileReport> {
        let jobs = self.ledger.latest_pending_jobs().await?;
        let mut report = ReconcileReport {
            examined: jobs.len(),
            ..Default::default()
        };

        for job in jobs {
            let job_id = job.id;
            match self.reconcile_job(job).await {
                Ok(JobStatus::Completed) => report.completed += 1,
                Ok(JobStatus::Failed) => report.failed += 1,
                Ok(_) => report.converging += 1,
                Err(e) => {
                    report.errors += 1;
                    error!(job_id = %job_id, error = %error_chain(&e), "Could not reconcile job");
                },
            }
        }

        info!(
            examined = report.examined,
            completed = report.completed,
            failed = report.failed,
            converging = report.converging,
            errors = report.errors,
            "Reconciliation pass finished"
        );
        Ok(report)
    }

    /// Settle one job. Returns its status afterwards.
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn reconcile_job(&self, mut job: Job) -> IngestResult<JobStatus> {
        let item = self.ledger.get_item(job.item_id).await?;
        let hosting = Arc::clone(self.services.hosting.for_access(item.access));

        let Some(import_url) = job.import_url.clone() else {
            job.fail("Job is PENDING without an import URL")?;
            self.persist(&job).await?;
            return Ok(job.status);
        };

        let status = match hosting.import_status(&import_url).await {
            Ok(status) => status,
            Err(e) => {
                job.fail(error_chain(&e))?;
                self.persist(&job).await?;
                warn!(import_url = %import_url, error = %e, "Import status unavailable");
                delete_import(hosting.as_ref(), &import_url, None).await;
                return Ok(job.status);
            },
        };

        match classify(&status) {
            ImportOutcome::Converging => {
                debug!(import_url = %import_url, state = %status.state, "Import still running");
            },
            ImportOutcome::Failed(message) => {
                job.fail(message)?;
                self.persist(&job).await?;
                info!(import_url = %import_url, "Import failed");
                delete_import(hosting.as_ref(), &import_url, Some(&status)).await;
            },
            ImportOutcome::Complete => {
                self.publish_record(&mut job, &item).await?;
                delete_import(hosting.as_ref(), &import_url, Some(&status)).await;
            },
        }
        Ok(job.status)
    }

    async fn persist(&self, job: &Job) -> IngestResult<()> {
        if !self.ledger.update_job(job).await? {
            warn!(job_id = %job.id, "Job was already settled, update skipped");
        }
        Ok(())
    }
}

/// Best-effort removal of an import and its tasks. Failures are logged
/// and not retried. The import itself is always deleted, even when its
/// task list cannot be read.
async fn delete_import(
    hosting: &dyn HostingService,
    import_url: &str,
    status: Option<&ImportStatus>,
) {
    let fetched;
    let tasks: &[ImportTask] = match status {
        Some(status) => status.tasks.as_slice(),
        None => match hosting.import_status(import_url).await {
            Ok(status) => {
                fetched = status;
                fetched.tasks.as_slice()
            },
            Err(e) => {
                warn!(import_url = %import_url, error = %e, "Import tasks unavailable, deleting import only");
                &[]
            },
        },
    };

    for task_url in tasks.iter().filter_map(|t| t.href.as_deref()) {
        if let Err(e) = hosting.delete_task(task_url).await {
            warn!(task_url = %task_url, error = %e, "Could not delete import task");
        }
    }
    if let Err(e) = hosting.delete_import(import_url).await {
        warn!(import_url = %import_url, error = %e, "Could not delete import");
    }
}
