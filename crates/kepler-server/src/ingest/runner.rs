//! Job creation and the task pipeline

use kepler_common::error::error_chain;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::tasks::{Step, StepContext};
use crate::bag::{self, PayloadType, Submission};
use crate::error::{IngestError, IngestResult};
use crate::ledger::JobLedger;
use crate::models::{Item, Job, JobStatus};
use crate::services::Services;

/// The ingest engine: creates jobs, runs pipelines and reconciles
/// remote imports against the ledger.
#[derive(Clone)]
pub struct IngestService {
    pub(super) ledger: Arc<dyn JobLedger>,
    pub(super) services: Services,
    uuid_namespace: String,
}

/// A created job with its classified submission, ready to run
#[derive(Debug)]
pub struct JobRunner {
    pub job: Job,
    pub item: Item,
    submission: Submission,
}

impl JobRunner {
    pub fn payload(&self) -> PayloadType {
        self.submission.payload
    }

    /// Working directory of the submission
    pub fn working_dir(&self) -> &Path {
        self.submission.copy.path()
    }
}

impl IngestService {
    pub fn new(
        ledger: Arc<dyn JobLedger>,
        services: Services,
        uuid_namespace: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            services,
            uuid_namespace: uuid_namespace.into(),
        }
    }

    pub fn ledger(&self) -> &Arc<dyn JobLedger> {
        &self.ledger
    }

    /// Record a new job for the item at `uri` and classify the submission.
    ///
    /// Input errors are returned to the caller; if the job row already
    /// exists it is marked FAILED first.
    #[instrument(skip(self, archive), fields(archive = %archive.display()))]
    pub async fn create_job(
        &self,
        uri: &str,
        payload: &str,
        archive: &Path,
    ) -> IngestResult<JobRunner> {
        Uuid::parse_str(uri).map_err(|_| IngestError::InvalidUri(uri.to_string()))?;

        let item = self.ledger.get_or_create_item(uri).await?;
        let mut job = Job::new(item.id);
        self.ledger.insert_job(&job).await?;

        match classify(payload, archive.to_path_buf()).await {
            Ok(submission) => {
                self.ledger.set_item_access(item.id, submission.access).await?;
                let item = self.ledger.get_item(item.id).await?;
                info!(
                    job_id = %job.id,
                    payload = %submission.payload,
                    access = %submission.access,
                    "Job created"
                );
                Ok(JobRunner {
                    job,
                    item,
                    submission,
                })
            },
            Err(e) => {
                job.fail(error_chain(&e))?;
                self.ledger.update_job(&job).await?;
                warn!(job_id = %job.id, error = %e, "Submission rejected");
                Err(e)
            },
        }
    }

    /// Run the job's steps in order, stopping at the first failure.
    ///
    /// The working copy is removed whatever the outcome. On success an
    /// import-backed job is left PENDING for reconciliation and any other
    /// job is COMPLETED; on failure the job is FAILED with the full error
    /// chain and the error is returned.
    #[instrument(skip(self, runner), fields(job_id = %runner.job.id, uri = %runner.item.uri))]
    pub async fn run_pipeline(&self, runner: JobRunner) -> IngestResult<Job> {
        let JobRunner {
            mut job,
            item,
            submission,
        } = runner;
        let Submission {
            payload,
            access,
            copy,
        } = submission;

        let outcome = {
            let mut ctx = StepContext {
                ledger: self.ledger.as_ref(),
                services: &self.services,
                uuid_namespace: &self.uuid_namespace,
                job: &mut job,
                item_id: item.id,
                access,
                copy: &copy,
            };
            run_steps(Step::for_payload(payload), &mut ctx).await
        };

        if let Err(e) = copy.close() {
            warn!(error = %e, "Failed to remove working copy");
        }

        match outcome {
            Ok(()) => {
                let next = if payload.awaits_import() {
                    JobStatus::Pending
                } else {
                    JobStatus::Completed
                };
                job.transition(next)?;
                self.ledger.update_job(&job).await?;
                info!(status = %job.status, "Job completed");
                Ok(job)
            },
            Err(e) => {
                let diagnostic = error_chain(&e);
                job.fail(diagnostic.clone())?;
                self.ledger.update_job(&job).await?;
                error!(error = %diagnostic, "Job failed");
                Err(e)
            },
        }
    }

    /// Create a job and run it
    pub async fn submit(&self, uri: &str, payload: &str, archive: &Path) -> IngestResult<Job> {
        let runner = self.create_job(uri, payload, archive).await?;
        self.run_pipeline(runner).await
    }

    /// The item at `uri` and its newest job, which is its effective state
    pub async fn effective_status(&self, uri: &str) -> IngestResult<Option<(Item, Job)>> {
        let Some(item) = self.ledger.find_item_by_uri(uri).await? else {
            return Ok(None);
        };
        let job = self.ledger.latest_job_for_item(item.id).await?;
        Ok(job.map(|job| (item, job)))
    }
}

async fn run_steps(steps: &[Step], ctx: &mut StepContext<'_>) -> IngestResult<()> {
    for step in steps {
        step.run(ctx)
            .await
            .map_err(|e| IngestError::in_step(step.name(), e))?;
    }
    Ok(())
}

/// Parse the payload type and inspect the archive off the async runtime
async fn classify(payload: &str, archive: PathBuf) -> IngestResult<Submission> {
    let payload: PayloadType = payload.parse()?;
    super::blocking(move || bag::inspect(&archive, payload)).await
}
