//! Catalog publication

use kepler_common::error::error_chain;
use tracing::{info, instrument, warn};

use super::runner::IngestService;
use crate::error::{IngestError, IngestResult};
use crate::models::{Item, Job, JobStatus};

impl IngestService {
    /// Write the item's stored record to the catalog and settle the job:
    /// COMPLETED when the index accepts it, FAILED otherwise.
    ///
    /// The remote import is left alone here whatever happens.
    #[instrument(skip(self, job, item), fields(job_id = %job.id, uri = %item.uri))]
    pub async fn publish_record(&self, job: &mut Job, item: &Item) -> IngestResult<JobStatus> {
        match self.write_record(item).await {
            Ok(()) => {
                job.complete()?;
                info!("Record published");
            },
            Err(e) => {
                let diagnostic = error_chain(&e);
                job.fail(diagnostic.clone())?;
                warn!(error = %diagnostic, "Publication failed");
            },
        }

        if !self.ledger.update_job(job).await? {
            warn!("Job was already settled, update skipped");
        }
        Ok(job.status)
    }

    async fn write_record(&self, item: &Item) -> IngestResult<()> {
        let record = item.record.as_deref().ok_or_else(|| IngestError::MissingItemField {
            uri: item.uri.clone(),
            field: "record",
        })?;
        let document: serde_json::Value = serde_json::from_str(record)?;
        self.services.catalog.write(&[document]).await?;
        Ok(())
    }
}
