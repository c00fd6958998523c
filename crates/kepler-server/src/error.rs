//! Ingest engine error types

use kepler_ingest::ExtractError;
use thiserror::Error;

use crate::db::DbError;
use crate::models::JobStatus;
use crate::services::ServiceError;

/// Result type alias for ingest operations
pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Errors raised while creating, running or reconciling a job.
///
/// Input errors (`UnsupportedFormat`, `MissingMember`, `InvalidAccessLevel`,
/// `InvalidUri`) surface to the caller before any step runs. Everything
/// else is a step, remote or ledger failure.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Unsupported payload type: '{0}'")]
    UnsupportedFormat(String),

    #[error("Package is missing {0}")]
    MissingMember(String),

    #[error("Invalid access level: '{0}'")]
    InvalidAccessLevel(String),

    #[error("Item URI must be a UUID: '{0}'")]
    InvalidUri(String),

    #[error("Invalid package: {0}")]
    InvalidPackage(#[from] zip::result::ZipError),

    #[error("Invalid job status transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Unknown job status '{0}'")]
    UnknownStatus(String),

    #[error("{step} failed")]
    Step {
        step: &'static str,
        #[source]
        source: Box<IngestError>,
    },

    #[error("Item {uri} has no {field}")]
    MissingItemField { uri: String, field: &'static str },

    #[error("Unexpected archive contents: {0}")]
    ArchiveContents(String),

    #[error("Unexpected import state: {0}")]
    UnexpectedImport(String),

    #[error("Metadata extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("Remote service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] DbError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IngestError {
    /// Wrap an error with the name of the step that raised it
    pub fn in_step(step: &'static str, source: IngestError) -> Self {
        Self::Step {
            step,
            source: Box::new(source),
        }
    }

    /// True for errors caused by the submission itself rather than by a
    /// remote service or the ledger
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat(_)
                | Self::MissingMember(_)
                | Self::InvalidAccessLevel(_)
                | Self::InvalidUri(_)
                | Self::InvalidPackage(_)
        )
    }
}
