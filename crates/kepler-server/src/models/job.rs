//! Job: one attempt to publish an item

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{IngestError, IngestResult};

/// Job lifecycle.
///
/// ```text
/// CREATED -> PENDING -> COMPLETED
///    |          |
///    |          +-----> FAILED
///    +----------------> COMPLETED | FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Created,
    Pending,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Pending | Self::Completed | Self::Failed)
                | (Self::Pending, Self::Completed | Self::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "PENDING" => Ok(Self::Pending),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(IngestError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub item_id: Uuid,
    pub status: JobStatus,
    /// Remote import created by the hosting service
    pub import_url: Option<String>,
    /// Set only when the job fails
    pub error_message: Option<String>,
    /// Creation time; the newest job of an item is its effective state
    pub time: DateTime<Utc>,
}

impl Job {
    pub fn new(item_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_id,
            status: JobStatus::Created,
            import_url: None,
            error_message: None,
            time: Utc::now(),
        }
    }

    /// Move to `next`, rejecting backward moves and moves out of a
    /// terminal state.
    pub fn transition(&mut self, next: JobStatus) -> IngestResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(IngestError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> IngestResult<()> {
        self.transition(JobStatus::Failed)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    pub fn complete(&mut self) -> IngestResult<()> {
        self.transition(JobStatus::Completed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_created() {
        let job = Job::new(Uuid::new_v4());
        assert_eq!(job.status, JobStatus::Created);
        assert!(job.import_url.is_none());
        assert!(job.error_message.is_none());
    }

    #[test]
    fn test_forward_transitions() {
        let mut job = Job::new(Uuid::new_v4());
        job.transition(JobStatus::Pending).unwrap();
        job.complete().unwrap();
        assert_eq!(job.status, JobStatus::Completed);

        let mut job = Job::new(Uuid::new_v4());
        job.complete().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let mut job = Job::new(Uuid::new_v4());
        job.fail("Task error").unwrap();
        assert_eq!(job.error_message.as_deref(), Some("Task error"));

        for next in [
            JobStatus::Created,
            JobStatus::Pending,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert!(matches!(
                job.transition(next),
                Err(IngestError::InvalidTransition { .. })
            ));
        }
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn test_pending_cannot_go_back() {
        let mut job = Job::new(Uuid::new_v4());
        job.transition(JobStatus::Pending).unwrap();
        assert!(job.transition(JobStatus::Created).is_err());
        assert!(job.transition(JobStatus::Pending).is_err());
    }

    #[test]
    fn test_failed_transition_leaves_message_untouched() {
        let mut job = Job::new(Uuid::new_v4());
        job.complete().unwrap();
        assert!(job.fail("late failure").is_err());
        assert!(job.error_message.is_none());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            JobStatus::Created,
            JobStatus::Pending,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<JobStatus>().is_err());
    }
}
