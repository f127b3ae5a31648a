//! Asynchronous processing jobs and their lifecycle.
//!
//! A job exists only for images whose submission returned a job handle
//! instead of finished URLs. Its status is driven by the poller:
//!
//! ```text
//! Pending -> Processing -> Completed
//!                      \-> Failed
//! ```
//!
//! `Completed` and `Failed` are terminal and never change afterwards.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{JobId, PublicId};

// ---------------------------------------------------------------------------
// Failure messages
// ---------------------------------------------------------------------------

/// Completed status carried no output URLs.
pub const MSG_NO_RESULT_URLS: &str = "No result URLs received";

/// Poll budget ran out while the job was still reported as processing.
pub const MSG_PROCESSING_TIMED_OUT: &str = "Processing timed out";

/// Poll budget ran out and the last status query itself failed.
pub const MSG_STATUS_UNAVAILABLE: &str = "Failed to get status after multiple attempts";

/// Server reported failure without a message.
pub const MSG_PROCESSING_FAILED: &str = "Processing failed";

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Processing => "Processing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }

    /// Whether `self -> next` is an allowed transition.
    ///
    /// Re-asserting a non-terminal state (`Processing -> Processing`)
    /// is allowed since every inconclusive poll reports it again.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (s, _) if s.is_terminal() => false,
            (Self::Pending, _) => true,
            (Self::Processing, Self::Pending) => false,
            (Self::Processing, _) => true,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessingJob
// ---------------------------------------------------------------------------

/// An asynchronous background-replacement job for one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingJob {
    pub public_id: PublicId,
    pub job_id: JobId,
    pub status: JobStatus,
    /// Failure message once the job is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessingJob {
    /// A freshly registered job. Submission already confirmed the
    /// service accepted it, so it starts in `Processing`.
    pub fn registered(public_id: impl Into<PublicId>, job_id: impl Into<JobId>) -> Self {
        Self {
            public_id: public_id.into(),
            job_id: job_id.into(),
            status: JobStatus::Processing,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `Completed`.
    pub fn complete(&mut self) -> Result<(), CoreError> {
        self.transition(JobStatus::Completed)
    }

    /// Move to `Failed` and record the reason.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), CoreError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(message.into());
        Ok(())
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "Job {} cannot move from {} to {}",
                self.job_id,
                self.status.label(),
                next.label()
            )));
        }
        self.status = next;
        Ok(())
    }
}
