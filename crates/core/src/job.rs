//! Queue message for one inference request.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::JobId;

/// One inference request travelling through the shared queue.
///
/// Wire form: `{"id": "<job id>", "image_name": "<canonical artifact name>"}`.
/// Older producers used `job_id` / `image_file_name`; both are accepted on
/// decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    #[serde(alias = "job_id")]
    pub id: JobId,
    #[serde(alias = "image_file_name")]
    pub image_name: String,
}

impl Job {
    /// Create a job with a freshly minted id.
    pub fn new(image_name: impl Into<String>) -> Self {
        Self::with_id(JobId::new(), image_name)
    }

    pub fn with_id(id: JobId, image_name: impl Into<String>) -> Self {
        Self {
            id,
            image_name: image_name.into(),
        }
    }

    /// Serialize to the queue's text form.
    pub fn encode(&self) -> DomainResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a queue message.
    pub fn decode(raw: &str) -> DomainResult<Self> {
        let job: Job = serde_json::from_str(raw)?;
        if job.id.as_str().trim().is_empty() {
            return Err(DomainError::invalid_id("job id is empty"));
        }
        Ok(job)
    }

    /// Best-effort extraction of the job id from a message that failed to
    /// decode as a whole (e.g. the image name is missing).
    ///
    /// Returns `None` when the message carries no usable id; such a message
    /// cannot be answered.
    pub fn recover_id(raw: &str) -> Option<JobId> {
        let value: serde_json::Value = serde_json::from_str(raw).ok()?;
        let id = value.get("id").or_else(|| value.get("job_id"))?.clone();
        // Same deserialization path as `decode`, so the key matches what the
        // producer waits on.
        let id: JobId = serde_json::from_value(id).ok()?;
        (!id.as_str().trim().is_empty()).then_some(id)
    }
}

/// Lifecycle of a job as seen by the worker side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    Queued,
    PickedUp,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Lifecycle of a dispatch as seen by the waiting caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    WaitingForResult,
    Found,
    TimedOut,
}

impl WaitState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WaitState::WaitingForResult)
    }
}
