//! Key-value store of completed job outputs.
//!
//! Each entry is keyed by its job id, written once by the worker that ran the
//! job and read then deleted once by the dispatcher that submitted it. One
//! writer and one reader per key means no cross-key locking is needed.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use visionq_core::{DomainError, JobId, Prediction};

#[derive(Debug, thiserror::Error)]
pub enum ResultStoreError {
    #[error("result store connection error: {0}")]
    Connection(String),

    #[error("result store command error: {0}")]
    Command(String),

    /// A stored entry could not be decoded, or a prediction could not be
    /// encoded.
    #[error("result entry codec error: {0}")]
    Codec(#[from] DomainError),

    /// Internal lock poisoning (in-memory implementation).
    #[error("result store lock poisoned")]
    Poisoned,
}

pub trait ResultStore: Send + Sync {
    /// Write `result` under `job_id` unless an entry already exists.
    ///
    /// Returns `true` if this call wrote the entry. Existing entries are
    /// never overwritten.
    fn put(&self, job_id: &JobId, result: &Prediction) -> Result<bool, ResultStoreError>;

    /// Read the entry for `job_id`, if present.
    fn get(&self, job_id: &JobId) -> Result<Option<Prediction>, ResultStoreError>;

    /// Remove the entry for `job_id`. Deleting a missing key is not an error.
    fn delete(&self, job_id: &JobId) -> Result<(), ResultStoreError>;

    /// Wait until an entry for `job_id` appears or `timeout` elapses.
    ///
    /// The default polls [`get`](Self::get) every `poll_interval`. Sleeps are
    /// clamped to the remaining budget and the store is read once more at the
    /// deadline, so a result that lands at the last moment is still returned.
    /// Implementations with a notification mechanism should override this.
    fn wait_for(
        &self,
        job_id: &JobId,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Option<Prediction>, ResultStoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(result) = self.get(job_id)? {
                return Ok(Some(result));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(poll_interval.min(deadline - now));
        }
    }
}

impl<S> ResultStore for Arc<S>
where
    S: ResultStore + ?Sized,
{
    fn put(&self, job_id: &JobId, result: &Prediction) -> Result<bool, ResultStoreError> {
        (**self).put(job_id, result)
    }

    fn get(&self, job_id: &JobId) -> Result<Option<Prediction>, ResultStoreError> {
        (**self).get(job_id)
    }

    fn delete(&self, job_id: &JobId) -> Result<(), ResultStoreError> {
        (**self).delete(job_id)
    }

    fn wait_for(
        &self,
        job_id: &JobId,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Option<Prediction>, ResultStoreError> {
        (**self).wait_for(job_id, timeout, poll_interval)
    }
}
