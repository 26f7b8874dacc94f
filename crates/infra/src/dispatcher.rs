//! Front-end side of the inference protocol: enqueue, then wait.
//!
//! ## Dispatch Flow
//!
//! ```text
//! image_name
//!   ↓
//! 1. Mint a fresh JobId
//!   ↓
//! 2. Push {"id", "image_name"} onto the queue tail (fire-and-forget)
//!   ↓
//! 3. Wait on the result store for key `id` (poll_interval / poll_timeout)
//!   ↓
//! 4a. Found   → read, delete the key, return the prediction
//! 4b. Timeout → DispatchError::Timeout (the queued job is NOT retracted)
//! ```
//!
//! The dispatcher owns no mutable state; it composes a [`JobQueue`] and a
//! [`ResultStore`] and can be shared across threads and called concurrently.
//!
//! ## Timeout Semantics
//!
//! The budget starts once the job is on the queue. The store is read one last
//! time at the deadline before a timeout is declared, so a result that lands
//! exactly at the cutoff is returned rather than dropped. Waits are clamped
//! to the remaining budget: a call never blocks past `poll_timeout` plus one
//! store read.
//!
//! A timed-out job may still complete later. Its result is then an orphan
//! with no reader; stores bound that growth with a TTL.

use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use visionq_core::{DomainError, Job, JobId, Prediction, WaitState};
use visionq_queue::{JobQueue, QueueError, ResultStore, ResultStoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Pause between result-store reads (polling stores only).
    pub poll_interval: Duration,
    /// Total wait budget per job, measured from enqueue.
    pub poll_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            poll_timeout: Duration::from_secs(45),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No result appeared within the wait budget. Maps to a gateway-timeout
    /// style failure for callers; never retried automatically.
    #[error("no result for job {job_id} after {waited:?}")]
    Timeout { job_id: JobId, waited: Duration },

    /// The job could not be enqueued.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The result store failed while waiting.
    #[error(transparent)]
    Results(#[from] ResultStoreError),

    /// The job could not be encoded.
    #[error(transparent)]
    Encode(#[from] DomainError),
}

impl DispatchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DispatchError::Timeout { .. })
    }
}

/// Enqueues inference jobs and waits for their results.
#[derive(Debug, Clone)]
pub struct Dispatcher<Q, S> {
    queue: Q,
    results: S,
    config: DispatcherConfig,
}

impl<Q, S> Dispatcher<Q, S>
where
    Q: JobQueue,
    S: ResultStore,
{
    pub fn new(queue: Q, results: S, config: DispatcherConfig) -> Self {
        Self {
            queue,
            results,
            config,
        }
    }

    /// Classify the stored artifact `image_name` and return its prediction.
    #[instrument(skip(self), err)]
    pub fn dispatch(&self, image_name: &str) -> Result<Prediction, DispatchError> {
        let job = Job::new(image_name);
        self.submit(&job)?;
        self.await_result(&job.id)
    }

    /// Push `job` onto the queue without waiting.
    pub fn submit(&self, job: &Job) -> Result<(), DispatchError> {
        let message = job.encode()?;
        self.queue.push(&message)?;
        debug!(job_id = %job.id, image_name = %job.image_name, "job queued");
        Ok(())
    }

    /// Wait for the result of a previously submitted job, then remove it
    /// from the store.
    pub fn await_result(&self, job_id: &JobId) -> Result<Prediction, DispatchError> {
        let started = Instant::now();
        let found = self.results.wait_for(
            job_id,
            self.config.poll_timeout,
            self.config.poll_interval,
        )?;

        let (state, outcome) = match found {
            Some(prediction) => {
                // The prediction is already in hand; a failed delete leaves
                // an entry for the store's TTL to reclaim.
                if let Err(e) = self.results.delete(job_id) {
                    warn!(job_id = %job_id, error = %e, "failed to delete consumed result");
                }
                (WaitState::Found, Ok(prediction))
            }
            None => (
                WaitState::TimedOut,
                Err(DispatchError::Timeout {
                    job_id: job_id.clone(),
                    waited: started.elapsed(),
                }),
            ),
        };

        debug!(
            job_id = %job_id,
            state = ?state,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "wait finished"
        );
        outcome
    }
}
