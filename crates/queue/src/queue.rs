//! FIFO job channel between dispatchers and workers.
//!
//! ## Delivery
//!
//! - **Competing consumers**: any number of workers may pop from one queue;
//!   each message is handed to exactly one of them. Implementations must make
//!   `pop` atomic per item.
//! - **At-most-once**: a popped message is gone. If the worker holding it dies
//!   before writing a result, the job is lost and its dispatcher times out.
//! - **FIFO**: push appends to the tail, pop takes from the head. Ordering is
//!   for latency only; nothing relies on it for correctness.
//!
//! Messages are opaque text here. Encoding and decoding of [`Job`] happens at
//! the edges so that a worker can still answer a message that only partially
//! decodes.
//!
//! [`Job`]: visionq_core::Job

use std::sync::Arc;
use std::time::Duration;

/// Errors raised by queue transports.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue connection error: {0}")]
    Connection(String),

    #[error("queue command error: {0}")]
    Command(String),

    /// Internal lock poisoning (in-memory implementation).
    #[error("queue lock poisoned")]
    Poisoned,
}

/// Shared job queue.
///
/// The trait requires `Send + Sync`; one instance is shared by every
/// dispatcher and worker in the process.
pub trait JobQueue: Send + Sync {
    /// Append a message to the tail of the queue. Fire-and-forget: there is
    /// no acknowledgment from any consumer.
    fn push(&self, message: &str) -> Result<(), QueueError>;

    /// Remove and return the message at the head of the queue.
    ///
    /// Blocks until a message is available. With `Some(timeout)` the wait is
    /// bounded and `Ok(None)` means nothing arrived in time; with `None` the
    /// call blocks indefinitely.
    fn pop(&self, timeout: Option<Duration>) -> Result<Option<String>, QueueError>;

    /// Number of messages waiting.
    fn len(&self) -> Result<usize, QueueError>;

    fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len()? == 0)
    }
}

impl<Q> JobQueue for Arc<Q>
where
    Q: JobQueue + ?Sized,
{
    fn push(&self, message: &str) -> Result<(), QueueError> {
        (**self).push(message)
    }

    fn pop(&self, timeout: Option<Duration>) -> Result<Option<String>, QueueError> {
        (**self).pop(timeout)
    }

    fn len(&self) -> Result<usize, QueueError> {
        (**self).len()
    }
}
