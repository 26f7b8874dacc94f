//! In-memory job queue for tests/dev.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::queue::{JobQueue, QueueError};

/// In-process FIFO queue.
///
/// - No IO
/// - Pop is atomic under the mutex, so competing workers never share a message
/// - Blocking pops park on a condition variable instead of spinning
#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    messages: Mutex<VecDeque<String>>,
    available: Condvar,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the waiting messages, head first.
    pub fn snapshot(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl JobQueue for InMemoryJobQueue {
    fn push(&self, message: &str) -> Result<(), QueueError> {
        let mut messages = self.messages.lock().map_err(|_| QueueError::Poisoned)?;
        messages.push_back(message.to_string());
        self.available.notify_one();
        Ok(())
    }

    fn pop(&self, timeout: Option<Duration>) -> Result<Option<String>, QueueError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut messages = self.messages.lock().map_err(|_| QueueError::Poisoned)?;

        loop {
            if let Some(message) = messages.pop_front() {
                return Ok(Some(message));
            }

            messages = match deadline {
                None => self
                    .available
                    .wait(messages)
                    .map_err(|_| QueueError::Poisoned)?,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    self.available
                        .wait_timeout(messages, deadline - now)
                        .map_err(|_| QueueError::Poisoned)?
                        .0
                }
            };
        }
    }

    fn len(&self) -> Result<usize, QueueError> {
        Ok(self.messages.lock().map_err(|_| QueueError::Poisoned)?.len())
    }
}
