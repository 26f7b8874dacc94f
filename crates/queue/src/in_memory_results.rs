//! In-memory result store for tests/dev.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use visionq_core::{JobId, Prediction};

use crate::results::{ResultStore, ResultStoreError};

#[derive(Debug)]
struct Entry {
    raw: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-process result store.
///
/// Entries are kept in their serialized wire form so reads exercise the same
/// decoding path as a remote store. An optional TTL expires orphaned entries
/// (results whose dispatcher already gave up). Waiters are woken by a
/// condition variable as soon as any entry is written.
#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    entries: Mutex<HashMap<JobId, Entry>>,
    written: Condvar,
    ttl: Option<Duration>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose entries expire `ttl` after being written.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    /// Raw serialized entry for `job_id` (expired entries are hidden).
    pub fn raw(&self, job_id: &JobId) -> Option<String> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(job_id)
            .filter(|e| !e.is_expired(Instant::now()))
            .map(|e| e.raw.clone())
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|e| e.values().filter(|e| !e.is_expired(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_expired(entries: &mut HashMap<JobId, Entry>) {
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        let purged = before - entries.len();
        if purged > 0 {
            debug!(purged, "expired orphaned results");
        }
    }
}

impl ResultStore for InMemoryResultStore {
    fn put(&self, job_id: &JobId, result: &Prediction) -> Result<bool, ResultStoreError> {
        let raw = result.encode()?;
        let mut entries = self.entries.lock().map_err(|_| ResultStoreError::Poisoned)?;
        Self::purge_expired(&mut entries);

        if entries.contains_key(job_id) {
            return Ok(false);
        }
        entries.insert(
            job_id.clone(),
            Entry {
                raw,
                expires_at: self.ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        self.written.notify_all();
        Ok(true)
    }

    fn get(&self, job_id: &JobId) -> Result<Option<Prediction>, ResultStoreError> {
        let mut entries = self.entries.lock().map_err(|_| ResultStoreError::Poisoned)?;
        Self::purge_expired(&mut entries);

        match entries.get(job_id) {
            Some(entry) => Ok(Some(Prediction::decode(&entry.raw)?)),
            None => Ok(None),
        }
    }

    fn delete(&self, job_id: &JobId) -> Result<(), ResultStoreError> {
        let mut entries = self.entries.lock().map_err(|_| ResultStoreError::Poisoned)?;
        entries.remove(job_id);
        Ok(())
    }

    /// Notification-based wait: parks on the condition variable instead of
    /// sleeping a fixed interval. `poll_interval` is unused.
    fn wait_for(
        &self,
        job_id: &JobId,
        timeout: Duration,
        _poll_interval: Duration,
    ) -> Result<Option<Prediction>, ResultStoreError> {
        let deadline = Instant::now() + timeout;
        let mut entries = self.entries.lock().map_err(|_| ResultStoreError::Poisoned)?;

        loop {
            Self::purge_expired(&mut entries);
            if let Some(entry) = entries.get(job_id) {
                return Ok(Some(Prediction::decode(&entry.raw)?));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            entries = self
                .written
                .wait_timeout(entries, deadline - now)
                .map_err(|_| ResultStoreError::Poisoned)?
                .0;
        }
    }
}
