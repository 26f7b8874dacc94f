//! Redis-backed queue and result store.
//!
//! ## Layout
//!
//! - **Queue**: one list (default `service_queue`). Dispatchers `LPUSH`,
//!   workers `BRPOP`, giving FIFO order and an atomic pop across any number
//!   of competing workers.
//! - **Results**: one string key per job (`<job_id>` or
//!   `<namespace>:<job_id>`), written with `SET NX EX` so an entry is never
//!   overwritten and orphans expire.
//!
//! A connection is opened per operation. A Redis restart therefore costs the
//! in-flight call only; the next call reconnects.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use visionq_core::{JobId, Prediction};
use visionq_queue::{JobQueue, QueueError, ResultStore, ResultStoreError};

/// Shared Redis client with an explicit open/close lifecycle.
#[derive(Debug, Clone)]
pub struct RedisConnection {
    client: Arc<redis::Client>,
}

impl RedisConnection {
    /// Open a client for `redis_url` and verify the server answers `PING`.
    pub fn open(redis_url: impl AsRef<str>) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        let this = Self {
            client: Arc::new(client),
        };
        this.ping()?;
        Ok(this)
    }

    pub fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().map_err(QueueError::Connection)?;
        let _: String = redis::cmd("PING")
            .query(&mut conn)
            .map_err(|e| QueueError::Command(format!("PING failed: {}", e)))?;
        Ok(())
    }

    /// Release this handle. Connections are per-operation, so nothing stays
    /// open once every clone is closed.
    pub fn close(self) {
        drop(self);
    }

    pub fn queue(&self, name: impl Into<String>) -> RedisJobQueue {
        RedisJobQueue {
            conn: self.clone(),
            key: name.into(),
        }
    }

    pub fn results(&self, namespace: Option<String>, ttl: Option<Duration>) -> RedisResultStore {
        RedisResultStore {
            conn: self.clone(),
            namespace,
            ttl,
        }
    }

    fn connection(&self) -> Result<redis::Connection, String> {
        self.client.get_connection().map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct RedisJobQueue {
    conn: RedisConnection,
    key: String,
}

impl JobQueue for RedisJobQueue {
    #[instrument(skip(self, message), fields(queue = %self.key), err)]
    fn push(&self, message: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.connection().map_err(QueueError::Connection)?;
        let _: i64 = redis::cmd("LPUSH")
            .arg(&self.key)
            .arg(message)
            .query(&mut conn)
            .map_err(|e| QueueError::Command(format!("LPUSH failed: {}", e)))?;
        Ok(())
    }

    fn pop(&self, timeout: Option<Duration>) -> Result<Option<String>, QueueError> {
        let mut conn = self.conn.connection().map_err(QueueError::Connection)?;

        // BRPOP treats 0 as "block forever".
        let timeout_secs = timeout.map(|t| t.as_secs_f64().max(0.001)).unwrap_or(0.0);

        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.key)
            .arg(timeout_secs)
            .query(&mut conn)
            .map_err(|e| QueueError::Command(format!("BRPOP failed: {}", e)))?;

        Ok(popped.map(|(_, message)| message))
    }

    fn len(&self) -> Result<usize, QueueError> {
        let mut conn = self.conn.connection().map_err(QueueError::Connection)?;
        redis::cmd("LLEN")
            .arg(&self.key)
            .query(&mut conn)
            .map_err(|e| QueueError::Command(format!("LLEN failed: {}", e)))
    }
}

#[derive(Debug, Clone)]
pub struct RedisResultStore {
    conn: RedisConnection,
    namespace: Option<String>,
    ttl: Option<Duration>,
}

impl RedisResultStore {
    pub fn key_for(&self, job_id: &JobId) -> String {
        result_key(self.namespace.as_deref(), job_id)
    }
}

/// Result key layout: the bare job id, or `<namespace>:<job_id>`.
pub fn result_key(namespace: Option<&str>, job_id: &JobId) -> String {
    match namespace {
        Some(ns) => format!("{ns}:{job_id}"),
        None => job_id.to_string(),
    }
}

impl ResultStore for RedisResultStore {
    #[instrument(skip(self, result), fields(job_id = %job_id), err)]
    fn put(&self, job_id: &JobId, result: &Prediction) -> Result<bool, ResultStoreError> {
        let payload = result.encode()?;
        let mut conn = self
            .conn
            .connection()
            .map_err(ResultStoreError::Connection)?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key_for(job_id)).arg(&payload).arg("NX");
        if let Some(ttl) = self.ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }

        // "OK" when written, nil when the key already existed.
        let reply: Option<String> = cmd
            .query(&mut conn)
            .map_err(|e| ResultStoreError::Command(format!("SET failed: {}", e)))?;
        Ok(reply.is_some())
    }

    fn get(&self, job_id: &JobId) -> Result<Option<Prediction>, ResultStoreError> {
        let mut conn = self
            .conn
            .connection()
            .map_err(ResultStoreError::Connection)?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.key_for(job_id))
            .query(&mut conn)
            .map_err(|e| ResultStoreError::Command(format!("GET failed: {}", e)))?;

        match raw {
            Some(raw) => Ok(Some(Prediction::decode(&raw)?)),
            None => Ok(None),
        }
    }

    fn delete(&self, job_id: &JobId) -> Result<(), ResultStoreError> {
        let mut conn = self
            .conn
            .connection()
            .map_err(ResultStoreError::Connection)?;
        let removed: i64 = redis::cmd("DEL")
            .arg(self.key_for(job_id))
            .query(&mut conn)
            .map_err(|e| ResultStoreError::Command(format!("DEL failed: {}", e)))?;
        debug!(job_id = %job_id, removed, "result deleted");
        Ok(())
    }
}
