//! Worker loop: pop a job, classify its artifact, write the result.
//!
//! ## Guarantees
//!
//! - A decoded job always ends with a result entry under its id: the
//!   prediction on success, the `("error", 0.0)` sentinel on any failure
//!   (missing artifact, bad name, inference error, classifier panic).
//! - A per-job failure never stops the loop. Queue outages are retried with
//!   backoff for as long as the worker runs; a result write is retried up to
//!   the limit of its `RetryPolicy`.
//! - Several workers may consume one queue; the queue's atomic pop keeps any
//!   job from being handled twice.
//!
//! Popping uses a bounded wait (`pop_timeout`) only so that the thread can
//! notice a shutdown request. Killing the process while a job is in flight
//! loses that job (at-most-once).

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use visionq_ai::{Classification, Classifier, InferenceError};
use visionq_core::{Job, JobId, JobState, Prediction};
use visionq_queue::{JobQueue, QueueError, ResultStore};

use crate::retry::RetryPolicy;
use crate::uploads::{ArtifactError, UploadStore};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Name for logging and the thread name.
    pub name: String,
    /// Pause after each handled job (coarse rate limit).
    pub idle_sleep: Duration,
    /// Upper bound on one blocking pop, so shutdown is noticed.
    pub pop_timeout: Duration,
    /// Backoff for queue and result-store failures.
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "visionq-worker".to_string(),
            idle_sleep: Duration::from_millis(50),
            pop_timeout: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }
}

/// Why a job ended in the error sentinel.
#[derive(Debug, thiserror::Error)]
pub enum JobFailure {
    #[error("undecodable job message: {0}")]
    Decode(String),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("classifier panicked: {0}")]
    Panicked(String),
}

/// What happened to one popped message.
#[derive(Debug, Clone, PartialEq)]
pub enum Processed {
    /// A result entry was written (prediction or sentinel).
    Recorded {
        job_id: JobId,
        state: JobState,
        prediction: Prediction,
    },
    /// An entry already existed under this id; nothing was overwritten.
    AlreadyRecorded { job_id: JobId },
    /// The message carried no usable job id; nobody can be answered.
    Discarded,
    /// The result could not be stored even after retries.
    Lost { job_id: JobId },
}

/// Worker runtime statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkerStats {
    pub jobs_processed: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub messages_discarded: u64,
    pub results_skipped: u64,
    pub results_lost: u64,
    pub queue_errors: u64,
    pub started_at: DateTime<Utc>,
    pub last_job_at: Option<DateTime<Utc>>,
}

impl Default for WorkerStats {
    fn default() -> Self {
        Self {
            jobs_processed: 0,
            jobs_completed: 0,
            jobs_failed: 0,
            messages_discarded: 0,
            results_skipped: 0,
            results_lost: 0,
            queue_errors: 0,
            started_at: Utc::now(),
            last_job_at: None,
        }
    }
}

impl WorkerStats {
    fn record(&mut self, processed: &Processed) {
        self.jobs_processed += 1;
        self.last_job_at = Some(Utc::now());
        match processed {
            Processed::Recorded {
                state: JobState::Completed,
                ..
            } => self.jobs_completed += 1,
            Processed::Recorded { .. } => self.jobs_failed += 1,
            Processed::AlreadyRecorded { .. } => self.results_skipped += 1,
            Processed::Discarded => self.messages_discarded += 1,
            Processed::Lost { .. } => self.results_lost += 1,
        }
    }
}

/// Handle to control a running worker thread.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request graceful shutdown and wait for the thread to stop. The job in
    /// hand, if any, is finished first.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    /// Wait for the worker to exit without asking it to (blocks for the life
    /// of the worker).
    pub fn join(mut self) {
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// A queue consumer that runs inference on each job.
#[derive(Clone)]
pub struct Worker<Q, S, C> {
    queue: Q,
    results: S,
    uploads: UploadStore,
    classifier: C,
    config: WorkerConfig,
}

impl<Q, S, C> Worker<Q, S, C>
where
    Q: JobQueue + 'static,
    S: ResultStore + 'static,
    C: Classifier,
{
    pub fn new(
        queue: Q,
        results: S,
        uploads: UploadStore,
        classifier: C,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            results,
            uploads,
            classifier,
            config,
        }
    }

    /// Handle one raw queue message end to end.
    pub fn handle_message(&self, raw: &str) -> Processed {
        let job = match Job::decode(raw) {
            Ok(job) => job,
            Err(e) => {
                let failure = JobFailure::Decode(e.to_string());
                return match Job::recover_id(raw) {
                    Some(job_id) => {
                        warn!(
                            worker = %self.config.name,
                            job_id = %job_id,
                            error = %failure,
                            "job failed"
                        );
                        self.record(job_id, Prediction::failure(), JobState::Failed)
                    }
                    None => {
                        error!(
                            worker = %self.config.name,
                            error = %failure,
                            message = raw,
                            "discarding message without job id"
                        );
                        Processed::Discarded
                    }
                };
            }
        };

        debug!(
            worker = %self.config.name,
            job_id = %job.id,
            image_name = %job.image_name,
            state = ?JobState::PickedUp,
            "picked up job"
        );

        match self.classify(&job) {
            Ok(classification) => {
                debug!(
                    worker = %self.config.name,
                    job_id = %job.id,
                    label = %classification.label,
                    confidence = classification.confidence,
                    "job completed"
                );
                self.record(job.id, classification.into(), JobState::Completed)
            }
            Err(failure) => {
                warn!(
                    worker = %self.config.name,
                    job_id = %job.id,
                    image_name = %job.image_name,
                    error = %failure,
                    "job failed"
                );
                self.record(job.id, Prediction::failure(), JobState::Failed)
            }
        }
    }

    /// Run the classifier on the job's artifact. A panicking classifier is
    /// contained here so the job still gets its sentinel.
    fn classify(&self, job: &Job) -> Result<Classification, JobFailure> {
        let image = self.uploads.resolve(&job.image_name)?;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.classifier.classify(&image)))
            .map_err(|payload| JobFailure::Panicked(panic_message(payload.as_ref())))?;
        Ok(outcome?.validate()?)
    }

    /// Persist the terminal result, retrying store failures with backoff.
    fn record(&self, job_id: JobId, prediction: Prediction, state: JobState) -> Processed {
        let mut attempt = 0;
        loop {
            match self.results.put(&job_id, &prediction) {
                Ok(true) => {
                    return Processed::Recorded {
                        job_id,
                        state,
                        prediction,
                    };
                }
                Ok(false) => {
                    warn!(
                        worker = %self.config.name,
                        job_id = %job_id,
                        "result already present; not overwriting"
                    );
                    return Processed::AlreadyRecorded { job_id };
                }
                Err(e) => {
                    attempt += 1;
                    if !self.config.retry.should_retry(attempt) {
                        error!(
                            worker = %self.config.name,
                            job_id = %job_id,
                            error = %e,
                            attempts = attempt,
                            "giving up on storing result"
                        );
                        return Processed::Lost { job_id };
                    }
                    let delay = self.config.retry.delay_for_attempt(attempt);
                    warn!(
                        worker = %self.config.name,
                        job_id = %job_id,
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "result write failed; retrying"
                    );
                    thread::sleep(delay);
                }
            }
        }
    }

    /// Pop and handle at most one message, waiting up to `timeout`.
    ///
    /// Returns `Ok(None)` when nothing arrived.
    pub fn run_once(&self, timeout: Option<Duration>) -> Result<Option<Processed>, QueueError> {
        match self.queue.pop(timeout)? {
            Some(raw) => Ok(Some(self.handle_message(&raw))),
            None => Ok(None),
        }
    }

    /// Spawn the worker on its own thread.
    pub fn spawn(self) -> std::io::Result<WorkerHandle>
    where
        Q: Send,
        S: Send,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let stats_clone = stats.clone();
        let name = self.config.name.clone();

        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(self, shutdown_rx, stats_clone))?;

        Ok(WorkerHandle {
            name,
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

fn worker_loop<Q, S, C>(
    worker: Worker<Q, S, C>,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<WorkerStats>>,
) where
    Q: JobQueue + 'static,
    S: ResultStore + 'static,
    C: Classifier,
{
    let name = worker.config.name.clone();
    info!(worker = %name, "worker started");
    let started = Instant::now();
    let mut consecutive_errors: u32 = 0;

    loop {
        // Shutdown check (non-blocking). A dropped handle leaves the worker
        // running.
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match worker.run_once(Some(worker.config.pop_timeout)) {
            Ok(Some(processed)) => {
                consecutive_errors = 0;
                if let Ok(mut s) = stats.lock() {
                    s.record(&processed);
                }
                thread::sleep(worker.config.idle_sleep);
            }
            Ok(None) => {
                consecutive_errors = 0;
            }
            Err(e) => {
                consecutive_errors = consecutive_errors.saturating_add(1);
                let delay = worker.config.retry.delay_for_attempt(consecutive_errors);
                if let Ok(mut s) = stats.lock() {
                    s.queue_errors += 1;
                }
                error!(
                    worker = %name,
                    error = %e,
                    attempt = consecutive_errors,
                    delay_ms = delay.as_millis() as u64,
                    "queue pop failed; backing off"
                );
                if shutdown_rx.recv_timeout(delay).is_ok() {
                    break;
                }
            }
        }
    }

    info!(worker = %name, uptime_secs = started.elapsed().as_secs(), "worker stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A set of workers competing on one queue.
#[derive(Debug, Default)]
pub struct WorkerPool {
    handles: Vec<WorkerHandle>,
}

impl WorkerPool {
    /// Spawn `count` clones of `worker`, named `<name>-<n>`.
    ///
    /// A pool of zero workers would never answer anything; `count == 0` is
    /// rejected with `InvalidInput`.
    pub fn spawn<Q, S, C>(worker: Worker<Q, S, C>, count: usize) -> std::io::Result<Self>
    where
        Q: JobQueue + Clone + Send + 'static,
        S: ResultStore + Clone + Send + 'static,
        C: Classifier + Clone,
    {
        if count == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "worker pool needs at least one worker",
            ));
        }

        let base = worker.config.name.clone();
        let mut handles = Vec::with_capacity(count);
        for n in 1..=count {
            let mut w = worker.clone();
            w.config.name = format!("{base}-{n}");
            handles.push(w.spawn()?);
        }
        Ok(Self { handles })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Combined statistics of every worker.
    pub fn stats(&self) -> Vec<(String, WorkerStats)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.stats()))
            .collect()
    }

    pub fn shutdown(self) {
        // Signal everyone first so they stop in parallel.
        for h in &self.handles {
            let _ = h.shutdown.send(());
        }
        for h in self.handles {
            h.join();
        }
    }

    pub fn join(self) {
        for h in self.handles {
            h.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use visionq_ai::FnClassifier;
    use visionq_queue::{InMemoryJobQueue, InMemoryResultStore, ResultStoreError};

    use super::*;
    use crate::uploads::InMemoryArtifactStore;

    type Classify = fn(&[u8]) -> Result<Classification, InferenceError>;

    fn dog(_: &[u8]) -> Result<Classification, InferenceError> {
        Ok(Classification::new("dog", 0.9231))
    }

    fn broken(_: &[u8]) -> Result<Classification, InferenceError> {
        Err(InferenceError::InferenceFailed("model exploded".into()))
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            idle_sleep: Duration::ZERO,
            pop_timeout: Duration::from_millis(20),
            retry: RetryPolicy::fixed(3, Duration::from_millis(1)),
            ..Default::default()
        }
    }

    fn setup(
        classify: Classify,
    ) -> (
        Arc<InMemoryJobQueue>,
        Arc<InMemoryResultStore>,
        UploadStore,
        Worker<Arc<InMemoryJobQueue>, Arc<InMemoryResultStore>, Arc<FnClassifier<Classify>>>,
    ) {
        let queue = Arc::new(InMemoryJobQueue::new());
        let results = Arc::new(InMemoryResultStore::new());
        let uploads = UploadStore::new(Arc::new(InMemoryArtifactStore::new()));
        let worker = Worker::new(
            queue.clone(),
            results.clone(),
            uploads.clone(),
            Arc::new(FnClassifier::new(classify)),
            fast_config(),
        );
        (queue, results, uploads, worker)
    }

    fn id(s: &str) -> JobId {
        s.parse().unwrap()
    }

    #[test]
    fn successful_job_writes_prediction() {
        let (_, results, uploads, worker) = setup(dog);
        let name = uploads.put("dog.jpg", b"woof").unwrap();
        let raw = Job::with_id(id("J1"), name.as_str()).encode().unwrap();

        let processed = worker.handle_message(&raw);
        assert!(matches!(
            processed,
            Processed::Recorded {
                state: JobState::Completed,
                ..
            }
        ));
        assert_eq!(
            results.raw(&id("J1")).unwrap(),
            r#"{"prediction":"dog","score":0.9231,"status":"ok"}"#
        );
    }

    #[test]
    fn inference_failure_writes_sentinel() {
        let (_, results, uploads, worker) = setup(broken);
        let name = uploads.put("x.png", b"data").unwrap();
        let raw = Job::with_id(id("J2"), name.as_str()).encode().unwrap();

        let processed = worker.handle_message(&raw);
        assert!(matches!(
            processed,
            Processed::Recorded {
                state: JobState::Failed,
                ..
            }
        ));

        let stored = results.get(&id("J2")).unwrap().unwrap();
        assert_eq!(stored.label(), Some("error"));
        assert_eq!(stored.score, Some(0.0));
        assert!(stored.is_error());
    }

    #[test]
    fn missing_artifact_writes_sentinel() {
        let (_, results, _, worker) = setup(dog);
        let raw = Job::with_id(id("J3"), "abc123.jpg").encode().unwrap();
        worker.handle_message(&raw);
        assert!(results.get(&id("J3")).unwrap().unwrap().is_error());
    }

    #[test]
    fn traversal_name_writes_sentinel() {
        let (_, results, _, worker) = setup(dog);
        let raw = Job::with_id(id("J4"), "../../etc/passwd").encode().unwrap();
        worker.handle_message(&raw);
        assert!(results.get(&id("J4")).unwrap().unwrap().is_error());
    }

    #[test]
    fn partially_decodable_message_is_answered() {
        let (_, results, _, worker) = setup(dog);
        worker.handle_message(r#"{"id": "J5"}"#);
        assert!(results.get(&id("J5")).unwrap().unwrap().is_error());
    }

    #[test]
    fn message_without_id_is_discarded() {
        let (_, results, _, worker) = setup(dog);
        assert_eq!(worker.handle_message("garbage"), Processed::Discarded);
        assert!(results.is_empty());
    }

    #[test]
    fn existing_result_is_not_overwritten() {
        let (_, results, uploads, worker) = setup(dog);
        results.put(&id("J6"), &Prediction::success("cat", 0.5)).unwrap();
        let name = uploads.put("d.jpg", b"woof").unwrap();
        let raw = Job::with_id(id("J6"), name.as_str()).encode().unwrap();

        assert_eq!(
            worker.handle_message(&raw),
            Processed::AlreadyRecorded { job_id: id("J6") }
        );
        assert_eq!(results.get(&id("J6")).unwrap().unwrap().label(), Some("cat"));
    }

    #[test]
    fn padded_id_is_answered_under_the_exact_id() {
        let (_, results, _, worker) = setup(dog);
        worker.handle_message(r#"{"id": " J1 "}"#);

        assert!(results.get(&id(" J1 ")).unwrap().unwrap().is_error());
        assert!(results.get(&id("J1")).unwrap().is_none());
    }

    #[test]
    fn non_finite_confidence_becomes_sentinel() {
        fn nan(_: &[u8]) -> Result<Classification, InferenceError> {
            Ok(Classification {
                label: "dog".into(),
                confidence: f64::NAN,
            })
        }

        let (_, results, uploads, worker) = setup(nan);
        let name = uploads.put("d.jpg", b"woof").unwrap();
        let raw = Job::with_id(id("J10"), name.as_str()).encode().unwrap();

        assert!(matches!(
            worker.handle_message(&raw),
            Processed::Recorded {
                state: JobState::Failed,
                ..
            }
        ));
        assert!(results.get(&id("J10")).unwrap().unwrap().is_error());
    }

    #[test]
    fn classifier_panic_writes_sentinel_and_worker_keeps_running() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let results = Arc::new(InMemoryResultStore::new());
        let uploads = UploadStore::new(Arc::new(InMemoryArtifactStore::new()));
        let panicked = Arc::new(AtomicBool::new(false));

        let classifier = {
            let panicked = panicked.clone();
            FnClassifier::new(move |_: &[u8]| {
                if !panicked.swap(true, Ordering::SeqCst) {
                    panic!("model blew up");
                }
                Ok(Classification::new("dog", 0.9231))
            })
        };
        let worker = Worker::new(
            queue.clone(),
            results.clone(),
            uploads.clone(),
            Arc::new(classifier),
            fast_config(),
        );

        let name = uploads.put("d.jpg", b"woof").unwrap();
        for job_id in ["P1", "P2"] {
            let raw = Job::with_id(id(job_id), name.as_str()).encode().unwrap();
            queue.push(&raw).unwrap();
        }

        let handle = worker.spawn().unwrap();
        let first = results
            .wait_for(&id("P1"), Duration::from_secs(5), Duration::from_millis(5))
            .unwrap()
            .unwrap();
        let second = results
            .wait_for(&id("P2"), Duration::from_secs(5), Duration::from_millis(5))
            .unwrap()
            .unwrap();

        assert!(first.is_error());
        assert_eq!(second.label(), Some("dog"));
        assert!(queue.is_empty().unwrap());
        handle.shutdown();
    }

    #[test]
    fn pool_of_zero_workers_is_rejected() {
        let (_, _, _, worker) = setup(dog);
        let err = WorkerPool::spawn(worker, 0).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }

    /// Result store that fails a configurable number of writes first.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryResultStore,
        failures_left: AtomicU32,
    }

    impl ResultStore for FlakyStore {
        fn put(&self, job_id: &JobId, result: &Prediction) -> Result<bool, ResultStoreError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ResultStoreError::Connection("connection refused".into()));
            }
            self.inner.put(job_id, result)
        }

        fn get(&self, job_id: &JobId) -> Result<Option<Prediction>, ResultStoreError> {
            self.inner.get(job_id)
        }

        fn delete(&self, job_id: &JobId) -> Result<(), ResultStoreError> {
            self.inner.delete(job_id)
        }
    }

    type FlakyWorker = Worker<Arc<InMemoryJobQueue>, Arc<FlakyStore>, Arc<FnClassifier<Classify>>>;

    fn flaky_worker(failures: u32) -> (Arc<FlakyStore>, UploadStore, FlakyWorker) {
        let store = Arc::new(FlakyStore {
            failures_left: AtomicU32::new(failures),
            ..Default::default()
        });
        let uploads = UploadStore::new(Arc::new(InMemoryArtifactStore::new()));
        let worker = Worker::new(
            Arc::new(InMemoryJobQueue::new()),
            store.clone(),
            uploads.clone(),
            Arc::new(FnClassifier::new(dog as Classify)),
            fast_config(),
        );
        (store, uploads, worker)
    }

    #[test]
    fn transient_store_failures_are_retried() {
        let (store, uploads, worker) = flaky_worker(2);
        let name = uploads.put("d.jpg", b"woof").unwrap();
        let raw = Job::with_id(id("J8"), name.as_str()).encode().unwrap();

        assert!(matches!(worker.handle_message(&raw), Processed::Recorded { .. }));
        assert!(store.get(&id("J8")).unwrap().is_some());
    }

    #[test]
    fn persistent_store_failure_loses_result_but_not_the_worker() {
        let (_, uploads, worker) = flaky_worker(100);
        let name = uploads.put("d.jpg", b"woof").unwrap();
        let raw = Job::with_id(id("J9"), name.as_str()).encode().unwrap();

        assert_eq!(worker.handle_message(&raw), Processed::Lost { job_id: id("J9") });
    }

    #[test]
    fn spawned_worker_drains_queue_and_reports_stats() {
        let (queue, results, uploads, worker) = setup(dog);
        let name = uploads.put("d.jpg", b"woof").unwrap();
        for i in 0..5 {
            let raw = Job::with_id(id(&format!("J{i}")), name.as_str()).encode().unwrap();
            queue.push(&raw).unwrap();
        }
        queue.push("garbage").unwrap();

        let handle = worker.spawn().unwrap();
        for i in 0..5 {
            let got = results
                .wait_for(&id(&format!("J{i}")), Duration::from_secs(5), Duration::from_millis(5))
                .unwrap();
            assert_eq!(got.unwrap().label(), Some("dog"));
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.stats().jobs_processed < 6 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let stats = handle.stats();
        assert_eq!(stats.jobs_completed, 5);
        assert_eq!(stats.messages_discarded, 1);
        handle.shutdown();
    }

    /// Queue whose pops fail until `healthy_after` calls have been made.
    struct BrokenQueue {
        inner: InMemoryJobQueue,
        calls: AtomicU32,
        healthy_after: u32,
    }

    impl JobQueue for BrokenQueue {
        fn push(&self, message: &str) -> Result<(), QueueError> {
            self.inner.push(message)
        }

        fn pop(&self, timeout: Option<Duration>) -> Result<Option<String>, QueueError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.healthy_after {
                return Err(QueueError::Connection("down".into()));
            }
            self.inner.pop(timeout)
        }

        fn len(&self) -> Result<usize, QueueError> {
            self.inner.len()
        }
    }

    #[test]
    fn worker_survives_queue_outage() {
        let queue = Arc::new(BrokenQueue {
            inner: InMemoryJobQueue::new(),
            calls: AtomicU32::new(0),
            healthy_after: 3,
        });
        let results = Arc::new(InMemoryResultStore::new());
        let uploads = UploadStore::new(Arc::new(InMemoryArtifactStore::new()));
        let name = uploads.put("d.jpg", b"woof").unwrap();
        queue
            .push(&Job::with_id(id("after-outage"), name.as_str()).encode().unwrap())
            .unwrap();

        let handle = Worker::new(
            queue.clone(),
            results.clone(),
            uploads,
            Arc::new(FnClassifier::new(dog as Classify)),
            fast_config(),
        )
        .spawn()
        .unwrap();

        let got = results
            .wait_for(&id("after-outage"), Duration::from_secs(5), Duration::from_millis(5))
            .unwrap();
        assert!(got.is_some());
        assert_eq!(handle.stats().queue_errors, 3);
        handle.shutdown();
    }
}
