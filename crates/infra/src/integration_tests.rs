//! End-to-end tests for the inference pipeline.
//!
//! Upload → Dispatcher → Queue → Worker threads → ResultStore → Dispatcher
//!
//! Everything runs over the in-memory backends with real worker threads.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use visionq_ai::{Classification, FnClassifier, InferenceError};
    use visionq_core::{ArtifactName, Job, JobId, Prediction, content_digest};
    use visionq_queue::{InMemoryJobQueue, InMemoryResultStore, JobQueue, ResultStore};

    use crate::dispatcher::{Dispatcher, DispatcherConfig};
    use crate::predict::PredictionService;
    use crate::retry::RetryPolicy;
    use crate::uploads::{InMemoryArtifactStore, UploadStore};
    use crate::worker::{Worker, WorkerConfig, WorkerPool};

    type Queue = Arc<InMemoryJobQueue>;
    type Results = Arc<InMemoryResultStore>;
    type Classify = fn(&[u8]) -> Result<Classification, InferenceError>;

    /// Labels by the first byte so tests can steer outcomes through content.
    fn by_first_byte(image: &[u8]) -> Result<Classification, InferenceError> {
        match image.first() {
            Some(b'd') => Ok(Classification::new("dog", 0.9231)),
            Some(b'c') => Ok(Classification::new("cat", 0.87654)),
            Some(b'!') => Err(InferenceError::InferenceFailed("cannot decode image".into())),
            _ => Ok(Classification::new("unknown", 0.1)),
        }
    }

    struct Pipeline {
        queue: Queue,
        results: Results,
        uploads: UploadStore,
        artifacts: Arc<InMemoryArtifactStore>,
        dispatcher: Dispatcher<Queue, Results>,
    }

    impl Pipeline {
        fn new(poll_timeout: Duration) -> Self {
            let queue = Arc::new(InMemoryJobQueue::new());
            let results = Arc::new(InMemoryResultStore::new());
            let artifacts = Arc::new(InMemoryArtifactStore::new());
            let uploads = UploadStore::new(artifacts.clone());
            let dispatcher = Dispatcher::new(
                queue.clone(),
                results.clone(),
                DispatcherConfig {
                    poll_interval: Duration::from_millis(5),
                    poll_timeout,
                },
            );
            Self {
                queue,
                results,
                uploads,
                artifacts,
                dispatcher,
            }
        }

        fn workers(&self, count: usize) -> WorkerPool {
            let worker = Worker::new(
                self.queue.clone(),
                self.results.clone(),
                self.uploads.clone(),
                Arc::new(FnClassifier::new(by_first_byte as Classify)),
                WorkerConfig {
                    name: "it-worker".into(),
                    idle_sleep: Duration::ZERO,
                    pop_timeout: Duration::from_millis(20),
                    retry: RetryPolicy::fixed(3, Duration::from_millis(1)),
                },
            );
            WorkerPool::spawn(worker, count).unwrap()
        }
    }

    #[test]
    fn dog_scenario_end_to_end() {
        let p = Pipeline::new(Duration::from_secs(5));
        let pool = p.workers(1);

        let name = p.uploads.put("dog.JPG", b"d-image-bytes").unwrap();
        assert_eq!(name.as_str(), format!("{}.jpg", content_digest(b"d-image-bytes")));

        let prediction = p.dispatcher.dispatch(name.as_str()).unwrap();
        assert_eq!(prediction.label(), Some("dog"));
        assert_eq!(prediction.score, Some(0.9231));
        assert!(p.results.is_empty(), "consumed result must be deleted");

        pool.shutdown();
    }

    #[test]
    fn fixed_job_id_result_lands_under_that_id() {
        let p = Pipeline::new(Duration::from_secs(5));
        let pool = p.workers(1);

        let name = p.uploads.put("dog.jpg", b"d").unwrap();
        let job = Job::with_id("J1".parse().unwrap(), name.as_str());
        p.dispatcher.submit(&job).unwrap();

        let found = p
            .results
            .wait_for(&job.id, Duration::from_secs(5), Duration::from_millis(5))
            .unwrap()
            .unwrap();
        assert_eq!(
            p.results.raw(&job.id).unwrap(),
            r#"{"prediction":"dog","score":0.9231,"status":"ok"}"#
        );

        let returned = p.dispatcher.await_result(&job.id).unwrap();
        assert_eq!(returned, found);
        assert!(p.results.get(&job.id).unwrap().is_none());

        pool.shutdown();
    }

    #[test]
    fn inference_failure_reaches_dispatcher_as_sentinel() {
        let p = Pipeline::new(Duration::from_secs(5));
        let pool = p.workers(1);

        let name = p.uploads.put("broken.png", b"!corrupt").unwrap();
        let prediction = p.dispatcher.dispatch(name.as_str()).unwrap();

        assert!(prediction.is_error());
        assert_eq!(prediction, Prediction::failure());
        pool.shutdown();
    }

    #[test]
    fn missing_artifact_reaches_dispatcher_as_sentinel() {
        let p = Pipeline::new(Duration::from_secs(5));
        let pool = p.workers(1);

        let never_uploaded = ArtifactName::for_content("ghost.jpg", b"d-ghost");
        let prediction = p.dispatcher.dispatch(never_uploaded.as_str()).unwrap();

        assert!(prediction.is_error());
        pool.shutdown();
    }

    #[test]
    fn no_workers_means_bounded_timeout() {
        let p = Pipeline::new(Duration::from_millis(60));
        let name = p.uploads.put("dog.jpg", b"d").unwrap();

        let err = p.dispatcher.dispatch(name.as_str()).unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(p.queue.len().unwrap(), 1);
    }

    #[test]
    fn late_worker_drains_jobs_queued_before_it_started() {
        let p = Pipeline::new(Duration::from_secs(5));
        let name = p.uploads.put("cat.gif", b"c").unwrap();

        let dispatch = {
            let dispatcher = p.dispatcher.clone();
            let name = name.to_string();
            thread::spawn(move || dispatcher.dispatch(&name))
        };

        thread::sleep(Duration::from_millis(30));
        let pool = p.workers(1);

        let prediction = dispatch.join().unwrap().unwrap();
        assert_eq!(prediction.label(), Some("cat"));
        assert_eq!(prediction.score, Some(0.8765));
        pool.shutdown();
    }

    #[test]
    fn concurrent_dispatches_each_get_their_own_result() {
        let p = Pipeline::new(Duration::from_secs(10));
        let pool = p.workers(3);

        let dog = p.uploads.put("a.jpg", b"dog").unwrap();
        let cat = p.uploads.put("b.jpg", b"cat").unwrap();

        let handles: Vec<_> = (0..24)
            .map(|i| {
                let dispatcher = p.dispatcher.clone();
                let (name, expected) = if i % 2 == 0 {
                    (dog.clone(), "dog")
                } else {
                    (cat.clone(), "cat")
                };
                thread::spawn(move || {
                    let prediction = dispatcher.dispatch(name.as_str()).unwrap();
                    assert_eq!(prediction.label(), Some(expected));
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert!(p.results.is_empty());
        assert!(p.queue.is_empty().unwrap());

        // Stats are updated just after the result write; allow a moment.
        let completed = || -> u64 { pool.stats().iter().map(|(_, s)| s.jobs_completed).sum() };
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while completed() < 24 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(completed(), 24);
        pool.shutdown();
    }

    #[test]
    fn duplicate_uploads_share_one_artifact() {
        let p = Pipeline::new(Duration::from_secs(5));
        let pool = p.workers(2);
        let service = PredictionService::new(p.uploads.clone(), p.dispatcher.clone());

        let first = service.predict("dog.jpg", b"d-same").unwrap();
        let second = service.predict("renamed.jpg", b"d-same").unwrap();

        assert_eq!(first.image_file_name, second.image_file_name);
        assert!(first.success && second.success);
        assert_eq!(first.prediction.as_deref(), Some("dog"));
        assert_eq!(p.artifacts.write_count(), 1);
        pool.shutdown();
    }

    #[test]
    fn undecodable_message_does_not_stall_the_worker() {
        let p = Pipeline::new(Duration::from_secs(5));
        let pool = p.workers(1);

        p.queue.push("not json at all").unwrap();
        p.queue.push(r#"{"job_id": "legacy-1"}"#).unwrap();

        let legacy: JobId = "legacy-1".parse().unwrap();
        let sentinel = p
            .results
            .wait_for(&legacy, Duration::from_secs(5), Duration::from_millis(5))
            .unwrap()
            .unwrap();
        assert!(sentinel.is_error());

        let name = p.uploads.put("dog.jpg", b"d").unwrap();
        assert_eq!(p.dispatcher.dispatch(name.as_str()).unwrap().label(), Some("dog"));

        let discarded: u64 = pool.stats().iter().map(|(_, s)| s.messages_discarded).sum();
        assert_eq!(discarded, 1);
        pool.shutdown();
    }
}
