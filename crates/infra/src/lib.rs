//! Infrastructure layer: storage backends, the dispatcher and worker loops,
//! and configuration.

pub mod config;
pub mod dispatcher;
pub mod predict;
pub mod retry;
pub mod uploads;
pub mod worker;

/// Redis adapters (job list and result keys).
#[cfg(feature = "redis")]
pub mod redis_store;

mod integration_tests;

pub use config::{ConfigError, Settings};
pub use dispatcher::{DispatchError, Dispatcher, DispatcherConfig};
pub use predict::{PredictError, PredictResponse, PredictionService};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use uploads::{
    ArtifactError, ArtifactStore, FsArtifactStore, InMemoryArtifactStore, UploadStore,
};
pub use worker::{Processed, Worker, WorkerConfig, WorkerHandle, WorkerPool, WorkerStats};

#[cfg(feature = "redis")]
pub use redis_store::{RedisConnection, RedisJobQueue, RedisResultStore};
