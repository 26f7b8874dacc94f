//! Shared queue and result store abstractions (mechanics only).
//!
//! The dispatcher pushes jobs onto a [`JobQueue`] and waits on a
//! [`ResultStore`]; workers pop from the same queue and write into the same
//! store. Transport-backed implementations (Redis) live in `visionq-infra`;
//! this crate ships in-memory versions for tests and single-process use.

pub mod in_memory_queue;
pub mod in_memory_results;
pub mod queue;
pub mod results;

pub use in_memory_queue::InMemoryJobQueue;
pub use in_memory_results::InMemoryResultStore;
pub use queue::{JobQueue, QueueError};
pub use results::{ResultStore, ResultStoreError};
