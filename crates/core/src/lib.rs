//! `visionq-core`: wire types shared by dispatchers and workers.
//!
//! This crate is pure: no IO, no transport. It defines the job message, the
//! result entry, and the content-addressed artifact naming scheme.

pub mod artifact;
pub mod error;
pub mod id;
pub mod job;
pub mod prediction;

pub use artifact::{ArtifactName, content_digest, extension_of, is_supported_image};
pub use error::{DomainError, DomainResult};
pub use id::JobId;
pub use job::{Job, JobState, WaitState};
pub use prediction::{Prediction, PredictionStatus, round_score};
