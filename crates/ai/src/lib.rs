//! `visionq-ai`
//!
//! **Responsibility:** the inference capability boundary.
//!
//! Workers see the model only through [`Classifier`]: bytes in, one
//! `(label, confidence)` pair out. Model loading, preprocessing and accuracy
//! live behind the trait and are not this workspace's concern.

pub mod classifier;
pub mod command;
pub mod result;

pub use classifier::{Classifier, FnClassifier};
pub use command::CommandClassifier;
pub use result::{Classification, InferenceError};
