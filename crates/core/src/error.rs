//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Covers deterministic failures on the wire types (malformed messages, bad
/// identifiers, non-canonical artifact names). Transport concerns belong to
/// the queue and infra crates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An identifier was invalid (e.g. empty job id).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A queue message or result entry could not be decoded.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// An artifact name is not of the form `<hex digest>.<ext>`.
    #[error("invalid artifact name: {0}")]
    InvalidArtifactName(String),
}

impl DomainError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(value: serde_json::Error) -> Self {
        Self::Malformed(value.to_string())
    }
}
