//! Strongly-typed identifiers.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of one inference job.
///
/// Job ids travel as plain strings on the queue and double as result-store
/// keys, so any non-empty string received from a peer is accepted. Locally
/// minted ids are UUIDv7 (time-ordered, globally unique).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Mint a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for JobId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobId {
    type Err = DomainError;

    /// The text is kept verbatim: ids double as result keys, so ` J1 ` and
    /// `J1` are different jobs. Blank ids are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(DomainError::invalid_id("JobId: empty"));
        }
        Ok(Self(s.to_string()))
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_ids_are_unique() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn parse_rejects_blank() {
        assert!(matches!("   ".parse::<JobId>(), Err(DomainError::InvalidId(_))));
        assert_eq!("J1".parse::<JobId>().unwrap().as_str(), "J1");
    }

    #[test]
    fn parse_keeps_surrounding_whitespace() {
        let padded: JobId = " J1 ".parse().unwrap();
        assert_eq!(padded.as_str(), " J1 ");
        assert_ne!(padded, "J1".parse::<JobId>().unwrap());
    }

    #[test]
    fn serializes_as_bare_string() {
        let id: JobId = "J1".parse().unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"J1\"");
    }
}
