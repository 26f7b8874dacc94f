//! Content-addressed artifact naming.
//!
//! An uploaded file is stored as `<hex sha256 of content>.<lowercase ext>`.
//! The name depends only on the bytes and the extension, never on the
//! original file stem, so identical uploads collapse onto one object.

use sha2::{Digest, Sha256};

use crate::error::DomainError;

/// Extension used when the uploaded filename has none.
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Extensions accepted from clients.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// Validated canonical artifact name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactName(String);

impl ArtifactName {
    /// Derive the canonical name for `content` uploaded as `filename`.
    pub fn for_content(filename: &str, content: &[u8]) -> Self {
        Self(format!("{}.{}", content_digest(content), extension_of(filename)))
    }

    /// Validate a name received from a peer (e.g. a queue message).
    ///
    /// Accepts `<hex>.<ext>` where `ext` is lowercase alphanumeric. Anything
    /// carrying path separators or parent references is rejected.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let invalid = || DomainError::InvalidArtifactName(raw.to_string());

        let (stem, ext) = raw.rsplit_once('.').ok_or_else(invalid)?;
        if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        if ext.is_empty()
            || !ext
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        {
            return Err(invalid());
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArtifactName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lowercase hex SHA-256 of `content`.
pub fn content_digest(content: &[u8]) -> String {
    let hash = Sha256::digest(content);
    format!("{hash:x}")
}

/// Lowercase extension of `filename`, or [`DEFAULT_EXTENSION`].
///
/// Only the final path component is considered, and leading dots do not
/// start an extension (`.profile` has none).
pub fn extension_of(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim_start_matches('.');

    match base.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext.to_lowercase(),
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

/// Whether a client-supplied filename carries a supported image extension.
pub fn is_supported_image(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}
