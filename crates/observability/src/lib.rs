//! Process-wide tracing setup shared by the visionq binaries.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::{LogFormat, LogSettings};

/// Initialize tracing with JSON output and an `info` default filter.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(&LogSettings::default());
}

/// Initialize tracing with explicit settings.
pub fn init_with(settings: &LogSettings) {
    tracing::init(settings);
}
