//! Error taxonomy for decomposition construction.
//!
//! Configuration and geometry failures are fatal: decomposition state is
//! globally shared across ranks, so no local recovery is meaningful and the
//! caller is expected to abort the whole run. Consistency and protocol
//! violations are programming-contract checks and are compiled as
//! `debug_assert!`s at the point of use rather than runtime errors.

use thiserror::Error;

/// Fatal decomposition setup errors.
#[derive(Debug, Error)]
pub enum DecompositionError {
    /// An invalid run configuration (empty high-resolution subset, proxy
    /// capacity exceeded, incompatible truncation distance, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A geometric impossibility (zero total mass, zoom cube outside the
    /// box, non-cubic domain where a cube is required, ...).
    #[error("geometry error: {0}")]
    Geometry(String),

    /// A restart image that cannot be decoded.
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl DecompositionError {
    /// Shorthand for a configuration error with a formatted message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Shorthand for a geometry error with a formatted message.
    pub fn geometry(msg: impl Into<String>) -> Self {
        Self::Geometry(msg.into())
    }

    /// Shorthand for a snapshot decoding error with a formatted message.
    pub fn snapshot(msg: impl Into<String>) -> Self {
        Self::Snapshot(msg.into())
    }
}
