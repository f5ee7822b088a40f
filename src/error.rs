//! # Error Types
//!
//! Failure kinds surfaced by the library: configuration errors abort a run
//! before anything is emitted, I/O errors wrap the underlying cause, engine
//! errors bubble up from whichever physics engine reported them. Sampling
//! fizzles are not errors and never reach these types.

use std::io;
use thiserror::Error;

/// Result alias for the crate
pub type Result<T> = std::result::Result<T, TausimError>;

/// Top-level error of the transport library
#[derive(Debug, Error)]
pub enum TausimError {
    /// Invalid configuration: out-of-range sampler values, stale sampler
    /// digest, missing sampler, inconsistent mode flags
    #[error("configuration: {0}")]
    Config(String),

    /// Output, cache or entropy-source failure
    #[error("i/o: {0}")]
    Io(#[from] io::Error),

    /// A physics engine failed
    #[error("engine: {0}")]
    Engine(#[from] EngineError),
}

impl TausimError {
    /// Convenience constructor for configuration errors
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Error reported by a physics engine implementation
#[derive(Debug, Error)]
pub enum EngineError {
    /// Cross-section lookup or physics table failure
    #[error("cross-section lookup failed: {0}")]
    CrossSection(String),

    /// Transport aborted inside the engine
    #[error("transport aborted: {0}")]
    Transport(String),

    /// Decay or un-decay sampling failed
    #[error("decay sampling failed: {0}")]
    Decay(String),

    /// Engine initialisation failed
    #[error("initialisation failed: {0}")]
    Init(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = TausimError::config("no sampler was provided");
        assert!(err.to_string().contains("configuration"));

        let err: TausimError = EngineError::Decay("20 trials exhausted".into()).into();
        assert!(err.to_string().contains("engine"));
    }

    #[test]
    fn test_io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "materials.b");
        let err: TausimError = io_err.into();
        assert!(matches!(err, TausimError::Io(_)));
    }
}
