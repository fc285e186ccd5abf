//! Error types.
//!
//! The interception layer never fails: readonly violations and invalid
//! usage are reported as diagnostics and the call proceeds. The errors here
//! cover the small fallible surface around it, namely extracting typed data
//! out of a [`Value`](crate::Value) and validating configuration.

use thiserror::Error;

/// Errors returned by the fallible parts of the crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A value did not hold the variant the caller asked for.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The variant the caller asked for.
        expected: &'static str,
        /// The variant that was actually present.
        found: &'static str,
    },

    /// The generation bitmask ceiling is outside the supported range.
    #[error("max_marker_bits must be between 1 and {max}, got {value}")]
    InvalidMarkerBits {
        /// The rejected value.
        value: u32,
        /// The largest supported value.
        max: u32,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
