//! Kernel configuration.
//!
//! Configuration is per thread, like the rest of the tracking state. Hosts
//! normally never touch it; the knobs exist for debugging and for exercising
//! the full-cleanup fallback without building 30-deep effect chains.

use std::cell::Cell;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Largest recursion depth that uses bitmask generation marking.
///
/// One bit per nesting level must fit in the `u32` marker fields of a dep.
pub const MAX_MARKER_BITS: u32 = 30;

/// Tunables for the tracking kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Effect nesting depth up to which deps are reconciled with generation
    /// bits. Deeper runs fall back to unsubscribing everything up front.
    pub max_marker_bits: u32,

    /// Emit development diagnostics such as the raw/reactive duplicate key
    /// warning for collections.
    pub dev_checks: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_marker_bits: MAX_MARKER_BITS,
            dev_checks: true,
        }
    }
}

impl TrackingConfig {
    /// Check that the configuration can be applied.
    pub fn validate(&self) -> Result<()> {
        if self.max_marker_bits == 0 || self.max_marker_bits > MAX_MARKER_BITS {
            return Err(Error::InvalidMarkerBits {
                value: self.max_marker_bits,
                max: MAX_MARKER_BITS,
            });
        }
        Ok(())
    }
}

thread_local! {
    static CONFIG: Cell<TrackingConfig> = Cell::new(TrackingConfig::default());
}

/// Install a configuration for the current thread.
///
/// Returns the previous configuration so callers can restore it.
pub fn configure(config: TrackingConfig) -> Result<TrackingConfig> {
    config.validate()?;
    tracing::debug!(?config, "tracking configuration updated");
    Ok(CONFIG.with(|c| c.replace(config)))
}

/// The configuration active on the current thread.
pub fn current() -> TrackingConfig {
    CONFIG.with(Cell::get)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_marker_ceiling() {
        let config = TrackingConfig::default();
        assert_eq!(config.max_marker_bits, 30);
        assert!(config.dev_checks);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn deserializes_with_missing_fields() {
        let config: TrackingConfig =
            serde_json::from_str(r#"{ "max_marker_bits": 4 }"#).unwrap();
        assert_eq!(config.max_marker_bits, 4);
        assert!(config.dev_checks);
    }

    #[test]
    fn rejects_out_of_range_ceiling() {
        let too_big = TrackingConfig {
            max_marker_bits: 31,
            ..TrackingConfig::default()
        };
        assert_eq!(
            configure(too_big),
            Err(Error::InvalidMarkerBits { value: 31, max: 30 })
        );

        let zero = TrackingConfig {
            max_marker_bits: 0,
            ..TrackingConfig::default()
        };
        assert!(zero.validate().is_err());
        assert_eq!(current(), TrackingConfig::default());
    }

    #[test]
    fn configure_returns_previous() {
        let custom = TrackingConfig {
            max_marker_bits: 2,
            dev_checks: false,
        };
        let previous = configure(custom).unwrap();
        assert_eq!(current(), custom);
        configure(previous).unwrap();
        assert_eq!(current(), TrackingConfig::default());
    }
}
