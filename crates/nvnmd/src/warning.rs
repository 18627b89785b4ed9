//! Non-fatal conditions raised while configuring NVNMD.

use thiserror::Error;

/// Conditions that are logged and recorded, after which configuration
/// continues with the current state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigWarning {
    #[error("no preset configuration for net_size {net_size}")]
    MissingPreset { net_size: usize },

    #[error("NSTDM_M1X ({nstdm_m1x}) must be a divisor of 32 for the data-merge module")]
    InvalidDivisibility { nstdm_m1x: usize },

    #[error("range of s [{smin}, {smax}] is over the limit (smax - smin) > 16.0; reset rcut_smth to a bigger value")]
    RangeOverflow { smin: f64, smax: f64 },
}
