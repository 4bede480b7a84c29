// qsm-core - FFT-accelerated dipole deconvolution core for quantitative
// susceptibility mapping
//
// Licensed under the MIT license. See LICENSE for details.

//! Shape/option validation (spec §4.9, component C9).
//!
//! Called up front by every public entry point; never partway through a
//! solve (spec §7: "validate up front, fail fast").

use crate::error::QsmError;
use crate::volume::Extent3;

/// Field rank must be 3 (single echo) or 4 (multi-echo).
pub fn validate_rank(rank: usize) -> Result<(), QsmError> {
    if rank == 3 || rank == 4 {
        Ok(())
    } else {
        Err(QsmError::InvalidRank { param: "field", rank })
    }
}

/// The mask's spatial extent must match the field's first three axes.
pub fn validate_matching_shape(param: &'static str, shape: Extent3, expected: Extent3) -> Result<(), QsmError> {
    if shape == expected {
        Ok(())
    } else {
        Err(QsmError::ShapeMismatch {
            param,
            message: format!("expected shape {:?}, got {:?}", expected.as_array(), shape.as_array()),
        })
    }
}

/// Generic closed-enumeration check: `value` must be one of `allowed`.
pub fn validate_option(param: &'static str, value: &str, allowed: &[&str]) -> Result<(), QsmError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(QsmError::InvalidOption {
            param,
            value: value.to_string(),
        })
    }
}
