// qsm-core - FFT-accelerated dipole deconvolution core for quantitative
// susceptibility mapping
//
// Licensed under the MIT license. See LICENSE for details.

//! Crate-wide error type.
//!
//! Every fallible entry point in this crate returns `Result<T, QsmError>`.
//! Validation happens up front (see [`crate::validate`]); once a solver
//! starts writing into caller-owned output it cannot fail.

use thiserror::Error;

/// The five error kinds a caller of this crate can observe.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QsmError {
    /// Array dimensions or extents are inconsistent across inputs/outputs.
    #[error("shape mismatch in `{param}`: {message}")]
    ShapeMismatch {
        param: &'static str,
        message: String,
    },

    /// Field rank outside {3, 4}.
    #[error("invalid rank for `{param}`: expected 3 or 4, got {rank}")]
    InvalidRank { param: &'static str, rank: usize },

    /// A string/symbol option outside its allowed set.
    #[error("invalid option for `{param}`: {value:?}")]
    InvalidOption { param: &'static str, value: String },

    /// A non-finite or non-positive value where one is required (voxel
    /// size components, a zero direction vector, ...).
    #[error("invalid value for `{param}`: {message}")]
    InvalidValue {
        param: &'static str,
        message: String,
    },

    /// Reserved: a denominator in an inverse-kernel assembly was identically
    /// zero on a path with no zero-fallback defined. Every shipped path in
    /// this crate falls back to zero (spec'd behavior), so in practice this
    /// variant is never returned by a public solver; it stays part of the
    /// enum so a future regularizer that lacks a safe fallback has somewhere
    /// to report it, and so callers matching on `QsmError` exhaustively don't
    /// need an unreachable wildcard arm.
    #[error("numeric degeneracy in `{param}`: {message}")]
    NumericDegenerate {
        param: &'static str,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, QsmError>;
