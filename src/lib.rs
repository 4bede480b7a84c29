// qsm-core - FFT-accelerated dipole deconvolution core for quantitative
// susceptibility mapping
//
// Licensed under the MIT license. See LICENSE for details.

//! FFT-accelerated dipole-deconvolution core for quantitative
//! susceptibility mapping (QSM).
//!
//! Given an unwrapped tissue field map, a region-of-interest mask and the
//! physical voxel size, [`solver::kdiv`] computes a susceptibility map by
//! dividing out a dipole kernel in the Fourier domain, with TKD, TSVD or
//! Tikhonov regularization against the kernel's zero-crossing cone.
//!
//! Usage
//! -----
//! ```
//! use qsm_core::parallel::WorkerPool;
//! use qsm_core::solver::{DkernelMethod, Method, Reg, SolverOptions};
//! use qsm_core::volume::{DirectionVector, Extent3, Volume3, VoxelSize};
//!
//! let shape = Extent3::new(16, 16, 16);
//! let vsz = VoxelSize::new(1.0, 1.0, 1.0).unwrap();
//! let mask = Volume3::filled(shape, true);
//! let field = vec![0.0; shape.len()];
//! let opts = SolverOptions {
//!     pad: [-1, -1, -1],
//!     bdir: DirectionVector::new(0.0, 0.0, 1.0).unwrap(),
//!     dkernel: DkernelMethod::K,
//!     method: Method::Tkd,
//!     thr: 0.15,
//!     lambda: 0.0,
//!     reg: Reg::Identity,
//! };
//! let mut pool = WorkerPool::new();
//! let x = qsm_core::solver::solve(&mut pool, 3, shape, 1, field, &mask, vsz, &opts).unwrap();
//! assert_eq!(x.shape, shape);
//! ```

pub mod config;
pub mod error;
pub mod fft3;
pub mod fft_size;
mod helpers;
pub mod kernel;
pub mod mask;
pub mod pad;
pub mod parallel;
pub mod psf_otf;
pub mod solver;
pub mod validate;
pub mod volume;

pub use error::{QsmError, Result};
