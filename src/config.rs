// qsm-core - FFT-accelerated dipole deconvolution core for quantitative
// susceptibility mapping
//
// Licensed under the MIT license. See LICENSE for details.

//! Process-wide configuration.
//!
//! Spec §6 names exactly two process-wide knobs: the worker-pool size used
//! by [`crate::parallel`] and the FFT back-end thread count used by
//! [`crate::fft3`]. Both default to the detected core count and may only be
//! changed between solves (the library does not itself guard against a
//! racing solve; see §5).

use std::sync::atomic::{AtomicUsize, Ordering};

static WORKER_POOL_SIZE: AtomicUsize = AtomicUsize::new(0);
static FFT_THREAD_COUNT: AtomicUsize = AtomicUsize::new(0);

fn detected_core_count() -> usize {
    #[cfg(not(target_arch = "wasm32"))]
    {
        num_cpus::get().max(1)
    }
    #[cfg(target_arch = "wasm32")]
    {
        1
    }
}

/// Number of worker threads used by the parallel-for primitives in
/// [`crate::parallel`]. Defaults to the detected core count.
pub fn worker_pool_size() -> usize {
    match WORKER_POOL_SIZE.load(Ordering::Relaxed) {
        0 => detected_core_count(),
        n => n,
    }
}

/// Override the worker-pool size. Must not be called while a solve is in
/// progress (spec §5: "set once at initialization and may be changed only
/// when no solve is in progress").
pub fn set_worker_pool_size(n: usize) {
    WORKER_POOL_SIZE.store(n.max(1), Ordering::Relaxed);
}

/// Number of threads the FFT back-end is allowed to use per solve. Defaults
/// to the detected core count.
pub fn fft_thread_count() -> usize {
    match FFT_THREAD_COUNT.load(Ordering::Relaxed) {
        0 => detected_core_count(),
        n => n,
    }
}

/// Override the FFT back-end thread count. Same restriction as
/// [`set_worker_pool_size`].
pub fn set_fft_thread_count(n: usize) {
    FFT_THREAD_COUNT.store(n.max(1), Ordering::Relaxed);
}
