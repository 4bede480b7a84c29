// qsm-core - FFT-accelerated dipole deconvolution core for quantitative
// susceptibility mapping
//
// Licensed under the MIT license. See LICENSE for details.

//! Fast-FFT-size rounding (spec §4.2, component C2).

use crate::volume::Extent3;

/// Is `n` a "fast" FFT size, i.e. does it factor entirely over {2,3,5,7}?
fn is_fast_size(mut n: usize) -> bool {
    if n == 0 {
        return false;
    }
    for p in [2, 3, 5, 7] {
        while n % p == 0 {
            n /= p;
        }
    }
    n == 1
}

/// Smallest fast FFT size `>= n`.
fn next_fast_size(mut n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    while !is_fast_size(n) {
        n += 1;
    }
    n
}

/// Smallest *even* fast FFT size `>= n`.
fn next_even_fast_size(n: usize) -> usize {
    // Try the next few fast sizes and take the first even one; failing
    // that within a handful of tries, force evenness and re-round (spec:
    // "retry up to three increments, then force-even by adding one and
    // re-rounding").
    let mut candidate = next_fast_size(n);
    for _ in 0..3 {
        if candidate % 2 == 0 {
            return candidate;
        }
        candidate = next_fast_size(candidate + 1);
    }
    if candidate % 2 == 0 {
        return candidate;
    }
    next_fast_size(candidate + 1)
}

/// Per-axis padded sizes: `fastfftsize(sz, ksz, rfft)` from spec §4.2.
///
/// `ksz[i] < 0` passes dimension `i` through unchanged. Otherwise the
/// padded size is the smallest fast-FFT integer `>= sz[i] + max(ksz[i], 1) - 1`.
/// When `rfft` is true, the first padded dimension is further rounded up to
/// an even fast size.
pub fn fastfftsize(sz: [usize; 3], ksz: [i64; 3], rfft: bool) -> [usize; 3] {
    let mut out = sz;
    let mut first_padded: Option<usize> = None;
    for i in 0..3 {
        if ksz[i] < 0 {
            continue;
        }
        let k = ksz[i].max(1) as usize;
        let target = sz[i] + k - 1;
        out[i] = next_fast_size(target);
        if first_padded.is_none() {
            first_padded = Some(i);
        }
    }
    if rfft {
        if let Some(i) = first_padded {
            out[i] = next_even_fast_size(out[i].max(sz[i]));
        }
    }
    out
}

/// Convenience wrapper producing an [`Extent3`] directly.
pub fn fastfftshape(sz: Extent3, ksz: [i64; 3], rfft: bool) -> Extent3 {
    Extent3::from(fastfftsize(sz.as_array(), ksz, rfft))
}
