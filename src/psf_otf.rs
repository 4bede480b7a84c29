// qsm-core - FFT-accelerated dipole deconvolution core for quantitative
// susceptibility mapping
//
// Licensed under the MIT license. See LICENSE for details.

//! Point-spread-function to optical-transfer-function conversion (spec
//! §4.5, component C5).

use num_complex::Complex64;

use crate::error::QsmError;
use crate::fft3::{rfft3, Fft3Plan};
use crate::kernel::Kernel;
use crate::volume::{Extent3, Volume3};

/// Copy `src` into the `(0,0,0)`-origin corner of a zero-filled volume of
/// `out_shape`.
fn place_at_origin(src: &Volume3<f64>, out_shape: Extent3) -> Volume3<f64> {
    let mut out = Volume3::<f64>::zeros(out_shape);
    for iz in 0..src.shape.z {
        for iy in 0..src.shape.y {
            for ix in 0..src.shape.x {
                *out.get_mut(ix, iy, iz) = *src.get(ix, iy, iz);
            }
        }
    }
    out
}

/// Circular shift: `dst[i] = src[(i - shift) mod M]` along every axis.
fn circular_shift(src: &Volume3<f64>, shift: [i64; 3]) -> Volume3<f64> {
    let shape = src.shape;
    let mut out = Volume3::<f64>::zeros(shape);
    for iz in 0..shape.z {
        let sz = wrap(iz as i64 - shift[2], shape.z as i64);
        for iy in 0..shape.y {
            let sy = wrap(iy as i64 - shift[1], shape.y as i64);
            for ix in 0..shape.x {
                let sx = wrap(ix as i64 - shift[0], shape.x as i64);
                *out.get_mut(ix, iy, iz) = *src.get(sx, sy, sz);
            }
        }
    }
    out
}

#[inline(always)]
fn wrap(i: i64, n: i64) -> usize {
    i.rem_euclid(n) as usize
}

/// `psf2otf(k, out_shape, rfft)`: zero-pad `k` at the origin, circular-shift
/// its center to index 0, and forward-transform. Collapses to a real
/// half-complex kernel when the residual imaginary part is within roundoff
/// of zero (spec §3's imaginary-suppression invariant); otherwise returns
/// complex.
pub fn psf2otf(plan: &Fft3Plan, k: &Volume3<f64>, rfft: bool) -> Result<Kernel, QsmError> {
    let out_shape = plan.shape();
    if !out_shape.ge(&k.shape) {
        return Err(QsmError::ShapeMismatch {
            param: "out_shape",
            message: format!(
                "psf2otf out_shape {:?} must be componentwise >= psf shape {:?}",
                out_shape.as_array(),
                k.shape.as_array()
            ),
        });
    }
    let placed = place_at_origin(k, out_shape);
    let shift = [
        -((k.shape.x / 2) as i64),
        -((k.shape.y / 2) as i64),
        -((k.shape.z / 2) as i64),
    ];
    let shifted = circular_shift(&placed, shift);

    if !rfft {
        let mut full: Vec<Complex64> = shifted.data.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        plan.forward(&mut full);
        return Ok(Kernel::Complex(Volume3::from_vec(out_shape, full)));
    }

    let spectrum = rfft3(plan, &shifted);
    let mut max_im = 0.0f64;
    let mut max_abs2 = 0.0f64;
    for v in spectrum.data.iter() {
        max_im = max_im.max(v.im.abs());
        max_abs2 = max_abs2.max(v.norm_sqr());
    }
    let n = out_shape.len() as f64;
    let sum_log2 = (out_shape.x as f64).log2() + (out_shape.y as f64).log2() + (out_shape.z as f64).log2();
    let threshold = n * sum_log2 * f64::EPSILON;
    if max_im <= threshold * max_abs2 {
        let real_data: Vec<f64> = spectrum.data.iter().map(|v| v.re).collect();
        Ok(Kernel::Real(Volume3::from_vec(spectrum.shape, real_data)))
    } else {
        Ok(Kernel::Complex(spectrum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn psf_delta_has_unit_norm() {
        let shape = Extent3::new(8, 8, 8);
        let plan = Fft3Plan::new(shape);
        let mut delta = Volume3::<f64>::zeros(Extent3::new(1, 1, 1));
        *delta.get_mut(0, 0, 0) = 1.0;
        let otf = psf2otf(&plan, &delta, false).unwrap();
        let max_abs = match &otf {
            Kernel::Complex(v) => v.data.iter().fold(0.0f64, |m, c| m.max(c.norm())),
            Kernel::Real(v) => v.data.iter().fold(0.0f64, |m, &r| m.max(r.abs())),
        };
        assert!((max_abs - 1.0).abs() < 1e-9, "max_abs={max_abs}");
    }

    #[test]
    fn dc_component_is_shift_invariant_sum() {
        // psf2otf's centering shift is circular, and the DC term of a DFT
        // (sum of all spatial samples) is invariant under any circular
        // shift of the input (spec scenario 6's underlying identity).
        let shape = Extent3::new(8, 8, 8);
        let plan = Fft3Plan::new(shape);
        let ones = Volume3::filled(Extent3::new(3, 3, 3), 1.0);
        let otf = psf2otf(&plan, &ones, true).unwrap();
        let dc = match &otf {
            Kernel::Real(v) => *v.get(0, 0, 0),
            Kernel::Complex(v) => v.get(0, 0, 0).re,
        };
        assert!((dc - 27.0).abs() < 1e-6, "dc={dc}");
    }
}
