// qsm-core - FFT-accelerated dipole deconvolution core for quantitative
// susceptibility mapping
//
// Licensed under the MIT license. See LICENSE for details.

//! 3D FFT plan orchestration (spec §4.6/§4.8, component C8).
//!
//! There is no complex-to-real FFT crate in this stack, so a real-to-complex
//! transform is emulated on top of a full complex-to-complex one: the real
//! input is lifted to a zero-imaginary complex volume, transformed with the
//! ordinary separable 3D FFT, and only the first `Mx/2 + 1` x-slices of the
//! result are kept (the rest is redundant by conjugate symmetry). The
//! inverse direction rebuilds the missing half from that symmetry before
//! running the ordinary inverse transform.
//!
//! Each axis pass is a set of independent 1D FFTs along that axis (lines),
//! so threading here parallelizes over lines using [`crate::config::fft_thread_count`]
//! worth of workers, distinct from the pool used elsewhere for padding/masking.

use std::sync::Arc;

use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use crate::config::fft_thread_count;
use crate::parallel::WorkerPool;
use crate::volume::{Extent3, Volume3};

/// Cached forward/inverse 1D FFT plans for each axis of a fixed shape.
pub struct Fft3Plan {
    shape: Extent3,
    fwd_x: Arc<dyn Fft<f64>>,
    inv_x: Arc<dyn Fft<f64>>,
    fwd_y: Arc<dyn Fft<f64>>,
    inv_y: Arc<dyn Fft<f64>>,
    fwd_z: Arc<dyn Fft<f64>>,
    inv_z: Arc<dyn Fft<f64>>,
}

impl Fft3Plan {
    pub fn new(shape: Extent3) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            shape,
            fwd_x: planner.plan_fft_forward(shape.x),
            inv_x: planner.plan_fft_inverse(shape.x),
            fwd_y: planner.plan_fft_forward(shape.y),
            inv_y: planner.plan_fft_inverse(shape.y),
            fwd_z: planner.plan_fft_forward(shape.z),
            inv_z: planner.plan_fft_inverse(shape.z),
        }
    }

    pub fn shape(&self) -> Extent3 {
        self.shape
    }

    /// In-place full complex 3D FFT, `data.len() == shape.len()`.
    pub fn forward(&self, data: &mut [Complex64]) {
        self.axis_pass(data, Axis::X, &self.fwd_x);
        self.axis_pass(data, Axis::Y, &self.fwd_y);
        self.axis_pass(data, Axis::Z, &self.fwd_z);
    }

    /// In-place full complex inverse 3D FFT, including the `1/N` normalization
    /// rustfft leaves to the caller.
    pub fn inverse(&self, data: &mut [Complex64]) {
        self.axis_pass(data, Axis::Z, &self.inv_z);
        self.axis_pass(data, Axis::Y, &self.inv_y);
        self.axis_pass(data, Axis::X, &self.inv_x);
        let scale = 1.0 / self.shape.len() as f64;
        for v in data.iter_mut() {
            *v *= scale;
        }
    }

    /// Run `fft` independently over every line of `data` along `axis`,
    /// splitting the set of lines across [`fft_thread_count`] worker threads.
    ///
    /// Lines along `X` are already contiguous in `data`'s row-major layout,
    /// so they're transformed directly with [`WorkerPool::for_each_row`].
    /// Lines along `Y`/`Z` are strided, so they're gathered into a
    /// contiguous scratch buffer first, transformed the same way, then
    /// scattered back; this keeps every parallel pass operating on plain
    /// disjoint sub-slices, with no unsafe aliasing tricks.
    fn axis_pass(&self, data: &mut [Complex64], axis: Axis, fft: &Arc<dyn Fft<f64>>) {
        let shape = self.shape;
        let (line_len, num_lines) = match axis {
            Axis::X => (shape.x, shape.y * shape.z),
            Axis::Y => (shape.y, shape.x * shape.z),
            Axis::Z => (shape.z, shape.x * shape.y),
        };
        let threads = fft_thread_count().max(1);
        let mut pool = WorkerPool::with_size(threads);

        if matches!(axis, Axis::X) {
            pool.for_each_row(data, line_len, |row| fft.process(row));
            return;
        }

        let mut scratch = vec![Complex64::new(0.0, 0.0); num_lines * line_len];
        for line in 0..num_lines {
            gather_line(data, shape, axis, line, &mut scratch[line * line_len..(line + 1) * line_len]);
        }
        pool.for_each_row(&mut scratch, line_len, |row| fft.process(row));
        for line in 0..num_lines {
            scatter_line(data, shape, axis, line, &scratch[line * line_len..(line + 1) * line_len]);
        }
    }
}

#[derive(Clone, Copy)]
enum Axis {
    X,
    Y,
    Z,
}

fn gather_line(data: &[Complex64], shape: Extent3, axis: Axis, line: usize, buf: &mut [Complex64]) {
    match axis {
        Axis::X => {
            let iy = line % shape.y;
            let iz = line / shape.y;
            let start = shape.flat_index(0, iy, iz);
            buf.copy_from_slice(&data[start..start + shape.x]);
        }
        Axis::Y => {
            let ix = line % shape.x;
            let iz = line / shape.x;
            for (iy, slot) in buf.iter_mut().enumerate() {
                *slot = data[shape.flat_index(ix, iy, iz)];
            }
        }
        Axis::Z => {
            let ix = line % shape.x;
            let iy = line / shape.x;
            for (iz, slot) in buf.iter_mut().enumerate() {
                *slot = data[shape.flat_index(ix, iy, iz)];
            }
        }
    }
}

fn scatter_line(data: &mut [Complex64], shape: Extent3, axis: Axis, line: usize, buf: &[Complex64]) {
    match axis {
        Axis::X => {
            let iy = line % shape.y;
            let iz = line / shape.y;
            let start = shape.flat_index(0, iy, iz);
            data[start..start + shape.x].copy_from_slice(buf);
        }
        Axis::Y => {
            let ix = line % shape.x;
            let iz = line / shape.x;
            for (iy, &v) in buf.iter().enumerate() {
                data[shape.flat_index(ix, iy, iz)] = v;
            }
        }
        Axis::Z => {
            let ix = line % shape.x;
            let iy = line / shape.x;
            for (iz, &v) in buf.iter().enumerate() {
                data[shape.flat_index(ix, iy, iz)] = v;
            }
        }
    }
}

/// Forward real-to-half-complex transform (spec §3's "half-complex shape").
pub fn rfft3(plan: &Fft3Plan, real: &Volume3<f64>) -> Volume3<Complex64> {
    debug_assert_eq!(real.shape, plan.shape());
    let mut full: Vec<Complex64> = real.data.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    plan.forward(&mut full);
    let hc_shape = plan.shape().half_complex();
    let mut out = Volume3::<Complex64>::zeros(hc_shape);
    for iz in 0..hc_shape.z {
        for iy in 0..hc_shape.y {
            for ix in 0..hc_shape.x {
                *out.get_mut(ix, iy, iz) = full[plan.shape().flat_index(ix, iy, iz)];
            }
        }
    }
    out
}

/// Inverse half-complex-to-real transform, the exact inverse of [`rfft3`].
pub fn irfft3(plan: &Fft3Plan, half: &Volume3<Complex64>) -> Volume3<f64> {
    let shape = plan.shape();
    debug_assert_eq!(half.shape, shape.half_complex());
    let mut full = vec![Complex64::new(0.0, 0.0); shape.len()];
    let hx = shape.half_complex().x;
    for iz in 0..shape.z {
        for iy in 0..shape.y {
            for ix in 0..shape.x {
                let v = if ix < hx {
                    *half.get(ix, iy, iz)
                } else {
                    let mx = (shape.x - ix) % shape.x;
                    let my = (shape.y - iy) % shape.y;
                    let mz = (shape.z - iz) % shape.z;
                    half.get(mx, my, mz).conj()
                };
                full[shape.flat_index(ix, iy, iz)] = v;
            }
        }
    }
    plan.inverse(&mut full);
    let mut out = Volume3::<f64>::zeros(shape);
    for (dst, src) in out.data.iter_mut().zip(full.iter()) {
        *dst = src.re;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_inverse_round_trip_full_complex() {
        let shape = Extent3::new(8, 6, 4);
        let plan = Fft3Plan::new(shape);
        let mut data: Vec<Complex64> = (0..shape.len())
            .map(|i| Complex64::new((i % 7) as f64 - 3.0, (i % 5) as f64))
            .collect();
        let orig = data.clone();
        plan.forward(&mut data);
        plan.inverse(&mut data);
        for (a, b) in data.iter().zip(orig.iter()) {
            assert!((a - b).norm() < 1e-9, "{a} != {b}");
        }
    }

    #[test]
    fn rfft3_irfft3_round_trip() {
        let shape = Extent3::new(6, 5, 4);
        let plan = Fft3Plan::new(shape);
        let real = Volume3::from_vec(
            shape,
            (0..shape.len()).map(|i| ((i * 37) % 11) as f64 - 5.0).collect(),
        );
        let half = rfft3(&plan, &real);
        assert_eq!(half.shape, shape.half_complex());
        let back = irfft3(&plan, &half);
        for (a, b) in back.data.iter().zip(real.data.iter()) {
            assert!((a - b).abs() < 1e-8, "{a} != {b}");
        }
    }

    #[test]
    fn dc_component_is_the_sum() {
        let shape = Extent3::new(4, 4, 4);
        let plan = Fft3Plan::new(shape);
        let real = Volume3::filled(shape, 2.0);
        let half = rfft3(&plan, &real);
        let dc = half.get(0, 0, 0);
        assert!((dc.re - 2.0 * shape.len() as f64).abs() < 1e-9);
        assert!(dc.im.abs() < 1e-9);
    }
}
