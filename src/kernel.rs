// qsm-core - FFT-accelerated dipole deconvolution core for quantitative
// susceptibility mapping
//
// Licensed under the MIT license. See LICENSE for details.

//! Dipole, Laplacian and gradient kernel construction (spec §4.6,
//! component C6).

use num_complex::Complex64;

use crate::error::QsmError;
use crate::fft3::Fft3Plan;
use crate::psf_otf::psf2otf;
use crate::volume::{DirectionVector, Extent3, Volume3, VoxelSize};

/// A frequency-domain kernel: real half-complex when produced via a
/// real-FFT pipeline, complex otherwise (spec §3).
#[derive(Debug, Clone)]
pub enum Kernel {
    Real(Volume3<f64>),
    Complex(Volume3<Complex64>),
}

impl Kernel {
    pub fn shape(&self) -> Extent3 {
        match self {
            Kernel::Real(v) => v.shape,
            Kernel::Complex(v) => v.shape,
        }
    }

    /// Squared magnitude at flat index `i`: `|v|^2` for complex, `v^2` for real.
    #[inline(always)]
    pub fn mag_sq_at(&self, i: usize) -> f64 {
        match self {
            Kernel::Real(v) => v.data[i] * v.data[i],
            Kernel::Complex(v) => v.data[i].norm_sqr(),
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.shape().len()
    }
}

/// Frequency along one axis for bin `i` out of `m`, in cycles per unit
/// length, using the standard FFT bin-index convention (bins past the
/// Nyquist alias to negative frequency).
#[inline(always)]
fn freq(i: usize, m: usize, voxel: f64) -> f64 {
    let signed = if i <= m / 2 { i as i64 } else { i as i64 - m as i64 };
    signed as f64 / (voxel * m as f64)
}

/// Dipole kernel, k-space form (method `:k`): `D(K) = 1/3 - (K.b)^2/|K|^2`,
/// `D(0) = 0`, built directly on the half-complex grid.
pub fn dipole_kspace(shape: Extent3, vsz: VoxelSize, bdir: DirectionVector) -> Kernel {
    let hc = shape.half_complex();
    let mut out = Volume3::<f64>::zeros(hc);
    for iz in 0..hc.z {
        let kz = freq(iz, shape.z, vsz.vz);
        for iy in 0..hc.y {
            let ky = freq(iy, shape.y, vsz.vy);
            for ix in 0..hc.x {
                // The half-complex x-axis only ever holds non-negative bins.
                let kx = ix as f64 / (vsz.vx * shape.x as f64);
                let k2 = kx * kx + ky * ky + kz * kz;
                let v = if k2 == 0.0 {
                    0.0
                } else {
                    let kb = kx * bdir.b[0] + ky * bdir.b[1] + kz * bdir.b[2];
                    1.0 / 3.0 - (kb * kb) / k2
                };
                *out.get_mut(ix, iy, iz) = v;
            }
        }
    }
    Kernel::Real(out)
}

/// Half-width (in voxels) of the bounded cube the i-space dipole PSF is
/// synthesized on. The analytic PSF decays as `1/r^3`, so a handful of
/// voxels on each side captures its significant support.
const DIPOLE_PSF_RADIUS: i64 = 4;

fn dipole_psf(vsz: VoxelSize, bdir: DirectionVector) -> Volume3<f64> {
    let size = (2 * DIPOLE_PSF_RADIUS + 1) as usize;
    let shape = Extent3::new(size, size, size);
    let mut psf = Volume3::<f64>::zeros(shape);
    for iz in 0..size {
        let z = (iz as i64 - DIPOLE_PSF_RADIUS) as f64 * vsz.vz;
        for iy in 0..size {
            let y = (iy as i64 - DIPOLE_PSF_RADIUS) as f64 * vsz.vy;
            for ix in 0..size {
                let x = (ix as i64 - DIPOLE_PSF_RADIUS) as f64 * vsz.vx;
                let r2 = x * x + y * y + z * z;
                let v = if r2 == 0.0 {
                    0.0
                } else {
                    let rb = x * bdir.b[0] + y * bdir.b[1] + z * bdir.b[2];
                    let r = r2.sqrt();
                    (3.0 * rb * rb - r2) / (4.0 * std::f64::consts::PI * r2 * r2 * r)
                };
                *psf.get_mut(ix, iy, iz) = v;
            }
        }
    }
    psf
}

/// Dipole kernel, i-space form (methods `:i`/`:ispace`): synthesize a small
/// spatial PSF and run it through [`psf2otf`].
pub fn dipole_ispace(plan: &Fft3Plan, vsz: VoxelSize, bdir: DirectionVector) -> Result<Kernel, QsmError> {
    psf2otf(plan, &dipole_psf(vsz, bdir), true)
}

fn laplacian_psf(vsz: VoxelSize, negative: bool) -> Volume3<f64> {
    let mut psf = Volume3::<f64>::zeros(Extent3::new(3, 3, 3));
    let ix2 = 1.0 / (vsz.vx * vsz.vx);
    let iy2 = 1.0 / (vsz.vy * vsz.vy);
    let iz2 = 1.0 / (vsz.vz * vsz.vz);
    *psf.get_mut(0, 1, 1) = ix2;
    *psf.get_mut(2, 1, 1) = ix2;
    *psf.get_mut(1, 0, 1) = iy2;
    *psf.get_mut(1, 2, 1) = iy2;
    *psf.get_mut(1, 1, 0) = iz2;
    *psf.get_mut(1, 1, 2) = iz2;
    *psf.get_mut(1, 1, 1) = -2.0 * (ix2 + iy2 + iz2);
    if negative {
        for v in psf.data.iter_mut() {
            *v = -*v;
        }
    }
    psf
}

/// Laplacian kernel: i-space stencil `{1, -2, 1}` scaled by `1/v_i^2` along
/// each axis, converted via [`psf2otf`]. `negative` negates the PSF before
/// transforming.
pub fn laplacian(plan: &Fft3Plan, vsz: VoxelSize, negative: bool) -> Result<Kernel, QsmError> {
    psf2otf(plan, &laplacian_psf(vsz, negative), true)
}

fn forward_diff_psf(axis: usize, vsz: VoxelSize) -> Volume3<f64> {
    let inv = 1.0
        / match axis {
            0 => vsz.vx,
            1 => vsz.vy,
            _ => vsz.vz,
        };
    let mut shape = [1usize, 1, 1];
    shape[axis] = 2;
    let mut psf = Volume3::<f64>::zeros(Extent3::from(shape));
    let mut hi = [0usize, 0, 0];
    hi[axis] = 1;
    *psf.get_mut(0, 0, 0) = -inv;
    *psf.get_mut(hi[0], hi[1], hi[2]) = inv;
    psf
}

/// Gradient kernel: forward first difference on each axis, combined as
/// `sum_i |G_i|^2` on the spectral grid.
pub fn gradient(plan: &Fft3Plan, vsz: VoxelSize) -> Result<Kernel, QsmError> {
    let gx = psf2otf(plan, &forward_diff_psf(0, vsz), true)?;
    let gy = psf2otf(plan, &forward_diff_psf(1, vsz), true)?;
    let gz = psf2otf(plan, &forward_diff_psf(2, vsz), true)?;
    let hc = plan.shape().half_complex();
    let mut out = Volume3::<f64>::zeros(hc);
    for i in 0..hc.len() {
        out.data[i] = gx.mag_sq_at(i) + gy.mag_sq_at(i) + gz.mag_sq_at(i);
    }
    Ok(Kernel::Real(out))
}
