// qsm-core - FFT-accelerated dipole deconvolution core for quantitative
// susceptibility mapping
//
// Licensed under the MIT license. See LICENSE for details.

//! Centered padding and its inverse (spec §4.3, component C3).

use crate::error::QsmError;
use crate::parallel::WorkerPool;
use crate::volume::{Extent3, Volume3};

/// Border-fill policy for [`pad`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadPolicy {
    /// Constant fill value.
    Fill,
    /// Periodic wrap of the source.
    Circular,
    /// Clamp to the nearest edge voxel.
    Replicate,
    /// Mirror with the edge voxel repeated.
    Symmetric,
    /// Mirror without repeating the edge voxel.
    Reflect,
}

impl PadPolicy {
    pub fn from_str(s: &str) -> Result<Self, QsmError> {
        match s {
            "fill" => Ok(PadPolicy::Fill),
            "circular" => Ok(PadPolicy::Circular),
            "replicate" => Ok(PadPolicy::Replicate),
            "symmetric" => Ok(PadPolicy::Symmetric),
            "reflect" => Ok(PadPolicy::Reflect),
            other => Err(QsmError::InvalidOption {
                param: "pad_policy",
                value: other.to_string(),
            }),
        }
    }
}

/// `ΔI = (M - N + 1) div 2`, the offset of the centered interior block along
/// one axis (spec §3 invariant).
#[inline(always)]
fn centered_offset(n: usize, m: usize) -> usize {
    (m - n + 1) / 2
}

/// Map a padded-space axis coordinate back into `0..n` per `policy`. Returns
/// `None` for [`PadPolicy::Fill`], which the caller handles separately since
/// it needs no source coordinate at all.
#[inline(always)]
fn map_border_coord(i: i64, n: i64, policy: PadPolicy) -> Option<i64> {
    if n <= 1 {
        // A single-voxel axis reflects/mirrors/wraps onto itself; guard this
        // separately so the mirroring loops below (which assume n >= 2)
        // never have to consider it.
        return match policy {
            PadPolicy::Fill => None,
            _ => Some(0),
        };
    }
    match policy {
        PadPolicy::Fill => None,
        PadPolicy::Circular => Some(i.rem_euclid(n)),
        PadPolicy::Replicate => Some(i.clamp(0, n - 1)),
        PadPolicy::Symmetric => {
            // 1-based in spec's formula; we keep 0-based indices and adjust.
            let mut i1 = i + 1; // to 1-based
            loop {
                if i1 < 1 {
                    i1 = 1 - i1; // 1 - Ix
                } else if i1 > n {
                    i1 = 2 * n + 1 - i1;
                } else {
                    break;
                }
            }
            Some(i1 - 1)
        }
        PadPolicy::Reflect => {
            let mut i1 = i + 1;
            loop {
                if i1 < 1 {
                    i1 = 2 - i1;
                } else if i1 > n {
                    i1 = 2 * n - i1;
                } else {
                    break;
                }
            }
            Some(i1 - 1)
        }
    }
}

/// Writes a centered copy of `x` into a fresh array of shape `out_shape`,
/// filling the border per `policy`.
pub fn pad<T: Copy + Send + Sync + Default>(
    pool: &mut WorkerPool,
    x: &Volume3<T>,
    out_shape: Extent3,
    policy: PadPolicy,
    fill_value: T,
) -> Result<Volume3<T>, QsmError> {
    if !out_shape.ge(&x.shape) {
        return Err(QsmError::ShapeMismatch {
            param: "out_shape",
            message: format!(
                "out_shape {:?} must be componentwise >= in_shape {:?}",
                out_shape.as_array(),
                x.shape.as_array()
            ),
        });
    }
    let mut out = Volume3::filled(out_shape, fill_value);
    let off = [
        centered_offset(x.shape.x, out_shape.x),
        centered_offset(x.shape.y, out_shape.y),
        centered_offset(x.shape.z, out_shape.z),
    ];
    let in_shape = x.shape;
    let src = x.data.as_slice();

    // One elementwise parallel-for over the padded volume covers both the
    // interior (copy straight from `x`) and the border (apply the boundary
    // policy); each destination index is touched by exactly one worker, so
    // `map_indexed`'s disjoint write guarantee is all we need here.
    pool.map_indexed(&mut out.data, move |flat, dst_elem| {
        let ix = flat % out_shape.x;
        let iy = (flat / out_shape.x) % out_shape.y;
        let iz = flat / (out_shape.x * out_shape.y);
        let is_interior = ix >= off[0]
            && ix < off[0] + in_shape.x
            && iy >= off[1]
            && iy < off[1] + in_shape.y
            && iz >= off[2]
            && iz < off[2] + in_shape.z;
        if is_interior {
            let src_idx = in_shape.flat_index(ix - off[0], iy - off[1], iz - off[2]);
            *dst_elem = src[src_idx];
            return;
        }
        if policy == PadPolicy::Fill {
            return; // already `fill_value` from Volume3::filled
        }
        let sx = map_border_coord(ix as i64 - off[0] as i64, in_shape.x as i64, policy);
        let sy = map_border_coord(iy as i64 - off[1] as i64, in_shape.y as i64, policy);
        let sz = map_border_coord(iz as i64 - off[2] as i64, in_shape.z as i64, policy);
        if let (Some(sx), Some(sy), Some(sz)) = (sx, sy, sz) {
            let src_idx = in_shape.flat_index(sx as usize, sy as usize, sz as usize);
            *dst_elem = src[src_idx];
        }
    });

    Ok(out)
}

/// Reads the centered `in_shape` block out of `y` (the inverse of [`pad`]).
pub fn unpad<T: Copy + Send + Sync + Default>(
    pool: &mut WorkerPool,
    y: &Volume3<T>,
    in_shape: Extent3,
) -> Result<Volume3<T>, QsmError> {
    if !y.shape.ge(&in_shape) {
        return Err(QsmError::ShapeMismatch {
            param: "in_shape",
            message: format!(
                "source shape {:?} must be componentwise >= in_shape {:?}",
                y.shape.as_array(),
                in_shape.as_array()
            ),
        });
    }
    let off = [
        centered_offset(in_shape.x, y.shape.x),
        centered_offset(in_shape.y, y.shape.y),
        centered_offset(in_shape.z, y.shape.z),
    ];
    let mut out = Volume3::<T>::zeros(in_shape);
    let src = y.data.as_slice();
    let y_shape = y.shape;
    let out_shape = in_shape;
    pool.map_indexed(&mut out.data, move |flat, dst_elem| {
        let ix = flat % out_shape.x;
        let iy = (flat / out_shape.x) % out_shape.y;
        let iz = flat / (out_shape.x * out_shape.y);
        let src_idx = y_shape.flat_index(ix + off[0], iy + off[1], iz + off[2]);
        *dst_elem = src[src_idx];
    });
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vol_const(shape: Extent3, v: f64) -> Volume3<f64> {
        Volume3::filled(shape, v)
    }

    #[test]
    fn pad_fill_scenario_1() {
        let mut pool = WorkerPool::with_size(2);
        let x = vol_const(Extent3::new(3, 3, 3), 7.0);
        let out = pad(&mut pool, &x, Extent3::new(5, 5, 5), PadPolicy::Fill, 0.0).unwrap();
        for iz in 0..5 {
            for iy in 0..5 {
                for ix in 0..5 {
                    let v = *out.get(ix, iy, iz);
                    let interior = (2..5).contains(&ix) && (2..5).contains(&iy) && (2..5).contains(&iz);
                    assert_eq!(v, if interior { 7.0 } else { 0.0 });
                }
            }
        }
    }

    #[test]
    fn pad_reflect_scenario_2_1d_embedded() {
        // Embed the 1D case from spec scenario 2 in a 1x1xN volume.
        let mut pool = WorkerPool::with_size(1);
        let x = Volume3::from_vec(Extent3::new(3, 1, 1), vec![1.0, 2.0, 3.0]); // a,b,c
        let out = pad(&mut pool, &x, Extent3::new(7, 1, 1), PadPolicy::Reflect, 0.0).unwrap();
        let expected = [3.0, 2.0, 1.0, 2.0, 3.0, 2.0, 1.0]; // c,b,a,b,c,b,a
        let got: Vec<f64> = (0..7).map(|i| *out.get(i, 0, 0)).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn pad_unpad_round_trip_all_policies() {
        let mut pool = WorkerPool::with_size(3);
        let shape = Extent3::new(4, 5, 3);
        let data: Vec<f64> = (0..shape.len()).map(|i| i as f64 * 0.5 + 1.0).collect();
        let x = Volume3::from_vec(shape, data);
        let out_shape = Extent3::new(9, 8, 6);
        for policy in [
            PadPolicy::Fill,
            PadPolicy::Circular,
            PadPolicy::Replicate,
            PadPolicy::Symmetric,
            PadPolicy::Reflect,
        ] {
            let padded = pad(&mut pool, &x, out_shape, policy, -1.0).unwrap();
            let back = unpad(&mut pool, &padded, shape).unwrap();
            assert_eq!(back.data, x.data, "round-trip failed for {:?}", policy);
        }
    }

    #[test]
    fn pad_rejects_shrinking_shape() {
        let mut pool = WorkerPool::with_size(1);
        let x = vol_const(Extent3::new(5, 5, 5), 1.0);
        let err = pad(&mut pool, &x, Extent3::new(3, 5, 5), PadPolicy::Fill, 0.0).unwrap_err();
        assert!(matches!(err, QsmError::ShapeMismatch { .. }));
    }

    #[test]
    fn policy_from_str_rejects_unknown() {
        assert!(PadPolicy::from_str("fill").is_ok());
        assert!(matches!(
            PadPolicy::from_str("bogus"),
            Err(QsmError::InvalidOption { .. })
        ));
    }
}
