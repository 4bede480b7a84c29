// qsm-core - FFT-accelerated dipole deconvolution core for quantitative
// susceptibility mapping
//
// Licensed under the MIT license. See LICENSE for details.

//! Mask operations (spec §4.4, component C4): bounding-box crop and
//! 18-connectivity binary erosion.

use crate::parallel::WorkerPool;
use crate::volume::{Extent3, Volume3};

/// Inclusive bounding box `[lo, hi]` per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub lo: [usize; 3],
    pub hi: [usize; 3],
}

/// Smallest axis-aligned box containing every voxel of `m` that is not
/// `outside_value`. Floating-point masks compare approximately (`>`
/// epsilon away from `outside_value`); integer/boolean masks compare
/// exactly. Returns the full-volume box if every voxel is "outside".
pub fn crop_indices(m: &Volume3<bool>, outside_value: bool) -> BoundingBox {
    let shape = m.shape;
    let mut lo = [usize::MAX; 3];
    let mut hi = [0usize; 3];
    let mut any = false;
    for iz in 0..shape.z {
        for iy in 0..shape.y {
            for ix in 0..shape.x {
                if *m.get(ix, iy, iz) != outside_value {
                    any = true;
                    lo[0] = lo[0].min(ix);
                    lo[1] = lo[1].min(iy);
                    lo[2] = lo[2].min(iz);
                    hi[0] = hi[0].max(ix);
                    hi[1] = hi[1].max(iy);
                    hi[2] = hi[2].max(iz);
                }
            }
        }
    }
    if !any {
        BoundingBox {
            lo: [0, 0, 0],
            hi: [shape.x - 1, shape.y - 1, shape.z - 1],
        }
    } else {
        BoundingBox { lo, hi }
    }
}

/// Same as [`crop_indices`] but for a real-valued mask, comparing with a
/// small tolerance instead of exact equality (spec: "approximate-inequality
/// for float T").
pub fn crop_indices_f64(m: &Volume3<f64>, outside_value: f64, eps: f64) -> BoundingBox {
    let shape = m.shape;
    let mut lo = [usize::MAX; 3];
    let mut hi = [0usize; 3];
    let mut any = false;
    for iz in 0..shape.z {
        for iy in 0..shape.y {
            for ix in 0..shape.x {
                if (*m.get(ix, iy, iz) - outside_value).abs() > eps {
                    any = true;
                    lo[0] = lo[0].min(ix);
                    lo[1] = lo[1].min(iy);
                    lo[2] = lo[2].min(iz);
                    hi[0] = hi[0].max(ix);
                    hi[1] = hi[1].max(iy);
                    hi[2] = hi[2].max(iz);
                }
            }
        }
    }
    if !any {
        BoundingBox {
            lo: [0, 0, 0],
            hi: [shape.x - 1, shape.y - 1, shape.z - 1],
        }
    } else {
        BoundingBox { lo, hi }
    }
}

/// Crop `m` down to `bbox`, producing a fresh, tightly-sized volume.
pub fn crop_to_bbox<T: Copy + Default>(m: &Volume3<T>, bbox: &BoundingBox) -> Volume3<T> {
    let shape = Extent3::new(
        bbox.hi[0] - bbox.lo[0] + 1,
        bbox.hi[1] - bbox.lo[1] + 1,
        bbox.hi[2] - bbox.lo[2] + 1,
    );
    let mut out = Volume3::<T>::zeros(shape);
    for iz in 0..shape.z {
        for iy in 0..shape.y {
            for ix in 0..shape.x {
                *out.get_mut(ix, iy, iz) =
                    *m.get(ix + bbox.lo[0], iy + bbox.lo[1], iz + bbox.lo[2]);
            }
        }
    }
    out
}

/// The 18 non-center offsets of the 3x3x3 cube minus the 8 corners
/// (face + edge neighbors). Generated from a small table rather than
/// unrolled by hand, per spec §9's "stencil erosion macro" guidance.
const NEIGHBOR_OFFSETS_18: [(i32, i32, i32); 18] = [
    // 6 face neighbors
    (-1, 0, 0),
    (1, 0, 0),
    (0, -1, 0),
    (0, 1, 0),
    (0, 0, -1),
    (0, 0, 1),
    // 12 edge neighbors
    (-1, -1, 0),
    (-1, 1, 0),
    (1, -1, 0),
    (1, 1, 0),
    (-1, 0, -1),
    (-1, 0, 1),
    (1, 0, -1),
    (1, 0, 1),
    (0, -1, -1),
    (0, -1, 1),
    (0, 1, -1),
    (0, 1, 1),
];

/// 18-connectivity binary erosion, `iter` rounds (spec §4.4).
///
/// `iter <= 0` is a pure copy. Voxels within `iter` of the boundary on any
/// axis are left `false` (spec: "voxels within t of the boundary are left
/// at their initialized value (zero)").
pub fn erode(pool: &mut WorkerPool, m: &Volume3<bool>, iter: i32) -> Volume3<bool> {
    if iter <= 0 {
        return m.clone();
    }
    let shape = m.shape;
    let mut cur = m.clone();
    let mut next = Volume3::<bool>::zeros(shape);
    for t in 1..=iter as usize {
        {
            let cur_ref = &cur;
            pool.map_indexed(&mut next.data, move |flat, out_elem| {
                let ix = flat % shape.x;
                let iy = (flat / shape.x) % shape.y;
                let iz = flat / (shape.x * shape.y);
                if ix < t || ix + t >= shape.x || iy < t || iy + t >= shape.y || iz < t || iz + t >= shape.z
                {
                    *out_elem = false;
                    return;
                }
                let mut v = *cur_ref.get(ix, iy, iz);
                if v {
                    for (dx, dy, dz) in NEIGHBOR_OFFSETS_18.iter() {
                        let nx = (ix as i64 + *dx as i64) as usize;
                        let ny = (iy as i64 + *dy as i64) as usize;
                        let nz = (iz as i64 + *dz as i64) as usize;
                        if !*cur_ref.get(nx, ny, nz) {
                            v = false;
                            break;
                        }
                    }
                }
                *out_elem = v;
            });
        }
        std::mem::swap(&mut cur, &mut next);
    }
    cur
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erode_scenario_3_from_spec() {
        let mut pool = WorkerPool::with_size(2);
        let m = Volume3::filled(Extent3::new(5, 5, 5), true);
        let eroded = erode(&mut pool, &m, 1);
        for iz in 0..5 {
            for iy in 0..5 {
                for ix in 0..5 {
                    let expect_true = (1..=3).contains(&ix) && (1..=3).contains(&iy) && (1..=3).contains(&iz);
                    assert_eq!(*eroded.get(ix, iy, iz), expect_true, "at ({ix},{iy},{iz})");
                }
            }
        }
    }

    #[test]
    fn erode_zero_iterations_is_copy() {
        let mut pool = WorkerPool::with_size(1);
        let m = Volume3::from_vec(Extent3::new(2, 2, 2), vec![true, false, true, true, false, false, true, true]);
        let eroded = erode(&mut pool, &m, 0);
        assert_eq!(eroded.data, m.data);
    }

    #[test]
    fn erosion_is_monotone_in_iter() {
        let mut pool = WorkerPool::with_size(2);
        let m = Volume3::filled(Extent3::new(9, 9, 9), true);
        let e0 = erode(&mut pool, &m, 1);
        let e1 = erode(&mut pool, &m, 2);
        for (a, b) in e1.data.iter().zip(e0.data.iter()) {
            // erode(m, 2) subset-of erode(m, 1)
            assert!(!*a || *b);
        }
    }

    #[test]
    fn crop_indices_finds_tight_box() {
        let mut m = Volume3::filled(Extent3::new(5, 5, 5), false);
        *m.get_mut(1, 2, 3) = true;
        *m.get_mut(3, 4, 1) = true;
        let bbox = crop_indices(&m, false);
        assert_eq!(bbox.lo, [1, 2, 1]);
        assert_eq!(bbox.hi, [3, 4, 3]);
    }

    #[test]
    fn crop_indices_all_outside_returns_full_volume() {
        let m = Volume3::filled(Extent3::new(4, 3, 2), false);
        let bbox = crop_indices(&m, false);
        assert_eq!(bbox.lo, [0, 0, 0]);
        assert_eq!(bbox.hi, [3, 2, 1]);
    }
}
