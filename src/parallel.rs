// qsm-core - FFT-accelerated dipole deconvolution core for quantitative
// susceptibility mapping
//
// Licensed under the MIT license. See LICENSE for details.

//! Threaded fill/copy/map over flat index ranges (spec §4.1, component C1).
//!
//! Each operation partitions `0..len` into contiguous chunks of at least
//! [`MIN_BATCH`] elements and runs one chunk per worker. Element order
//! within a chunk is sequential; chunk order across workers is unspecified.
//! There is no cross-thread happens-before guarantee beyond the `join` at
//! the end of the scoped call, matching spec §5.

use crate::config::worker_pool_size;

/// Ranges smaller than this run on the calling thread instead of being
/// split across workers (spec §4.1).
pub const MIN_BATCH: usize = 1024;

/// Bounded worker pool backing the parallel-for primitives.
///
/// On wasm32 there is no thread support, so the pool is a transparent
/// single-threaded stub; every operation above it runs serially.
pub struct WorkerPool {
    #[cfg(not(target_arch = "wasm32"))]
    inner: scoped_threadpool::Pool,
    #[cfg(not(target_arch = "wasm32"))]
    size: usize,
}

impl WorkerPool {
    /// Create a pool sized from [`crate::config::worker_pool_size`].
    pub fn new() -> Self {
        Self::with_size(worker_pool_size())
    }

    /// Create a pool with an explicit thread count (mainly for tests).
    pub fn with_size(n: usize) -> Self {
        #[cfg(not(target_arch = "wasm32"))]
        {
            let n = n.max(1);
            Self {
                inner: scoped_threadpool::Pool::new(n as u32),
                size: n,
            }
        }
        #[cfg(target_arch = "wasm32")]
        {
            let _ = n;
            Self {}
        }
    }

    fn thread_count(&self) -> usize {
        #[cfg(not(target_arch = "wasm32"))]
        {
            self.size
        }
        #[cfg(target_arch = "wasm32")]
        {
            1
        }
    }

    /// Rebuild the pool's worker task state.
    ///
    /// Required after a parallel-for panics partway through: `scoped_threadpool`
    /// cannot guarantee its internal worker handles are still consistent once a
    /// scoped closure unwinds, so we just throw the pool away and make a fresh
    /// one with the same configured size (spec §5, "Parallel-for recovery").
    pub fn reset(&mut self) {
        log::warn!("resetting worker pool after an aborted parallel-for");
        let n = self.thread_count();
        *self = Self::with_size(n);
    }

    /// Parallel fill: `y[i] = v` for all `i`.
    pub fn fill<T: Copy + Send + Sync>(&mut self, y: &mut [T], v: T) {
        self.map_indexed(y, |_, slot| *slot = v);
    }

    /// Parallel copy: `y[i] = x[i]` for all `i`. Panics (like slice
    /// indexing) if `y.len() != x.len()`.
    pub fn copy<T: Copy + Send + Sync>(&mut self, y: &mut [T], x: &[T]) {
        assert_eq!(y.len(), x.len());
        let num_threads = self.effective_threads(y.len());
        if num_threads < 2 {
            y.copy_from_slice(x);
            return;
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            let chunk_size = crate::helpers::ceil_div(y.len(), num_threads);
            self.inner.scoped(|s| {
                for (yc, xc) in y.chunks_mut(chunk_size).zip(x.chunks(chunk_size)) {
                    s.execute(move || yc.copy_from_slice(xc));
                }
            });
        }
        #[cfg(target_arch = "wasm32")]
        {
            y.copy_from_slice(x);
        }
    }

    /// Parallel map: `y[i] = f(x[i])` for all `i`.
    pub fn map<T: Sync, U: Send, F>(&mut self, y: &mut [U], x: &[T], f: F)
    where
        F: Fn(&T) -> U + Sync,
    {
        assert_eq!(y.len(), x.len());
        let num_threads = self.effective_threads(y.len());
        if num_threads < 2 {
            for (yi, xi) in y.iter_mut().zip(x.iter()) {
                *yi = f(xi);
            }
            return;
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            let chunk_size = crate::helpers::ceil_div(y.len(), num_threads);
            let f = &f;
            self.inner.scoped(|s| {
                for (yc, xc) in y.chunks_mut(chunk_size).zip(x.chunks(chunk_size)) {
                    s.execute(move || {
                        for (yi, xi) in yc.iter_mut().zip(xc.iter()) {
                            *yi = f(xi);
                        }
                    });
                }
            });
        }
        #[cfg(target_arch = "wasm32")]
        {
            for (yi, xi) in y.iter_mut().zip(x.iter()) {
                *yi = f(xi);
            }
        }
    }

    /// Parallel indexed map-in-place: `op(i, &mut y[i])` for all `i`.
    /// Used internally by [`WorkerPool::fill`] and by callers that need the
    /// flat index (mask erosion, padding's border walk).
    pub fn map_indexed<T: Send, F>(&mut self, y: &mut [T], op: F)
    where
        F: Fn(usize, &mut T) + Sync,
    {
        let num_threads = self.effective_threads(y.len());
        if num_threads < 2 {
            for (i, yi) in y.iter_mut().enumerate() {
                op(i, yi);
            }
            return;
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            let chunk_size = crate::helpers::ceil_div(y.len(), num_threads);
            let op = &op;
            self.inner.scoped(|s| {
                for (chunk_idx, yc) in y.chunks_mut(chunk_size).enumerate() {
                    let offset = chunk_idx * chunk_size;
                    s.execute(move || {
                        for (j, yi) in yc.iter_mut().enumerate() {
                            op(offset + j, yi);
                        }
                    });
                }
            });
        }
        #[cfg(target_arch = "wasm32")]
        {
            for (i, yi) in y.iter_mut().enumerate() {
                op(i, yi);
            }
        }
    }

    /// Parallel row-wise for-each: `buf` is divided into `buf.len() / row_len`
    /// fixed-size rows, and `f` is called once per row with an exclusive
    /// slice of that row. Rows are grouped into contiguous chunks (a whole
    /// number of rows each) and one chunk runs per worker, so `f` never
    /// needs anything beyond ordinary slice access (used by the per-axis
    /// FFT passes, where a "row" is one line along the transformed axis).
    pub fn for_each_row<T: Send, F>(&mut self, buf: &mut [T], row_len: usize, f: F)
    where
        F: Fn(&mut [T]) + Sync,
    {
        assert_eq!(buf.len() % row_len, 0, "buffer length must be a multiple of row_len");
        let num_rows = buf.len() / row_len;
        let num_threads = self.effective_threads(buf.len()).min(num_rows.max(1));
        if num_threads < 2 {
            for row in buf.chunks_mut(row_len) {
                f(row);
            }
            return;
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            let rows_per_chunk = crate::helpers::ceil_div(num_rows, num_threads);
            let elems_per_chunk = rows_per_chunk * row_len;
            let f = &f;
            self.inner.scoped(|s| {
                for chunk in buf.chunks_mut(elems_per_chunk) {
                    s.execute(move || {
                        for row in chunk.chunks_mut(row_len) {
                            f(row);
                        }
                    });
                }
            });
        }
        #[cfg(target_arch = "wasm32")]
        {
            for row in buf.chunks_mut(row_len) {
                f(row);
            }
        }
    }

    /// Thread count actually usable for a range of this size: below
    /// [`MIN_BATCH`] total elements per thread we fall back to serial
    /// execution on the calling thread.
    fn effective_threads(&self, len: usize) -> usize {
        let n = self.thread_count();
        if len < MIN_BATCH || n < 2 {
            1
        } else {
            n.min(crate::helpers::ceil_div(len, MIN_BATCH))
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_sets_every_element() {
        let mut pool = WorkerPool::with_size(4);
        let mut y = vec![0i32; 4096];
        pool.fill(&mut y, 7);
        assert!(y.iter().all(|&v| v == 7));
    }

    #[test]
    fn copy_matches_source() {
        let mut pool = WorkerPool::with_size(4);
        let x: Vec<i32> = (0..4096).collect();
        let mut y = vec![0i32; 4096];
        pool.copy(&mut y, &x);
        assert_eq!(y, x);
    }

    #[test]
    fn map_applies_function() {
        let mut pool = WorkerPool::with_size(4);
        let x: Vec<i32> = (0..4096).collect();
        let mut y = vec![0i32; 4096];
        pool.map(&mut y, &x, |v| v * 2);
        assert!(y.iter().zip(x.iter()).all(|(&a, &b)| a == 2 * b));
    }

    #[test]
    fn small_ranges_execute_serially_but_still_correct() {
        let mut pool = WorkerPool::with_size(4);
        let x: Vec<i32> = (0..10).collect();
        let mut y = vec![0i32; 10];
        pool.map(&mut y, &x, |v| v + 1);
        assert_eq!(y, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn for_each_row_scales_every_row() {
        let mut pool = WorkerPool::with_size(4);
        let row_len = 16;
        let num_rows = 300;
        let mut buf: Vec<f64> = (0..row_len * num_rows).map(|i| i as f64).collect();
        pool.for_each_row(&mut buf, row_len, |row| {
            for v in row.iter_mut() {
                *v *= 2.0;
            }
        });
        for (i, v) in buf.iter().enumerate() {
            assert_eq!(*v, i as f64 * 2.0);
        }
    }

    #[test]
    fn reset_keeps_pool_usable() {
        let mut pool = WorkerPool::with_size(4);
        pool.reset();
        let mut y = vec![0i32; 4096];
        pool.fill(&mut y, 1);
        assert!(y.iter().all(|&v| v == 1));
    }
}
