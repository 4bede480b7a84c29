/// Profiler friendly version of solver.rs
use criterion::{criterion_group, criterion_main, Criterion};

use qsm_core::parallel::WorkerPool;
use qsm_core::solver::{solve, DkernelMethod, Method, Reg, SolverOptions};
use qsm_core::volume::{DirectionVector, Extent3, Volume3, VoxelSize};

fn run_tkd(pool: &mut WorkerPool, shape: Extent3) {
    let vsz = VoxelSize::new(1.0, 1.0, 1.0).unwrap();
    let mask = Volume3::filled(shape, true);
    let field: Vec<f64> = (0..shape.len()).map(|i| ((i % 97) as f64 - 48.0) * 1e-3).collect();
    let opts = SolverOptions {
        pad: [-1, -1, -1],
        bdir: DirectionVector::new(0.0, 0.0, 1.0).unwrap(),
        dkernel: DkernelMethod::K,
        method: Method::Tkd,
        thr: 0.15,
        lambda: 0.0,
        reg: Reg::Identity,
    };
    solve(pool, 3, shape, 1, field, &mask, vsz, &opts).unwrap();
}

fn my_benchmark(c: &mut Criterion) {
    let mut pool = WorkerPool::new();
    let shape = Extent3::new(64, 64, 64);
    c.bench_function("kdiv_tkd_64cubed", |b| b.iter(|| run_tkd(&mut pool, shape)));
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = my_benchmark
}
criterion_main!(benches);
