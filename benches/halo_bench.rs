use std::time::{Duration, Instant};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use sphere_halo::algs::communicator::LocalFabric;
use sphere_halo::algs::passes::{InterleavedEquations, build_surface_passes, build_volume_passes};
use sphere_halo::config::HaloConfig;
use sphere_halo::parallel::ParallelContext;
use sphere_halo::topology::boundary::classify_boundaries;
use sphere_halo::topology::decomposition::{CoarseningMode, decompose};
use sphere_halo::topology::processor_grid::{ProcGrid, Topology};

fn config(procs: [usize; 3], el: usize, levmax: usize) -> HaloConfig {
    HaloConfig {
        nprocx: procs[0],
        nprocy: procs[1],
        nprocz: procs[2],
        caps: 1,
        elx: el * procs[0],
        ely: el * procs[1],
        elz: el * procs[2],
        levmin: 0,
        levmax,
        coarsening: CoarseningMode::Multigrid,
        nsd: 3,
        verbose: false,
        recv_timeout_ms: None,
    }
}

fn bench_pass_builder(c: &mut Criterion) {
    let mut group = c.benchmark_group("pass_builder");
    // the center of a 3x3x3 grid has all six passes
    let grid = ProcGrid::new(3, 3, 3, 1).unwrap();
    let topo = Topology::resolve(grid, 13, 27).unwrap();
    for &el in &[8usize, 16, 32] {
        let decomp = decompose(&config([3, 3, 3], el, 2).global_mesh(), &topo).unwrap();
        group.bench_with_input(BenchmarkId::new("classify+volume+surface", el), &decomp, |b, d| {
            b.iter(|| {
                let bounds = classify_boundaries(d, &topo);
                let v = build_volume_passes(d, &bounds, &topo, &InterleavedEquations::new(3)).unwrap();
                let s = build_surface_passes(d, &bounds, &topo).unwrap();
                (v, s)
            })
        });
    }
    group.finish();
}

fn bench_two_rank_exchange(c: &mut Criterion) {
    let mut group = c.benchmark_group("exchange_two_ranks");
    for &el in &[8usize, 32] {
        group.bench_function(BenchmarkId::new("node_d", el), |b| {
            b.iter_custom(|iters| {
                let fabric = LocalFabric::new(2);
                let times: Vec<Duration> = std::thread::scope(|s| {
                    let handles: Vec<_> = fabric
                        .worlds()
                        .into_iter()
                        .map(|comm| {
                            s.spawn(move || {
                                let ctx = ParallelContext::setup(config([2, 1, 1], el, 0), comm, &InterleavedEquations::new(3))
                                    .unwrap();
                                let mut f = vec![vec![1.0f64; ctx.decomposition().finest().nno]];
                                ctx.sync();
                                let start = Instant::now();
                                for _ in 0..iters {
                                    ctx.exchange_node_d(0, &mut f).unwrap();
                                }
                                start.elapsed()
                            })
                        })
                        .collect();
                    handles.into_iter().map(|h| h.join().unwrap()).collect()
                });
                times.into_iter().max().unwrap_or_default()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_pass_builder, bench_two_rank_exchange);
criterion_main!(benches);
