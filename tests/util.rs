#![allow(dead_code)]
use std::sync::Arc;
use std::time::Duration;

use sphere_halo::algs::communicator::{LocalComm, LocalFabric};
use sphere_halo::config::HaloConfig;
use sphere_halo::topology::decomposition::{CoarseningMode, LevelMesh};

/// Receives in tests fail instead of hanging.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Single-cap config with the given grid, global elements and finest level.
pub fn config(procs: [usize; 3], elements: [usize; 3], levmax: usize) -> HaloConfig {
    HaloConfig {
        nprocx: procs[0],
        nprocy: procs[1],
        nprocz: procs[2],
        caps: 1,
        elx: elements[0],
        ely: elements[1],
        elz: elements[2],
        levmin: 0,
        levmax,
        coarsening: CoarseningMode::Multigrid,
        nsd: 3,
        verbose: false,
        recv_timeout_ms: None,
    }
}

/// Run `f` once per rank of `fabric`, each on its own thread; results in rank order.
pub fn on_fabric<R, F>(fabric: &Arc<LocalFabric>, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(LocalComm) -> R + Sync,
{
    std::thread::scope(|s| {
        let f = &f;
        let handles: Vec<_> = fabric
            .worlds()
            .into_iter()
            .map(|comm| s.spawn(move || f(comm)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

/// [`on_fabric`] on a fresh fabric of `size` ranks.
pub fn on_ranks<R, F>(size: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(LocalComm) -> R + Sync,
{
    on_fabric(&LocalFabric::with_timeout(size, TEST_TIMEOUT), f)
}

/// How many blocks hold a copy of global node coordinate `g` along one axis.
pub fn copies_along(g: usize, local_elements: usize, global_elements: usize) -> usize {
    if g != 0 && g != global_elements && g % local_elements == 0 { 2 } else { 1 }
}

/// How many ranks hold a copy of `node` of `mesh`, given the global element
/// counts at that level.
pub fn copies(mesh: &LevelMesh, node: usize, global: [usize; 3]) -> usize {
    let g = mesh.global_node_coords(node);
    copies_along(g[0], mesh.elx, global[0])
        * copies_along(g[1], mesh.ely, global[1])
        * copies_along(g[2], mesh.elz, global[2])
}

/// Global element counts of `mesh`'s level on a `procs` grid.
pub fn level_elements(mesh: &LevelMesh, procs: [usize; 3]) -> [usize; 3] {
    [mesh.elx * procs[0], mesh.ely * procs[1], mesh.elz * procs[2]]
}
