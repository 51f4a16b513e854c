use sphere_halo::algs::passes::{
    InterleavedEquations, Pass, SurfacePassTable, VolumePassTable, build_surface_passes,
    build_volume_passes,
};
use sphere_halo::debug_invariants::DebugInvariants;
use sphere_halo::topology::boundary::{Face, classify_boundaries};
use sphere_halo::topology::decomposition::{
    CoarseningMode, Decomposition, GlobalMesh, LevelMesh, decompose,
};
use sphere_halo::topology::processor_grid::{ProcGrid, Topology};

struct RankTables {
    topo: Topology,
    decomp: Decomposition,
    volume: VolumePassTable,
    surface: SurfacePassTable,
}

fn all_ranks(grid: ProcGrid, mesh: GlobalMesh) -> Vec<RankTables> {
    (0..grid.total_procs())
        .map(|me| {
            let topo = Topology::resolve(grid, me, grid.total_procs()).unwrap();
            let decomp = decompose(&mesh, &topo).unwrap();
            let bounds = classify_boundaries(&decomp, &topo);
            let volume = build_volume_passes(&decomp, &bounds, &topo, &InterleavedEquations::new(3)).unwrap();
            let surface = build_surface_passes(&decomp, &bounds, &topo).unwrap();
            RankTables {
                topo,
                decomp,
                volume,
                surface,
            }
        })
        .collect()
}

fn mesh(el: [usize; 3], levmax: usize) -> GlobalMesh {
    GlobalMesh {
        elx: el[0],
        ely: el[1],
        elz: el[2],
        levmin: 0,
        levmax,
        coarsening: CoarseningMode::Multigrid,
        nsd: 3,
    }
}

#[test]
fn pass_present_exactly_when_neighbor_exists() {
    let grid = ProcGrid::new(3, 2, 2, 1).unwrap();
    let ranks = all_ranks(grid, mesh([6, 4, 4], 1));
    for r in &ranks {
        for lev in 0..=1 {
            let cap = &r.volume.level(lev).unwrap()[0];
            cap.validate_invariants().unwrap();
            for face in Face::ALL {
                let has = r.topo.neighbor(face.axis(), face.direction()).is_some();
                assert_eq!(cap.bound_passes[face.slot()], has as usize, "rank {} {face:?}", r.topo.me());
            }
            assert!(cap.len() <= 6);
            assert!(r.surface.level(lev).unwrap()[0].len() <= 4);
        }
    }
}

#[test]
fn mirrored_passes_pair_coincident_nodes() {
    let grid = ProcGrid::new(2, 3, 2, 1).unwrap();
    let ranks = all_ranks(grid, mesh([4, 6, 4], 1));
    for r in &ranks {
        for lev in 0..=1 {
            let mine = r.decomp.level(lev).unwrap();
            for pass in &r.volume.level(lev).unwrap()[0].passes {
                let other = &ranks[pass.neighbor];
                let theirs = other.decomp.level(lev).unwrap();
                let back = other.volume.level(lev).unwrap()[0]
                    .on_face(pass.face.mirror())
                    .unwrap();
                assert_eq!(back.neighbor, r.topo.me());
                assert_eq!(pass.nodes.len(), back.nodes.len());
                for (&a, &b) in pass.nodes.iter().zip(&back.nodes) {
                    assert_eq!(mine.global_node_coords(a), theirs.global_node_coords(b));
                }
            }
        }
    }
}

#[test]
fn surface_passes_pair_coincident_surface_nodes() {
    let grid = ProcGrid::new(2, 2, 2, 1).unwrap();
    let ranks = all_ranks(grid, mesh([4, 4, 4], 1));
    let surface_xy = |m: &LevelMesh, s: usize| {
        (s % m.nox + m.nxs, s / m.nox + m.nys)
    };
    for r in &ranks {
        let mine = r.decomp.finest();
        for pass in &r.surface.level(1).unwrap()[0].passes {
            let other = &ranks[pass.neighbor];
            let theirs = other.decomp.finest();
            let back = other.surface.level(1).unwrap()[0]
                .on_face(pass.face.mirror())
                .unwrap();
            assert_eq!(pass.nodes().len(), back.nodes().len());
            for (&a, &b) in pass.nodes.iter().zip(&back.nodes) {
                assert_eq!(surface_xy(mine, a), surface_xy(theirs, b));
            }
        }
    }
}

#[test]
fn surface_neighbors_match_rank_offsets() {
    let grid = ProcGrid::new(3, 3, 2, 1).unwrap();
    let ranks = all_ranks(grid, mesh([6, 6, 4], 0));
    let nz = grid.nprocz;
    let nxz = grid.nprocx * grid.nprocz;
    for r in &ranks {
        let me = r.topo.me();
        for pass in &r.surface.level(0).unwrap()[0].passes {
            let want = match pass.face {
                Face::Left => me - nz,
                Face::Right => me + nz,
                Face::Front => me - nxz,
                Face::Rear => me + nxz,
                f => panic!("vertical surface pass {f:?}"),
            };
            assert_eq!(pass.neighbor, want, "rank {me} {:?}", pass.face);
        }
    }
}

#[test]
fn sequence_numbers_are_dense_in_axis_order() {
    let grid = ProcGrid::new(3, 3, 3, 1).unwrap();
    let ranks = all_ranks(grid, mesh([6, 6, 6], 0));
    for r in &ranks {
        let cap = &r.volume.level(0).unwrap()[0];
        let seqs: Vec<usize> = cap.passes.iter().map(|p| p.seq).collect();
        assert_eq!(seqs, (0..cap.len()).collect::<Vec<_>>());
        let faces: Vec<Face> = cap.passes.iter().map(|p| p.face).collect();
        let mut sorted = faces.clone();
        sorted.sort();
        assert_eq!(faces, sorted);
    }
}
