use sphere_halo::halo_error::HaloError;
use sphere_halo::topology::decomposition::{CoarseningMode, GlobalMesh, decompose};
use sphere_halo::topology::processor_grid::{Axis, ProcGrid, Topology};

fn mesh(el: [usize; 3], levmin: usize, levmax: usize, coarsening: CoarseningMode) -> GlobalMesh {
    GlobalMesh {
        elx: el[0],
        ely: el[1],
        elz: el[2],
        levmin,
        levmax,
        coarsening,
        nsd: 3,
    }
}

#[test]
fn blocks_tile_the_global_mesh_on_every_level() {
    let grid = ProcGrid::new(2, 3, 2, 1).unwrap();
    let m = mesh([8, 12, 8], 0, 2, CoarseningMode::Multigrid);
    let total = grid.total_procs();
    for lev in 0..=2 {
        let mut covered = 0;
        let mut global = [0usize; 3];
        for me in 0..total {
            let t = Topology::resolve(grid, me, total).unwrap();
            let l = *decompose(&m, &t).unwrap().level(lev).unwrap();
            assert_eq!(l.level, lev);
            assert_eq!(l.nel, l.elx * l.ely * l.elz);
            assert_eq!(l.nno, l.nox * l.noy * l.noz);
            let loc = t.location();
            assert_eq!((l.exs, l.eys, l.ezs), (loc.x * l.elx, loc.y * l.ely, loc.z * l.elz));
            global = [l.elx * grid.nprocx, l.ely * grid.nprocy, l.elz * grid.nprocz];
            covered += l.nel;
        }
        assert_eq!(covered, global.iter().product::<usize>());
        // each level halves the previous one
        assert_eq!(global, [8 >> (2 - lev), 12 >> (2 - lev), 8 >> (2 - lev)]);
    }
}

#[test]
fn horizontal_coarsening_keeps_one_radial_element_below_finest() {
    let grid = ProcGrid::new(1, 1, 1, 1).unwrap();
    let t = Topology::resolve(grid, 0, 1).unwrap();
    let d = decompose(&mesh([8, 8, 6], 0, 2, CoarseningMode::Horizontal), &t).unwrap();
    assert_eq!(d.finest().noz, 7);
    assert_eq!(d.level(1).unwrap().noz, 2);
    assert_eq!(d.level(0).unwrap().noz, 2);
    assert_eq!(d.level(0).unwrap().nox, 3);

    let err = decompose(&mesh([8, 8, 6], 0, 2, CoarseningMode::Multigrid), &t).unwrap_err();
    assert!(matches!(err, HaloError::MultigridUnit { axis: Axis::Z, .. }));
}

#[test]
fn surface_decomposition_ignores_depth() {
    let grid = ProcGrid::new(2, 2, 3, 1).unwrap();
    let m = mesh([8, 4, 6], 0, 0, CoarseningMode::Multigrid);
    // x = 1, y = 1, z = 2
    let me = 11;
    let t = Topology::resolve(grid, me, 12).unwrap();
    let s = decompose(&m, &t).unwrap().surface;
    assert_eq!(s.nproc_sph, [2, 2]);
    assert_eq!(s.me_sph, 3);
    assert_eq!(s.loc_sph, [1, 1]);
    assert_eq!((s.lelx, s.lely, s.lsnel), (4, 2, 8));
    assert_eq!((s.lnox, s.lnoy, s.lnsf), (5, 3, 15));
    assert_eq!((s.lexs, s.leys), (4, 2));

    // every rank of one column shares the same surface block
    for z in 0..3 {
        let mut loc = grid.locate(me);
        loc.z = z;
        let t = Topology::resolve(grid, grid.rank_of(loc), 12).unwrap();
        assert_eq!(decompose(&m, &t).unwrap().surface, s);
    }
}

#[test]
fn surface_block_stays_inside_its_cap() {
    let grid = ProcGrid::new(2, 2, 1, 2).unwrap();
    let m = mesh([4, 4, 2], 0, 0, CoarseningMode::Multigrid);
    let total = grid.total_procs();
    for me in 0..total {
        let t = Topology::resolve(grid, me, total).unwrap();
        let s = decompose(&m, &t).unwrap().surface;
        assert!(s.lexs + s.lelx <= m.elx, "rank {me}: x range {}..{}", s.lexs, s.lexs + s.lelx);
        assert!(s.leys + s.lely <= m.ely, "rank {me}: y range {}..{}", s.leys, s.leys + s.lely);

        // the same slot of cap 0 covers the same surface block
        let twin = Topology::resolve(grid, me % 4, total).unwrap();
        let t0 = decompose(&m, &twin).unwrap().surface;
        assert_eq!((s.loc_sph, s.lexs, s.leys), (t0.loc_sph, t0.lexs, t0.leys));
    }
}

#[test]
fn inverted_level_range_is_rejected() {
    let grid = ProcGrid::new(1, 1, 1, 1).unwrap();
    let t = Topology::resolve(grid, 0, 1).unwrap();
    let err = decompose(&mesh([4, 4, 4], 2, 1, CoarseningMode::Multigrid), &t).unwrap_err();
    assert!(matches!(err, HaloError::InvalidLevelRange { levmin: 2, levmax: 1 }));
}
