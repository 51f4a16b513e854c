//! Rectangular domain decomposition for every multigrid level.
//!
//! Each rank owns one rectangular block of the global structured mesh. The
//! finest level (`levmax`) is the one actually solved on; coarser levels halve
//! the horizontal footprint per level, and the radial axis either halves as
//! well ([`CoarseningMode::Multigrid`]) or collapses to a single element
//! ([`CoarseningMode::Horizontal`]).
//!
//! Local node numbering is z-fastest: `node = z + x*noz + y*noz*nox`.

use serde::{Deserialize, Serialize};

use crate::halo_error::HaloError;
use crate::topology::processor_grid::{Axis, Topology};

/// How coarser levels shrink the radial axis.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoarseningMode {
    /// Halve every axis per level.
    #[default]
    Multigrid,
    /// Halve x and y only; below `levmax` the radial axis keeps one element.
    Horizontal,
}

/// Global mesh sizes and multigrid range.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalMesh {
    pub elx: usize,
    pub ely: usize,
    pub elz: usize,
    pub levmin: usize,
    pub levmax: usize,
    pub coarsening: CoarseningMode,
    /// Degrees of freedom per node.
    pub nsd: usize,
}

impl GlobalMesh {
    pub fn validate(&self) -> Result<(), HaloError> {
        for (name, v) in [
            ("elx", self.elx),
            ("ely", self.ely),
            ("elz", self.elz),
            ("nsd", self.nsd),
        ] {
            if v == 0 {
                return Err(HaloError::ZeroExtent(name));
            }
        }
        if self.levmin > self.levmax {
            return Err(HaloError::InvalidLevelRange {
                levmin: self.levmin,
                levmax: self.levmax,
            });
        }
        Ok(())
    }

    fn elements(&self, axis: Axis) -> usize {
        match axis {
            Axis::X => self.elx,
            Axis::Y => self.ely,
            Axis::Z => self.elz,
        }
    }
}

/// One rank's block at one multigrid level.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LevelMesh {
    pub level: usize,
    pub elx: usize,
    pub ely: usize,
    pub elz: usize,
    pub nox: usize,
    pub noy: usize,
    pub noz: usize,
    /// Global element offsets of the block.
    pub exs: usize,
    pub eys: usize,
    pub ezs: usize,
    /// Global node offsets of the block.
    pub nxs: usize,
    pub nys: usize,
    pub nzs: usize,
    pub nno: usize,
    pub nel: usize,
    pub npno: usize,
    pub neq: usize,
    /// Nodes per horizontal layer.
    pub nsf: usize,
    /// Elements per horizontal layer.
    pub snel: usize,
}

impl LevelMesh {
    fn new(level: usize, nox: usize, noy: usize, noz: usize, topo: &Topology, nsd: usize) -> Self {
        let (elx, ely, elz) = (nox - 1, noy - 1, noz - 1);
        let loc = topo.location();
        let (exs, eys, ezs) = (loc.x * elx, loc.y * ely, loc.z * elz);
        let nno = nox * noy * noz;
        let nel = elx * ely * elz;
        Self {
            level,
            elx,
            ely,
            elz,
            nox,
            noy,
            noz,
            exs,
            eys,
            ezs,
            nxs: exs,
            nys: eys,
            nzs: ezs,
            nno,
            nel,
            npno: nel,
            neq: nsd * nno,
            nsf: nox * noy,
            snel: elx * ely,
        }
    }

    pub fn node_index(&self, x: usize, y: usize, z: usize) -> usize {
        z + x * self.noz + y * self.noz * self.nox
    }

    /// Local `[x, y, z]` of a node.
    pub fn node_coords(&self, node: usize) -> [usize; 3] {
        let z = node % self.noz;
        let x = (node / self.noz) % self.nox;
        let y = node / (self.noz * self.nox);
        [x, y, z]
    }

    /// Global `[x, y, z]` of a local node at this level.
    pub fn global_node_coords(&self, node: usize) -> [usize; 3] {
        let [x, y, z] = self.node_coords(node);
        [x + self.nxs, y + self.nys, z + self.nzs]
    }

    /// Surface (horizontal layer) index of a node.
    pub fn surface_node(&self, node: usize) -> usize {
        node / self.noz
    }

    pub fn nodes_along(&self, axis: Axis) -> usize {
        match axis {
            Axis::X => self.nox,
            Axis::Y => self.noy,
            Axis::Z => self.noz,
        }
    }
}

/// Two-dimensional decomposition used for depth-independent fields.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SurfaceMesh {
    pub nproc_sph: [usize; 2],
    pub me_sph: usize,
    pub loc_sph: [usize; 2],
    pub lelx: usize,
    pub lely: usize,
    pub lsnel: usize,
    pub lnox: usize,
    pub lnoy: usize,
    pub lnsf: usize,
    pub lexs: usize,
    pub leys: usize,
}

/// All levels of this rank's block plus its surface decomposition.
#[derive(Clone, Debug, Serialize)]
pub struct Decomposition {
    levmin: usize,
    levmax: usize,
    /// Horizontal elements per block at level 0.
    pub mgunit: [usize; 2],
    /// Indexed by `level - levmin`.
    levels: Vec<LevelMesh>,
    pub surface: SurfaceMesh,
}

impl Decomposition {
    pub fn levmin(&self) -> usize {
        self.levmin
    }

    pub fn levmax(&self) -> usize {
        self.levmax
    }

    pub fn level(&self, lev: usize) -> Result<&LevelMesh, HaloError> {
        lev.checked_sub(self.levmin)
            .and_then(|i| self.levels.get(i))
            .ok_or(HaloError::LevelOutOfRange {
                level: lev,
                levmin: self.levmin,
                levmax: self.levmax,
            })
    }

    /// The solved level.
    pub fn finest(&self) -> &LevelMesh {
        &self.levels[self.levels.len() - 1]
    }

    /// Levels from finest to coarsest.
    pub fn levels_fine_to_coarse(&self) -> impl Iterator<Item = &LevelMesh> {
        self.levels.iter().rev()
    }
}

fn pow2(exp: usize) -> Option<usize> {
    u32::try_from(exp).ok().and_then(|e| 1usize.checked_shl(e))
}

fn divisible(local: usize, exp: usize, axis: Axis) -> Result<usize, HaloError> {
    let err = HaloError::MultigridUnit {
        axis,
        local_elements: local,
        levels: exp,
    };
    match pow2(exp) {
        Some(p) if local % p == 0 => Ok(local / p),
        _ => Err(err),
    }
}

/// Derive every level of `topo`'s block from the global mesh.
pub fn decompose(mesh: &GlobalMesh, topo: &Topology) -> Result<Decomposition, HaloError> {
    mesh.validate()?;
    let grid = *topo.grid();

    let mut local = [0usize; 3];
    for axis in Axis::ALL {
        let (elements, procs) = (mesh.elements(axis), grid.extent(axis));
        if elements % procs != 0 {
            return Err(HaloError::IndivisibleMesh {
                axis,
                elements,
                procs,
            });
        }
        local[axis.index()] = elements / procs;
    }
    let [lelx, lely, lelz] = local;

    let mgunit = [
        divisible(lelx, mesh.levmax, Axis::X)?,
        divisible(lely, mesh.levmax, Axis::Y)?,
    ];
    if mesh.coarsening == CoarseningMode::Multigrid {
        divisible(lelz, mesh.levmax - mesh.levmin, Axis::Z)?;
    }

    let mut levels = Vec::with_capacity(mesh.levmax - mesh.levmin + 1);
    for lev in (mesh.levmin..=mesh.levmax).rev() {
        // 2^levmax already fit in `divisible`
        let scale = 1usize << lev;
        let nox = mgunit[0] * scale + 1;
        let noy = mgunit[1] * scale + 1;
        let noz = match mesh.coarsening {
            CoarseningMode::Multigrid => lelz / (1 << (mesh.levmax - lev)) + 1,
            CoarseningMode::Horizontal if lev == mesh.levmax => lelz + 1,
            CoarseningMode::Horizontal => 2,
        };
        levels.push(LevelMesh::new(lev, nox, noy, noz, topo, mesh.nsd));
    }
    levels.reverse();

    let loc = topo.location();
    let nproc_sph = [grid.nprocx, grid.nprocy];
    let me_sph = (topo.me() - loc.z) / grid.nprocz;
    // position inside the cap
    let loc_sph = [loc.x, loc.y];
    let (slelx, slely) = (mesh.elx / nproc_sph[0], mesh.ely / nproc_sph[1]);
    let surface = SurfaceMesh {
        nproc_sph,
        me_sph,
        loc_sph,
        lelx: slelx,
        lely: slely,
        lsnel: slelx * slely,
        lnox: slelx + 1,
        lnoy: slely + 1,
        lnsf: (slelx + 1) * (slely + 1),
        lexs: slelx * loc_sph[0],
        leys: slely * loc_sph[1],
    };

    log::info!(
        "rank {}: local block {}x{}x{} elements, levels {}..={}",
        topo.me(),
        lelx,
        lely,
        lelz,
        mesh.levmin,
        mesh.levmax
    );

    Ok(Decomposition {
        levmin: mesh.levmin,
        levmax: mesh.levmax,
        mgunit,
        levels,
        surface,
    })
}
