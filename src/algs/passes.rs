//! Communication pass tables.
//!
//! Per level and cap, passes are laid out in the fixed order X, Y, Z, with the
//! negative direction before the positive one. A pass exists only where the
//! sub-domain has a neighbor. Present passes are numbered densely from 0 and
//! that number is the only key the exchange engine iterates by; the order is
//! what makes sequential accumulation correct at edges and corners.

use serde::Serialize;

use crate::debug_invariants::DebugInvariants;
use crate::halo_error::HaloError;
use crate::topology::boundary::{BoundaryFaceSet, BoundaryTable, Face};
use crate::topology::decomposition::{Decomposition, LevelMesh};
use crate::topology::processor_grid::{Axis, Direction, Topology};

/// Node to equation numbering, owned by the field/solver layer.
pub trait EquationMap {
    /// Degrees of freedom per node.
    fn dims(&self) -> usize;
    /// Equation index of degree of freedom `dof` at `node` on level `level`.
    fn equation(&self, level: usize, node: usize, dof: usize) -> usize;
}

/// `node * dims + dof` on every level.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InterleavedEquations {
    pub dims: usize,
}

impl InterleavedEquations {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

impl EquationMap for InterleavedEquations {
    fn dims(&self) -> usize {
        self.dims
    }

    fn equation(&self, _level: usize, node: usize, dof: usize) -> usize {
        node * self.dims + dof
    }
}

/// One exchange with one neighbor across one face.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommunicationPass {
    /// Dense position in the level's pass sequence.
    pub seq: usize,
    pub face: Face,
    pub neighbor: usize,
    /// Local nodes of `face`, in the scan order both sides share.
    pub nodes: Vec<usize>,
    /// `dims` equation indices per node, node-major.
    pub equations: Vec<usize>,
}

/// Horizontal-only pass over surface-layer node ids.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SurfacePass {
    pub seq: usize,
    pub face: Face,
    pub neighbor: usize,
    pub nodes: Vec<usize>,
}

/// Anything the exchange engine can iterate.
pub trait Pass {
    fn seq(&self) -> usize;
    fn face(&self) -> Face;
    fn neighbor(&self) -> usize;
    fn nodes(&self) -> &[usize];
}

macro_rules! impl_pass {
    ($($ty:ty),+) => {$(
        impl Pass for $ty {
            fn seq(&self) -> usize {
                self.seq
            }
            fn face(&self) -> Face {
                self.face
            }
            fn neighbor(&self) -> usize {
                self.neighbor
            }
            fn nodes(&self) -> &[usize] {
                &self.nodes
            }
        }
    )+};
}

impl_pass!(CommunicationPass, SurfacePass);

/// Passes of one cap at one level.
#[derive(Clone, Debug, Serialize)]
pub struct CapPasses<P> {
    /// Pass count (0 or 1) per face slot.
    pub bound_passes: [usize; 6],
    pub passes: Vec<P>,
}

impl<P> Default for CapPasses<P> {
    fn default() -> Self {
        Self {
            bound_passes: [0; 6],
            passes: Vec::new(),
        }
    }
}

impl<P: Pass> CapPasses<P> {
    /// Total passes, the `TNUM_PASS` of the level.
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// The pass across `face`, if one exists.
    pub fn on_face(&self, face: Face) -> Option<&P> {
        self.passes.iter().find(|p| p.face() == face)
    }

    fn push(&mut self, pass: P) {
        self.bound_passes[pass.face().slot()] += 1;
        self.passes.push(pass);
    }
}

impl<P: Pass> DebugInvariants for CapPasses<P> {
    fn validate_invariants(&self) -> Result<(), HaloError> {
        if self.bound_passes.iter().any(|&n| n > 1) {
            return Err(HaloError::InvariantViolation(format!(
                "more than one pass on a face: {:?}",
                self.bound_passes
            )));
        }
        let total: usize = self.bound_passes.iter().sum();
        if total != self.passes.len() {
            return Err(HaloError::InvariantViolation(format!(
                "face counts sum to {total}, {} passes stored",
                self.passes.len()
            )));
        }
        for (i, pair) in self.passes.windows(2).enumerate() {
            if pair[0].face() >= pair[1].face() {
                return Err(HaloError::InvariantViolation(format!(
                    "pass {i} on {:?} precedes {:?}",
                    pair[0].face(),
                    pair[1].face()
                )));
            }
        }
        for (i, p) in self.passes.iter().enumerate() {
            if p.seq() != i {
                return Err(HaloError::InvariantViolation(format!(
                    "pass at position {i} numbered {}",
                    p.seq()
                )));
            }
        }
        Ok(())
    }
}

/// Pass tables keyed by level, then cap.
#[derive(Clone, Debug, Serialize)]
pub struct PassTable<P> {
    levmin: usize,
    levels: Vec<Vec<CapPasses<P>>>,
}

pub type VolumePassTable = PassTable<CommunicationPass>;
pub type SurfacePassTable = PassTable<SurfacePass>;

impl<P> PassTable<P> {
    pub fn levmin(&self) -> usize {
        self.levmin
    }

    pub fn levmax(&self) -> usize {
        self.levmin + self.levels.len() - 1
    }

    /// Passes of every local cap at `lev`.
    pub fn level(&self, lev: usize) -> Result<&[CapPasses<P>], HaloError> {
        lev.checked_sub(self.levmin)
            .and_then(|i| self.levels.get(i))
            .map(Vec::as_slice)
            .ok_or(HaloError::LevelOutOfRange {
                level: lev,
                levmin: self.levmin,
                levmax: self.levmax(),
            })
    }
}

fn neighbor_of(topo: &Topology, face: Face) -> Option<usize> {
    topo.neighbor(face.axis(), face.direction())
}

fn volume_passes(
    mesh: &LevelMesh,
    faces: &BoundaryFaceSet,
    topo: &Topology,
    eqs: &impl EquationMap,
) -> CapPasses<CommunicationPass> {
    let dims = eqs.dims();
    let mut cap = CapPasses::default();
    for axis in Axis::ALL {
        for dir in Direction::ALL {
            let face = Face::of(axis, dir);
            let Some(neighbor) = neighbor_of(topo, face) else {
                continue;
            };
            let nodes = faces.face(face).to_vec();
            let equations = nodes
                .iter()
                .flat_map(|&n| (0..dims).map(move |d| eqs.equation(mesh.level, n, d)))
                .collect();
            cap.push(CommunicationPass {
                seq: cap.len(),
                face,
                neighbor,
                nodes,
                equations,
            });
        }
    }
    cap
}

fn surface_passes(mesh: &LevelMesh, faces: &BoundaryFaceSet, topo: &Topology) -> CapPasses<SurfacePass> {
    let mut cap = CapPasses::default();
    for axis in [Axis::X, Axis::Y] {
        for dir in Direction::ALL {
            let face = Face::of(axis, dir);
            let Some(neighbor) = neighbor_of(topo, face) else {
                continue;
            };
            let list = faces.face(face);
            // bottom layer comes first in the scan
            let nodes = list[..list.len() / mesh.noz]
                .iter()
                .map(|&n| mesh.surface_node(n))
                .collect();
            cap.push(SurfacePass {
                seq: cap.len(),
                face,
                neighbor,
                nodes,
            });
        }
    }
    cap
}

fn build_table<P: Pass>(
    decomp: &Decomposition,
    bounds: &BoundaryTable,
    topo: &Topology,
    mut per_cap: impl FnMut(&LevelMesh, &BoundaryFaceSet) -> CapPasses<P>,
) -> Result<PassTable<P>, HaloError> {
    let mut levels = Vec::with_capacity(decomp.levmax() - decomp.levmin() + 1);
    for lev in decomp.levmin()..=decomp.levmax() {
        let mesh = decomp.level(lev)?;
        let caps = bounds.level(lev)?;
        if caps.len() != topo.caps_per_proc() {
            return Err(HaloError::CapCountMismatch {
                expected: topo.caps_per_proc(),
                got: caps.len(),
            });
        }
        let built: Vec<CapPasses<P>> = caps.iter().map(|f| per_cap(mesh, f)).collect();
        for c in &built {
            c.debug_assert_invariants();
        }
        levels.push(built);
    }
    Ok(PassTable {
        levmin: decomp.levmin(),
        levels,
    })
}

/// Volume passes, with equation lists expanded through `eqs`.
pub fn build_volume_passes(
    decomp: &Decomposition,
    bounds: &BoundaryTable,
    topo: &Topology,
    eqs: &impl EquationMap,
) -> Result<VolumePassTable, HaloError> {
    let table = build_table(decomp, bounds, topo, |mesh, faces| {
        volume_passes(mesh, faces, topo, eqs)
    })?;
    log::info!(
        "rank {}: {} volume passes at the finest level",
        topo.me(),
        table
            .level(decomp.levmax())?
            .iter()
            .map(CapPasses::len)
            .sum::<usize>()
    );
    Ok(table)
}

/// Surface passes (X and Y only) over surface-layer node ids.
pub fn build_surface_passes(
    decomp: &Decomposition,
    bounds: &BoundaryTable,
    topo: &Topology,
) -> Result<SurfacePassTable, HaloError> {
    build_table(decomp, bounds, topo, |mesh, faces| {
        surface_passes(mesh, faces, topo)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::boundary::classify_boundaries;
    use crate::topology::decomposition::{CoarseningMode, GlobalMesh, decompose};
    use crate::topology::processor_grid::ProcGrid;

    fn build(grid: ProcGrid, me: usize) -> (Topology, Decomposition, BoundaryTable) {
        let t = Topology::resolve(grid, me, grid.total_procs()).unwrap();
        let m = GlobalMesh {
            elx: 4 * grid.nprocx,
            ely: 4 * grid.nprocy,
            elz: 2 * grid.nprocz,
            levmin: 0,
            levmax: 1,
            coarsening: CoarseningMode::Multigrid,
            nsd: 3,
        };
        let d = decompose(&m, &t).unwrap();
        let b = classify_boundaries(&d, &t);
        (t, d, b)
    }

    #[test]
    fn interior_rank_has_six_ordered_passes() {
        let g = ProcGrid::new(3, 3, 3, 1).unwrap();
        // rank 13 is the center of the grid
        let (t, d, b) = build(g, 13);
        let v = build_volume_passes(&d, &b, &t, &InterleavedEquations::new(3)).unwrap();
        let cap = &v.level(1).unwrap()[0];
        assert_eq!(cap.bound_passes, [1; 6]);
        let faces: Vec<Face> = cap.passes.iter().map(|p| p.face).collect();
        assert_eq!(faces, Face::ALL.to_vec());
        assert_eq!(cap.passes[0].neighbor, 13 - 3);
        assert_eq!(cap.passes[3].neighbor, 13 + 9);
        assert_eq!(cap.passes[5].neighbor, 14);
        assert!(cap.validate_invariants().is_ok());
    }

    #[test]
    fn corner_rank_skips_edge_faces() {
        let g = ProcGrid::new(2, 2, 1, 1).unwrap();
        let (t, d, b) = build(g, 0);
        let v = build_volume_passes(&d, &b, &t, &InterleavedEquations::new(3)).unwrap();
        for cap in v.level(0).unwrap().iter().chain(v.level(1).unwrap()) {
            assert_eq!(cap.bound_passes, [0, 1, 0, 1, 0, 0]);
            assert_eq!(cap.passes.iter().map(|p| p.seq).collect::<Vec<_>>(), vec![0, 1]);
        }
    }

    #[test]
    fn equations_expand_each_node() {
        let g = ProcGrid::new(2, 1, 1, 1).unwrap();
        let (t, d, b) = build(g, 1);
        let v = build_volume_passes(&d, &b, &t, &InterleavedEquations::new(3)).unwrap();
        let p = &v.level(1).unwrap()[0].passes[0];
        assert_eq!(p.face, Face::Left);
        assert_eq!(p.equations.len(), 3 * p.nodes.len());
        assert_eq!(&p.equations[..3], &[p.nodes[0] * 3, p.nodes[0] * 3 + 1, p.nodes[0] * 3 + 2]);
    }

    #[test]
    fn surface_passes_use_bottom_layer() {
        let g = ProcGrid::new(2, 2, 2, 1).unwrap();
        let (t, d, b) = build(g, 0);
        let s = build_surface_passes(&d, &b, &t).unwrap();
        let mesh = d.finest();
        let cap = &s.level(1).unwrap()[0];
        assert_eq!(cap.len(), 2);
        let right = cap.on_face(Face::Right).unwrap();
        assert_eq!(right.nodes.len(), mesh.noy);
        assert_eq!(right.nodes[1], mesh.nox + mesh.nox - 1);
        assert!(cap.on_face(Face::Top).is_none());
    }

    #[test]
    fn out_of_range_level_is_an_error() {
        let g = ProcGrid::new(1, 1, 1, 1).unwrap();
        let (t, d, b) = build(g, 0);
        let s = build_surface_passes(&d, &b, &t).unwrap();
        assert!(s.level(1).unwrap()[0].is_empty());
        assert!(matches!(s.level(2), Err(HaloError::LevelOutOfRange { level: 2, .. })));
    }
}
