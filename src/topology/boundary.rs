//! Sub-domain face classification.
//!
//! For every level and cap, the six faces of the local block are walked in a
//! fixed scan order. Two neighboring ranks walk their mirrored faces in the
//! same order, so the i-th entry of one list is the physically coincident node
//! of the i-th entry of the other. Pass construction relies on this; no
//! handshake ever pairs indices at runtime.

use std::ops::{BitOr, BitOrAssign};

use serde::Serialize;

use crate::halo_error::HaloError;
use crate::topology::decomposition::{Decomposition, LevelMesh};
use crate::topology::processor_grid::{Axis, Direction, Topology};

/// Face of the local block; ids 1..=6 in the conventional order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Face {
    Left = 1,
    Right = 2,
    Front = 3,
    Rear = 4,
    Bottom = 5,
    Top = 6,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::Left,
        Face::Right,
        Face::Front,
        Face::Rear,
        Face::Bottom,
        Face::Top,
    ];

    /// Conventional 1-based face id.
    pub fn id(self) -> usize {
        self as usize
    }

    /// Slot in 0-based face arrays.
    pub fn slot(self) -> usize {
        self.id() - 1
    }

    pub fn axis(self) -> Axis {
        match self {
            Face::Left | Face::Right => Axis::X,
            Face::Front | Face::Rear => Axis::Y,
            Face::Bottom | Face::Top => Axis::Z,
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            Face::Left | Face::Front | Face::Bottom => Direction::Negative,
            Face::Right | Face::Rear | Face::Top => Direction::Positive,
        }
    }

    pub fn of(axis: Axis, dir: Direction) -> Face {
        match (axis, dir) {
            (Axis::X, Direction::Negative) => Face::Left,
            (Axis::X, Direction::Positive) => Face::Right,
            (Axis::Y, Direction::Negative) => Face::Front,
            (Axis::Y, Direction::Positive) => Face::Rear,
            (Axis::Z, Direction::Negative) => Face::Bottom,
            (Axis::Z, Direction::Positive) => Face::Top,
        }
    }

    /// The face a neighbor sees across this one.
    pub fn mirror(self) -> Face {
        match self {
            Face::Left => Face::Right,
            Face::Right => Face::Left,
            Face::Front => Face::Rear,
            Face::Rear => Face::Front,
            Face::Bottom => Face::Top,
            Face::Top => Face::Bottom,
        }
    }
}

/// Per-node classification bits.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct NodeFlags(u8);

impl NodeFlags {
    pub const NONE: NodeFlags = NodeFlags(0);
    /// Node lies on some face of the block.
    pub const BOUNDARY: NodeFlags = NodeFlags(1);
    /// Copy owned by the positive-side neighbor; skip it when integrating.
    pub const DUPLICATE: NodeFlags = NodeFlags(1 << 1);

    pub fn contains(self, other: NodeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for NodeFlags {
    type Output = NodeFlags;
    fn bitor(self, rhs: NodeFlags) -> NodeFlags {
        NodeFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for NodeFlags {
    fn bitor_assign(&mut self, rhs: NodeFlags) {
        self.0 |= rhs.0;
    }
}

/// Six face node lists plus node flags for one level and cap.
#[derive(Clone, Debug, Serialize)]
pub struct BoundaryFaceSet {
    faces: [Vec<usize>; 6],
    flags: Vec<NodeFlags>,
}

impl BoundaryFaceSet {
    /// Node list of `face` in scan order.
    pub fn face(&self, face: Face) -> &[usize] {
        &self.faces[face.slot()]
    }

    pub fn flags(&self, node: usize) -> NodeFlags {
        self.flags.get(node).copied().unwrap_or_default()
    }

    pub fn is_boundary(&self, node: usize) -> bool {
        self.flags(node).contains(NodeFlags::BOUNDARY)
    }

    pub fn is_duplicate(&self, node: usize) -> bool {
        self.flags(node).contains(NodeFlags::DUPLICATE)
    }

    /// Nodes flagged [`NodeFlags::DUPLICATE`], ascending.
    pub fn skip_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.flags
            .iter()
            .enumerate()
            .filter(|(_, f)| f.contains(NodeFlags::DUPLICATE))
            .map(|(n, _)| n)
    }
}

fn scan_face(mesh: &LevelMesh, face: Face) -> Vec<usize> {
    let LevelMesh { nox, noy, noz, .. } = *mesh;
    let mut out = Vec::new();
    match face {
        Face::Left | Face::Right => {
            let x = if face == Face::Left { 0 } else { nox - 1 };
            for z in 0..noz {
                for y in 0..noy {
                    out.push(mesh.node_index(x, y, z));
                }
            }
        }
        Face::Front | Face::Rear => {
            let y = if face == Face::Front { 0 } else { noy - 1 };
            for z in 0..noz {
                for x in 0..nox {
                    out.push(mesh.node_index(x, y, z));
                }
            }
        }
        Face::Bottom | Face::Top => {
            let z = if face == Face::Bottom { 0 } else { noz - 1 };
            for y in 0..noy {
                for x in 0..nox {
                    out.push(mesh.node_index(x, y, z));
                }
            }
        }
    }
    out
}

/// Classify the faces of one level's block.
pub fn classify_level(mesh: &LevelMesh, topo: &Topology) -> BoundaryFaceSet {
    let faces = Face::ALL.map(|f| scan_face(mesh, f));
    let mut flags = vec![NodeFlags::NONE; mesh.nno];
    for list in &faces {
        for &node in list {
            flags[node] |= NodeFlags::BOUNDARY;
        }
    }
    for axis in Axis::ALL {
        if topo.on_edge(axis, Direction::Positive) {
            continue;
        }
        for &node in &faces[Face::of(axis, Direction::Positive).slot()] {
            flags[node] |= NodeFlags::DUPLICATE;
        }
    }
    BoundaryFaceSet { faces, flags }
}

/// Face sets for every level, keyed by level then cap.
#[derive(Clone, Debug, Serialize)]
pub struct BoundaryTable {
    levmin: usize,
    levels: Vec<Vec<BoundaryFaceSet>>,
}

impl BoundaryTable {
    pub fn levmin(&self) -> usize {
        self.levmin
    }

    pub fn levmax(&self) -> usize {
        self.levmin + self.levels.len() - 1
    }

    /// Face sets of every local cap at `lev`.
    pub fn level(&self, lev: usize) -> Result<&[BoundaryFaceSet], HaloError> {
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

/// Classify every level and local cap of the decomposition.
pub fn classify_boundaries(decomp: &Decomposition, topo: &Topology) -> BoundaryTable {
    let levels = (decomp.levmin()..=decomp.levmax())
        .filter_map(|lev| decomp.level(lev).ok())
        .map(|mesh| {
            (0..topo.caps_per_proc())
                .map(|_| classify_level(mesh, topo))
                .collect()
        })
        .collect();
    BoundaryTable {
        levmin: decomp.levmin(),
        levels,
    }
}
