//! Processor grid: rank <-> (cap, x, y, z) resolution.
//!
//! Ranks are laid out z-fastest inside a cap, then x, then y, then cap:
//!
//! ```text
//! rank = cap*nprocx*nprocy*nprocz + y*nprocx*nprocz + x*nprocz + z
//! ```
//!
//! [`ProcGrid`] exposes the mapping as pure functions, [`LocationMap`] stores
//! the full table once for neighbor lookups, and [`Topology`] binds both to
//! the calling rank.

use std::fmt;
use std::sync::Arc;

use itertools::iproduct;
use serde::{Deserialize, Serialize};

use crate::algs::communicator::Communicator;
use crate::debug_invariants::DebugInvariants;
use crate::halo_error::HaloError;

/// Mesh axis of the local sub-domain.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Fixed exchange order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        };
        f.write_str(s)
    }
}

/// Direction along an [`Axis`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    Negative,
    Positive,
}

impl Direction {
    /// Negative first, as passes are built.
    pub const ALL: [Direction; 2] = [Direction::Negative, Direction::Positive];

    fn step(self, coord: usize, extent: usize) -> Option<usize> {
        match self {
            Direction::Negative => coord.checked_sub(1),
            Direction::Positive => (coord + 1 < extent).then_some(coord + 1),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Negative => "negative",
            Direction::Positive => "positive",
        })
    }
}

/// Coordinate of a rank in the processor grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RankLocation {
    pub cap: usize,
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl RankLocation {
    pub fn along(&self, axis: Axis) -> usize {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

/// Processor counts of the decomposition.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcGrid {
    pub nprocx: usize,
    pub nprocy: usize,
    pub nprocz: usize,
    pub caps: usize,
}

impl ProcGrid {
    /// Create a grid, rejecting zero extents.
    pub fn new(nprocx: usize, nprocy: usize, nprocz: usize, caps: usize) -> Result<Self, HaloError> {
        for (name, v) in [
            ("nprocx", nprocx),
            ("nprocy", nprocy),
            ("nprocz", nprocz),
            ("caps", caps),
        ] {
            if v == 0 {
                return Err(HaloError::ZeroExtent(name));
            }
        }
        Ok(Self {
            nprocx,
            nprocy,
            nprocz,
            caps,
        })
    }

    pub fn surf_procs_per_cap(&self) -> usize {
        self.nprocx * self.nprocy
    }

    pub fn procs_per_cap(&self) -> usize {
        self.surf_procs_per_cap() * self.nprocz
    }

    pub fn total_procs(&self) -> usize {
        self.caps * self.procs_per_cap()
    }

    pub fn total_surf_procs(&self) -> usize {
        self.caps * self.surf_procs_per_cap()
    }

    pub fn extent(&self, axis: Axis) -> usize {
        match axis {
            Axis::X => self.nprocx,
            Axis::Y => self.nprocy,
            Axis::Z => self.nprocz,
        }
    }

    /// Fail unless the grid accounts for exactly `actual` ranks.
    pub fn check_rank_count(&self, actual: usize) -> Result<(), HaloError> {
        let requested = self.total_procs();
        if requested != actual {
            return Err(HaloError::ProcessorCountMismatch { requested, actual });
        }
        Ok(())
    }

    /// Decode a rank: z first, then x, then y.
    pub fn locate(&self, rank: usize) -> RankLocation {
        let z = rank % self.nprocz;
        let column = rank / self.nprocz;
        let x = column % self.nprocx;
        let y = (column / self.nprocx) % self.nprocy;
        RankLocation {
            cap: rank / self.procs_per_cap(),
            x,
            y,
            z,
        }
    }

    /// Encode a location.
    pub fn rank_of(&self, loc: RankLocation) -> usize {
        loc.cap * self.procs_per_cap()
            + loc.y * self.nprocx * self.nprocz
            + loc.x * self.nprocz
            + loc.z
    }

    fn contains(&self, loc: RankLocation) -> bool {
        loc.cap < self.caps && loc.x < self.nprocx && loc.y < self.nprocy && loc.z < self.nprocz
    }
}

/// Full `(cap, x, y, z) -> rank` table.
#[derive(Clone, Debug, Serialize)]
pub struct LocationMap {
    grid: ProcGrid,
    ranks: Vec<usize>,
}

impl LocationMap {
    /// Fill the table by direct formula, no search.
    pub fn build(grid: ProcGrid) -> Self {
        let mut ranks = vec![0; grid.total_procs()];
        for (cap, x, y, z) in iproduct!(0..grid.caps, 0..grid.nprocx, 0..grid.nprocy, 0..grid.nprocz) {
            let loc = RankLocation { cap, x, y, z };
            ranks[Self::slot(&grid, loc)] = grid.rank_of(loc);
        }
        Self { grid, ranks }
    }

    fn slot(grid: &ProcGrid, loc: RankLocation) -> usize {
        ((loc.cap * grid.nprocx + loc.x) * grid.nprocy + loc.y) * grid.nprocz + loc.z
    }

    pub fn grid(&self) -> &ProcGrid {
        &self.grid
    }

    /// Rank at `loc`, or `None` outside the grid.
    pub fn get(&self, loc: RankLocation) -> Option<usize> {
        if !self.grid.contains(loc) {
            return None;
        }
        self.ranks.get(Self::slot(&self.grid, loc)).copied()
    }

    /// Neighbor one step along `axis`, or `None` on the global edge.
    pub fn neighbor(&self, loc: RankLocation, axis: Axis, dir: Direction) -> Option<usize> {
        let mut n = loc;
        match axis {
            Axis::X => n.x = dir.step(loc.x, self.grid.nprocx)?,
            Axis::Y => n.y = dir.step(loc.y, self.grid.nprocy)?,
            Axis::Z => n.z = dir.step(loc.z, self.grid.nprocz)?,
        }
        self.get(n)
    }

    /// Iterate `(location, rank)` in cap, x, y, z order.
    pub fn iter(&self) -> impl Iterator<Item = (RankLocation, usize)> + '_ {
        let g = self.grid;
        iproduct!(0..g.caps, 0..g.nprocx, 0..g.nprocy, 0..g.nprocz).map(move |(cap, x, y, z)| {
            let loc = RankLocation { cap, x, y, z };
            (loc, self.ranks[Self::slot(&g, loc)])
        })
    }
}

impl DebugInvariants for LocationMap {
    fn validate_invariants(&self) -> Result<(), HaloError> {
        let total = self.grid.total_procs();
        let mut seen = vec![false; total];
        for (loc, rank) in self.iter() {
            if rank >= total {
                return Err(HaloError::RankOutOfRange { rank, size: total });
            }
            if std::mem::replace(&mut seen[rank], true) || self.grid.locate(rank) != loc {
                return Err(HaloError::InvariantViolation(format!(
                    "location map is not a bijection at {loc:?} (rank {rank})"
                )));
            }
        }
        Ok(())
    }
}

/// The calling rank's place in the processor grid.
#[derive(Clone, Debug)]
pub struct Topology {
    me: usize,
    loc: RankLocation,
    caps_per_proc: usize,
    map: Arc<LocationMap>,
}

impl Topology {
    /// Validate the grid against `world_size` and resolve rank `me`.
    pub fn resolve(grid: ProcGrid, me: usize, world_size: usize) -> Result<Self, HaloError> {
        grid.check_rank_count(world_size)?;
        if me >= world_size {
            return Err(HaloError::RankOutOfRange {
                rank: me,
                size: world_size,
            });
        }
        let map = LocationMap::build(grid);
        map.debug_assert_invariants();
        Ok(Self {
            me,
            loc: grid.locate(me),
            caps_per_proc: 1,
            map: Arc::new(map),
        })
    }

    pub fn me(&self) -> usize {
        self.me
    }

    pub fn location(&self) -> RankLocation {
        self.loc
    }

    pub fn grid(&self) -> &ProcGrid {
        self.map.grid()
    }

    pub fn map(&self) -> &Arc<LocationMap> {
        &self.map
    }

    /// Caps owned by this rank (always one).
    pub fn caps_per_proc(&self) -> usize {
        self.caps_per_proc
    }

    /// Neighbor rank, `None` on the global edge of the decomposition.
    pub fn neighbor(&self, axis: Axis, dir: Direction) -> Option<usize> {
        self.map.neighbor(self.loc, axis, dir)
    }

    /// True if the sub-domain touches the global edge in `dir` along `axis`.
    pub fn on_edge(&self, axis: Axis, dir: Direction) -> bool {
        self.neighbor(axis, dir).is_none()
    }

    /// Ranks sharing this rank's z layer, over every cap, x and y.
    pub fn horizontal_members(&self) -> Vec<usize> {
        let g = self.grid();
        let z = self.loc.z;
        iproduct!(0..g.caps, 0..g.nprocx, 0..g.nprocy)
            .filter_map(|(cap, x, y)| self.map.get(RankLocation { cap, x, y, z }))
            .collect()
    }

    /// Ranks in this rank's radial column, bottom to top.
    pub fn vertical_members(&self) -> Vec<usize> {
        let RankLocation { cap, x, y, .. } = self.loc;
        (0..self.grid().nprocz)
            .filter_map(|z| self.map.get(RankLocation { cap, x, y, z }))
            .collect()
    }
}

/// `world` plus the horizontal and vertical sub-communicators.
pub struct CommGroups<C> {
    pub world: C,
    pub horizontal: C,
    pub vertical: C,
}

impl<C: Communicator> CommGroups<C> {
    /// Build both sub-communicators through group-include on `world`.
    pub fn build(world: C, topology: &Topology) -> Result<Self, HaloError> {
        let (horizontal, vertical) = Self::split(&world, topology)?;
        Ok(Self {
            world,
            horizontal,
            vertical,
        })
    }

    /// The `(horizontal, vertical)` pair alone; `world` stays with the caller.
    pub fn split(world: &C, topology: &Topology) -> Result<(C, C), HaloError> {
        let h = topology.horizontal_members();
        let v = topology.vertical_members();
        log::debug!(
            "rank {}: horizontal group {:?}, vertical group {:?}",
            topology.me(),
            h,
            v
        );
        Ok((world.include(&h)?, world.include(&v)?))
    }
}

static_assertions::assert_impl_all!(LocationMap: Send, Sync);
static_assertions::assert_impl_all!(Topology: Send, Sync);
