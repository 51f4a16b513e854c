//! Startup inputs for the parallel layer.
//!
//! Parsing is left to the caller; [`HaloConfig`] only derives serde so a
//! driver can read it from whatever format it already uses.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::halo_error::HaloError;
use crate::topology::decomposition::{CoarseningMode, GlobalMesh};
use crate::topology::processor_grid::ProcGrid;

/// Processor grid, global mesh and run flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaloConfig {
    pub nprocx: usize,
    pub nprocy: usize,
    pub nprocz: usize,
    #[serde(default = "default_caps")]
    pub caps: usize,
    /// Global element counts.
    pub elx: usize,
    pub ely: usize,
    pub elz: usize,
    #[serde(default)]
    pub levmin: usize,
    pub levmax: usize,
    #[serde(default)]
    pub coarsening: CoarseningMode,
    /// Degrees of freedom per node.
    #[serde(default = "default_nsd")]
    pub nsd: usize,
    /// Dump the coordinate map, face lists and passes at setup.
    #[serde(default)]
    pub verbose: bool,
    /// Bound on a single receive; absent means wait forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recv_timeout_ms: Option<u64>,
}

fn default_caps() -> usize {
    1
}
fn default_nsd() -> usize {
    3
}

impl HaloConfig {
    pub fn proc_grid(&self) -> Result<ProcGrid, HaloError> {
        ProcGrid::new(self.nprocx, self.nprocy, self.nprocz, self.caps)
    }

    pub fn global_mesh(&self) -> GlobalMesh {
        GlobalMesh {
            elx: self.elx,
            ely: self.ely,
            elz: self.elz,
            levmin: self.levmin,
            levmax: self.levmax,
            coarsening: self.coarsening,
            nsd: self.nsd,
        }
    }

    pub fn recv_timeout(&self) -> Option<Duration> {
        self.recv_timeout_ms.map(Duration::from_millis)
    }

    /// Checks that need no rank context. Rank-count and divisibility checks
    /// happen in [`Topology::resolve`](crate::topology::processor_grid::Topology::resolve)
    /// and [`decompose`](crate::topology::decomposition::decompose).
    pub fn validate(&self) -> Result<(), HaloError> {
        self.proc_grid()?;
        self.global_mesh().validate()
    }
}
