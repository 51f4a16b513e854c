#![cfg_attr(docsrs, feature(doc_cfg))]
//! # sphere-halo
//!
//! Parallel layer of a structured-mesh finite-element solver on spherical
//! caps. Ranks are placed on a `caps x nprocx x nprocy x nprocz` processor
//! grid, each rank owns one rectangular block of the global mesh at every
//! multigrid level, and values duplicated on the faces between blocks are
//! summed across ranks by a fixed sequence of pairwise exchanges.
//!
//! ## Pipeline
//! Setup runs once and produces read-only tables:
//!
//! 1. [`topology::processor_grid`] resolves the rank and builds the
//!    horizontal and vertical sub-communicators.
//! 2. [`topology::decomposition`] sizes the local block on every level.
//! 3. [`topology::boundary`] lists the six faces' nodes in a scan order both
//!    sides of a face share.
//! 4. [`algs::passes`] turns the faces into ordered communication passes.
//!
//! [`algs::exchange`] then consumes the pass tables as often as the solver
//! needs. [`parallel::ParallelContext`] bundles all of it, and
//! [`parallel::run`] maps fatal errors to exit statuses.
//!
//! ## Backends
//! - `NoComm`: one rank, no peers
//! - `LocalComm`: ranks as threads of one process, used by the tests
//! - `MpiComm`: enable the `mpi-support` feature

pub mod algs;
pub mod config;
pub mod debug_invariants;
pub mod halo_error;
pub mod parallel;
pub mod topology;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{CommTag, Communicator, LocalComm, LocalFabric, NoComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::passes::{EquationMap, InterleavedEquations};
    pub use crate::config::HaloConfig;
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::halo_error::HaloError;
    pub use crate::parallel::{ParallelContext, run};
    pub use crate::topology::boundary::Face;
    pub use crate::topology::decomposition::CoarseningMode;
    pub use crate::topology::processor_grid::{Axis, Direction, ProcGrid, Topology};
}
