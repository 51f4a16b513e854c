//! Static layout of the distributed mesh.
//!
//! - [`processor_grid`]: rank to grid-location mapping and sub-communicators
//! - [`decomposition`]: per-level local block sizes and offsets
//! - [`boundary`]: face node lists and node flags

pub mod boundary;
pub mod decomposition;
pub mod processor_grid;

pub use processor_grid::{Axis, Direction, ProcGrid, Topology};
