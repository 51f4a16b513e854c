//! HaloError: Unified error type for sphere-halo public APIs
//!
//! Every fallible setup or exchange operation returns this type. Errors are
//! fatal for the distributed job; the top-level [`run`](crate::parallel::run)
//! loop turns them into a process exit status.

use std::time::Duration;

use thiserror::Error;

use crate::topology::processor_grid::Axis;

/// Exit status used when the requested processor grid does not match the
/// number of ranks actually launched.
pub const FATAL_TOPOLOGY_EXIT: i32 = 8;
/// Exit status for every other configuration error.
pub const FATAL_CONFIG_EXIT: i32 = 2;
/// Exit status for transport and resource failures.
pub const FATAL_RUNTIME_EXIT: i32 = 1;

/// Unified error type for sphere-halo operations.
#[derive(Debug, Error)]
pub enum HaloError {
    /// `nprocx*nprocy*nprocz*caps` differs from the number of launched ranks.
    #[error("# of requested CPU is incorrect: grid needs {requested} ranks, {actual} launched")]
    ProcessorCountMismatch { requested: usize, actual: usize },
    /// A processor count, element count or dimension was zero.
    #[error("Configuration error: `{0}` must be positive")]
    ZeroExtent(&'static str),
    /// Global element count not divisible by the processor count along an axis.
    #[error("Configuration error: {elements} elements along {axis} cannot be split over {procs} processors")]
    IndivisibleMesh {
        axis: Axis,
        elements: usize,
        procs: usize,
    },
    /// Local element count cannot be coarsened down to the coarsest level.
    #[error("Configuration error: {local_elements} local elements along {axis} are not a multiple of 2^{levels}")]
    MultigridUnit {
        axis: Axis,
        local_elements: usize,
        levels: usize,
    },
    /// `levmin > levmax`.
    #[error("Configuration error: invalid multigrid range levmin={levmin} levmax={levmax}")]
    InvalidLevelRange { levmin: usize, levmax: usize },
    /// A table lookup used a level outside `[levmin, levmax]`.
    #[error("Level {level} outside multigrid range [{levmin}, {levmax}]")]
    LevelOutOfRange {
        level: usize,
        levmin: usize,
        levmax: usize,
    },
    /// A rank id outside the communicator.
    #[error("Rank {rank} outside communicator of size {size}")]
    RankOutOfRange { rank: usize, size: usize },
    /// Group-include was asked for a group that does not contain the caller.
    #[error("Rank {rank} is not a member of the requested group")]
    NotAMember { rank: usize },
    /// Field arrays passed to an exchange do not match the local cap count.
    #[error("Exchange expects {expected} cap field(s), got {got}")]
    CapCountMismatch { expected: usize, got: usize },
    /// A pass index points past the end of the supplied field.
    #[error("Exchange index {index} out of range for field of length {len}")]
    FieldTooShort { index: usize, len: usize },
    /// A send or receive buffer could not be allocated.
    #[error("Resource error: failed to allocate {bytes} bytes for an exchange buffer")]
    Allocation { bytes: usize },
    /// The received message length differs from the pass length.
    #[error("Message from rank {neighbor} carried {got} bytes, expected {expected}")]
    LengthMismatch {
        neighbor: usize,
        expected: usize,
        got: usize,
    },
    /// The bounded receive wait expired.
    #[error("Timed out after {waited:?} waiting for rank {neighbor}")]
    Timeout { neighbor: usize, waited: Duration },
    /// Communication failure with a neighbor rank.
    #[error("Communication error with rank {neighbor}: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// A setup table failed its structural check.
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
    /// Writing a diagnostic report failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HaloError {
    /// Process exit status for this error.
    pub fn exit_status(&self) -> i32 {
        match self {
            HaloError::ProcessorCountMismatch { .. } => FATAL_TOPOLOGY_EXIT,
            e if e.is_config() => FATAL_CONFIG_EXIT,
            _ => FATAL_RUNTIME_EXIT,
        }
    }

    /// True for errors derived only from configuration.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            HaloError::ProcessorCountMismatch { .. }
                | HaloError::ZeroExtent(_)
                | HaloError::IndivisibleMesh { .. }
                | HaloError::MultigridUnit { .. }
                | HaloError::InvalidLevelRange { .. }
        )
    }

    /// Every rank reaches a collective error identically, so the job can
    /// shut down in order. Anything else must abort the whole group.
    pub fn is_collective(&self) -> bool {
        self.is_config()
    }
}
