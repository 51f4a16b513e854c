//! Setup phase and top-level run loop.
//!
//! [`ParallelContext`] owns every table built at startup behind an `Arc`, so
//! solver code can hold on to them cheaply; nothing is written after setup.
//! [`run`] is the only place a fatal error turns into a process exit status.

use std::io::Write;
use std::sync::Arc;

use crate::algs::communicator::Communicator;
use crate::algs::diagnostics;
use crate::algs::exchange;
use crate::algs::passes::{
    EquationMap, SurfacePassTable, VolumePassTable, build_surface_passes, build_volume_passes,
};
use crate::config::HaloConfig;
use crate::halo_error::HaloError;
use crate::topology::boundary::{BoundaryTable, classify_boundaries};
use crate::topology::decomposition::{Decomposition, decompose};
use crate::topology::processor_grid::{CommGroups, Topology};

/// Signature of a nodal exchange entry point.
pub type NodeExchangeFn<C, T> =
    fn(&C, &VolumePassTable, usize, &mut [Vec<T>]) -> Result<(), HaloError>;

/// The nodal exchange entry points, registered once per run so distant
/// callers can hold them as plain function values.
pub struct NodeExchangeHooks<C> {
    pub double: NodeExchangeFn<C, f64>,
    pub float: NodeExchangeFn<C, f32>,
}

impl<C: Communicator> Default for NodeExchangeHooks<C> {
    fn default() -> Self {
        Self {
            double: exchange::exchange_node_d::<C>,
            float: exchange::exchange_node_f::<C>,
        }
    }
}

impl<C> Clone for NodeExchangeHooks<C> {
    fn clone(&self) -> Self {
        Self {
            double: self.double,
            float: self.float,
        }
    }
}

/// Everything setup produces except the world communicator itself.
struct Prepared<C> {
    config: Arc<HaloConfig>,
    topology: Arc<Topology>,
    decomposition: Arc<Decomposition>,
    boundaries: Arc<BoundaryTable>,
    volume: Arc<VolumePassTable>,
    surface: Arc<SurfacePassTable>,
    horizontal: C,
    vertical: C,
}

impl<C: Communicator> Prepared<C> {
    fn new(config: HaloConfig, world: &C, eqs: &impl EquationMap) -> Result<Self, HaloError> {
        config.validate()?;
        let topology = Topology::resolve(config.proc_grid()?, world.rank(), world.size())?;
        let (horizontal, vertical) = CommGroups::split(world, &topology)?;
        let decomposition = decompose(&config.global_mesh(), &topology)?;
        let boundaries = classify_boundaries(&decomposition, &topology);
        let volume = build_volume_passes(&decomposition, &boundaries, &topology, eqs)?;
        let surface = build_surface_passes(&decomposition, &boundaries, &topology)?;
        log::info!(
            "rank {}: parallel setup done, levels {}..={}",
            topology.me(),
            decomposition.levmin(),
            decomposition.levmax()
        );
        Ok(Self {
            config: Arc::new(config),
            topology: Arc::new(topology),
            decomposition: Arc::new(decomposition),
            boundaries: Arc::new(boundaries),
            volume: Arc::new(volume),
            surface: Arc::new(surface),
            horizontal,
            vertical,
        })
    }

    fn attach(self, world: C) -> ParallelContext<C> {
        ParallelContext {
            config: self.config,
            topology: self.topology,
            decomposition: self.decomposition,
            boundaries: self.boundaries,
            volume: self.volume,
            surface: self.surface,
            groups: CommGroups {
                world,
                horizontal: self.horizontal,
                vertical: self.vertical,
            },
            hooks: NodeExchangeHooks::default(),
        }
    }
}

/// Read-only parallel state of one rank.
pub struct ParallelContext<C> {
    config: Arc<HaloConfig>,
    topology: Arc<Topology>,
    decomposition: Arc<Decomposition>,
    boundaries: Arc<BoundaryTable>,
    volume: Arc<VolumePassTable>,
    surface: Arc<SurfacePassTable>,
    groups: CommGroups<C>,
    hooks: NodeExchangeHooks<C>,
}

impl<C: Communicator> ParallelContext<C> {
    /// Resolve the topology, build the sub-communicators, decompose every
    /// level, then classify faces and build both pass tables.
    ///
    /// A processor-count mismatch is reported before any communicator exists.
    pub fn setup(config: HaloConfig, world: C, eqs: &impl EquationMap) -> Result<Self, HaloError> {
        let ctx = Prepared::new(config, &world, eqs)?.attach(world);
        ctx.log_report();
        Ok(ctx)
    }

    fn log_report(&self) {
        if !self.config.verbose {
            return;
        }
        let mut buf = Vec::new();
        if let Err(e) = self.write_report(&mut buf) {
            log::warn!("rank {}: diagnostic dump failed: {e}", self.topology.me());
            return;
        }
        for line in String::from_utf8_lossy(&buf).lines() {
            log::debug!("rank {}: {line}", self.topology.me());
        }
    }

    pub fn config(&self) -> &Arc<HaloConfig> {
        &self.config
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn decomposition(&self) -> &Arc<Decomposition> {
        &self.decomposition
    }

    pub fn boundaries(&self) -> &Arc<BoundaryTable> {
        &self.boundaries
    }

    pub fn volume_passes(&self) -> &Arc<VolumePassTable> {
        &self.volume
    }

    pub fn surface_passes(&self) -> &Arc<SurfacePassTable> {
        &self.surface
    }

    pub fn world(&self) -> &C {
        &self.groups.world
    }

    /// Ranks sharing this rank's z layer.
    pub fn horizontal(&self) -> &C {
        &self.groups.horizontal
    }

    /// Ranks in this rank's radial column.
    pub fn vertical(&self) -> &C {
        &self.groups.vertical
    }

    pub fn hooks(&self) -> &NodeExchangeHooks<C> {
        &self.hooks
    }

    pub fn exchange_node_d(&self, lev: usize, fields: &mut [Vec<f64>]) -> Result<(), HaloError> {
        (self.hooks.double)(self.world(), &self.volume, lev, fields)
    }

    pub fn exchange_node_f(&self, lev: usize, fields: &mut [Vec<f32>]) -> Result<(), HaloError> {
        (self.hooks.float)(self.world(), &self.volume, lev, fields)
    }

    pub fn exchange_id_d(&self, lev: usize, fields: &mut [Vec<f64>]) -> Result<(), HaloError> {
        exchange::exchange_id_d(self.world(), &self.volume, lev, fields)
    }

    pub fn exchange_snode_f(
        &self,
        lev: usize,
        first: &mut [Vec<f32>],
        second: &mut [Vec<f32>],
    ) -> Result<(), HaloError> {
        exchange::exchange_snode_f(self.world(), &self.surface, lev, first, second)
    }

    /// Barrier over `world`.
    pub fn sync(&self) {
        self.world().barrier();
    }

    pub fn wtime(&self) -> f64 {
        self.world().wtime()
    }

    /// Abort the whole job with the exit status of `err`.
    pub fn terminate(&self, err: &HaloError) -> ! {
        log::error!("rank {}: fatal: {err}", self.topology.me());
        self.world().abort(err.exit_status())
    }

    /// Coordinate map, groups, face lists, skip list and passes.
    pub fn write_report<W: Write>(&self, mut writer: W) -> Result<(), HaloError> {
        diagnostics::write_location_map(&mut writer, self.topology.map())?;
        diagnostics::write_groups(&mut writer, &self.topology)?;
        diagnostics::write_boundaries(&mut writer, &self.boundaries)?;
        diagnostics::write_skip_nodes(&mut writer, &self.boundaries)?;
        diagnostics::write_passes(&mut writer, &self.volume, &self.surface)
    }
}

fn fail<C: Communicator>(world: &C, err: HaloError) -> i32 {
    let status = err.exit_status();
    if err.is_collective() {
        log::error!("rank {}: {err}; shutting down with status {status}", world.rank());
        return status;
    }
    log::error!("rank {}: {err}; aborting job with status {status}", world.rank());
    world.abort(status)
}

/// Set up, run `body`, and map any fatal error to an exit status.
///
/// Errors every rank reaches identically (configuration) return their
/// status so each rank shuts down in order. Anything else aborts the whole
/// job through `world`. Returns 0 on success.
pub fn run<C, E, F>(world: C, config: HaloConfig, eqs: &E, body: F) -> i32
where
    C: Communicator,
    E: EquationMap,
    F: FnOnce(&ParallelContext<C>) -> Result<(), HaloError>,
{
    let prepared = match Prepared::new(config, &world, eqs) {
        Ok(p) => p,
        Err(e) => return fail(&world, e),
    };
    let ctx = prepared.attach(world);
    ctx.log_report();
    match body(&ctx) {
        Ok(()) => 0,
        Err(e) => fail(ctx.world(), e),
    }
}
