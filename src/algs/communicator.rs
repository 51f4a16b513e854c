//! Thin layer over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices*. The halo protocol only ever needs a
//! blocking, combined send-and-receive with one peer, so that is the single
//! point-to-point primitive: pairing the send with the receive in one call
//! means two ranks can never both sit in a receive waiting for each other.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};

use crate::config::HaloConfig;
use crate::halo_error::HaloError;

/// Message tag shared by both halves of a send-receive.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    pub const fn as_i32(self) -> i32 {
        self.0 as i32
    }
}

/// Blocking communication interface.
pub trait Communicator {
    /// Rank of the caller inside this communicator.
    fn rank(&self) -> usize;
    /// Number of ranks in this communicator.
    fn size(&self) -> usize;

    /// Send `send` to `peer` and receive exactly `recv.len()` bytes from the
    /// same peer with the same tag. Returns once both halves completed.
    fn sendrecv(
        &self,
        peer: usize,
        tag: CommTag,
        send: &[u8],
        recv: &mut [u8],
    ) -> Result<(), HaloError>;

    /// Block until every rank of the communicator arrived.
    fn barrier(&self);

    /// Create a communicator over `members` (ranks of `self`, in the order
    /// given). Collective over `self`.
    fn include(&self, members: &[usize]) -> Result<Self, HaloError>
    where
        Self: Sized;

    /// Wall-clock seconds since an arbitrary fixed origin.
    fn wtime(&self) -> f64;

    /// Tear down the whole job with `status`.
    fn abort(&self, status: i32) -> !;
}

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

fn seconds_since_epoch() -> f64 {
    EPOCH.elapsed().as_secs_f64()
}

/// Compile-time no-op comm for pure serial runs (one rank).
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn sendrecv(&self, peer: usize, _tag: CommTag, _send: &[u8], _recv: &mut [u8]) -> Result<(), HaloError> {
        Err(HaloError::CommError {
            neighbor: peer,
            source: "NoComm has no peers to exchange with".into(),
        })
    }

    fn barrier(&self) {}

    fn include(&self, members: &[usize]) -> Result<Self, HaloError> {
        match members {
            [0] => Ok(NoComm),
            _ => Err(HaloError::NotAMember { rank: 0 }),
        }
    }

    fn wtime(&self) -> f64 {
        seconds_since_epoch()
    }

    fn abort(&self, status: i32) -> ! {
        std::process::exit(status)
    }
}

// --- LocalComm: ranks as threads of one process ---
type MailKey = (u64, usize, usize, u16); // (context, src, dst, tag), world ranks

/// Shared medium for a set of in-process ranks.
pub struct LocalFabric {
    size: usize,
    mailbox: Mutex<HashMap<MailKey, VecDeque<Bytes>>>,
    arrived: Condvar,
    barriers: DashMap<u64, Arc<Barrier>>,
    groups_created: AtomicUsize,
    recv_timeout: Option<Duration>,
}

const WORLD_CONTEXT: u64 = 0;

impl LocalFabric {
    /// Fabric for `size` ranks; receives wait indefinitely.
    pub fn new(size: usize) -> Arc<Self> {
        Self::build(size, None)
    }

    /// Fabric whose receives fail with [`HaloError::Timeout`] after `timeout`.
    pub fn with_timeout(size: usize, timeout: Duration) -> Arc<Self> {
        Self::build(size, Some(timeout))
    }

    /// Fabric with one rank per grid location of `config`, bounded by its
    /// receive timeout if one is set.
    pub fn for_config(config: &HaloConfig) -> Arc<Self> {
        let size = config.nprocx * config.nprocy * config.nprocz * config.caps;
        Self::build(size, config.recv_timeout())
    }

    fn build(size: usize, recv_timeout: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            size,
            mailbox: Mutex::new(HashMap::new()),
            arrived: Condvar::new(),
            barriers: DashMap::new(),
            groups_created: AtomicUsize::new(0),
            recv_timeout,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// World communicator of `rank`.
    pub fn world(self: &Arc<Self>, rank: usize) -> LocalComm {
        LocalComm {
            fabric: Arc::clone(self),
            context: WORLD_CONTEXT,
            members: (0..self.size).collect(),
            rank,
        }
    }

    /// One world communicator per rank, in rank order.
    pub fn worlds(self: &Arc<Self>) -> Vec<LocalComm> {
        (0..self.size).map(|r| self.world(r)).collect()
    }

    /// Number of sub-communicators created on this fabric so far.
    pub fn groups_created(&self) -> usize {
        self.groups_created.load(Ordering::Acquire)
    }

    fn post(&self, key: MailKey, payload: Bytes) {
        self.mailbox.lock().entry(key).or_default().push_back(payload);
        self.arrived.notify_all();
    }

    /// Pop the oldest message under `key`, dropping the queue once it drains.
    fn pop(mail: &mut HashMap<MailKey, VecDeque<Bytes>>, key: &MailKey) -> Option<Bytes> {
        let queue = mail.get_mut(key)?;
        let msg = queue.pop_front();
        if queue.is_empty() {
            mail.remove(key);
        }
        msg
    }

    fn take(&self, key: MailKey, neighbor: usize) -> Result<Bytes, HaloError> {
        let started = Instant::now();
        let deadline = self.recv_timeout.map(|t| started + t);
        let mut mail = self.mailbox.lock();
        loop {
            if let Some(msg) = Self::pop(&mut mail, &key) {
                return Ok(msg);
            }
            match deadline {
                None => self.arrived.wait(&mut mail),
                Some(d) => {
                    if self.arrived.wait_until(&mut mail, d).timed_out() {
                        if let Some(msg) = Self::pop(&mut mail, &key) {
                            return Ok(msg);
                        }
                        return Err(HaloError::Timeout {
                            neighbor,
                            waited: started.elapsed(),
                        });
                    }
                }
            }
        }
    }
}

/// In-process communicator: one handle per simulated rank.
#[derive(Clone)]
pub struct LocalComm {
    fabric: Arc<LocalFabric>,
    context: u64,
    members: Arc<[usize]>,
    rank: usize,
}

impl LocalComm {
    pub fn fabric(&self) -> &Arc<LocalFabric> {
        &self.fabric
    }

    /// World rank of local rank `r`.
    fn world_rank(&self, r: usize) -> Result<usize, HaloError> {
        self.members.get(r).copied().ok_or(HaloError::RankOutOfRange {
            rank: r,
            size: self.members.len(),
        })
    }
}

impl std::fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalComm")
            .field("context", &self.context)
            .field("rank", &self.rank)
            .field("members", &self.members)
            .finish()
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.members.len()
    }

    fn sendrecv(&self, peer: usize, tag: CommTag, send: &[u8], recv: &mut [u8]) -> Result<(), HaloError> {
        let me = self.world_rank(self.rank)?;
        let other = self.world_rank(peer)?;
        self.fabric.post(
            (self.context, me, other, tag.as_u16()),
            Bytes::copy_from_slice(send),
        );
        let msg = self.fabric.take((self.context, other, me, tag.as_u16()), peer)?;
        if msg.len() != recv.len() {
            return Err(HaloError::LengthMismatch {
                neighbor: peer,
                expected: recv.len(),
                got: msg.len(),
            });
        }
        recv.copy_from_slice(&msg);
        Ok(())
    }

    fn barrier(&self) {
        let n = self.members.len();
        let barrier = self
            .fabric
            .barriers
            .entry(self.context)
            .or_insert_with(|| Arc::new(Barrier::new(n)))
            .value()
            .clone();
        barrier.wait();
    }

    fn include(&self, members: &[usize]) -> Result<Self, HaloError> {
        let mut world = Vec::with_capacity(members.len());
        for &m in members {
            world.push(self.world_rank(m)?);
        }
        let rank = members
            .iter()
            .position(|&m| m == self.rank)
            .ok_or(HaloError::NotAMember { rank: self.rank })?;

        let mut h = DefaultHasher::new();
        self.context.hash(&mut h);
        world.hash(&mut h);
        // keep clear of the world context
        let context = h.finish() | 1;

        self.fabric.groups_created.fetch_add(1, Ordering::AcqRel);
        Ok(Self {
            fabric: Arc::clone(&self.fabric),
            context,
            members: world.into(),
            rank,
        })
    }

    fn wtime(&self) -> f64 {
        seconds_since_epoch()
    }

    fn abort(&self, status: i32) -> ! {
        log::error!("rank {} aborting local fabric with status {status}", self.rank);
        std::process::exit(status)
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{CommTag, Communicator};
    use crate::halo_error::HaloError;
    use mpi::collective::CommunicatorCollectives;
    use mpi::datatype::Equivalence;
    use mpi::environment::Universe;
    use mpi::point_to_point::send_receive_into_with_tags;
    use mpi::topology::{Communicator as MpiCommunicator, Group, SimpleCommunicator};
    use std::rc::Rc;

    /// MPI communicator; sub-communicators keep the universe alive.
    pub struct MpiComm {
        pub world: SimpleCommunicator,
        rank: usize,
        size: usize,
        _universe: Rc<Universe>,
    }

    impl MpiComm {
        /// Initialize MPI and wrap `MPI_COMM_WORLD`.
        pub fn new() -> Result<Self, HaloError> {
            let universe = mpi::initialize().ok_or_else(|| HaloError::CommError {
                neighbor: 0,
                source: "MPI was already initialized".into(),
            })?;
            let world = universe.world();
            Ok(Self {
                rank: world.rank() as usize,
                size: world.size() as usize,
                world,
                _universe: Rc::new(universe),
            })
        }
    }

    impl Communicator for MpiComm {
        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn sendrecv(&self, peer: usize, tag: CommTag, send: &[u8], recv: &mut [u8]) -> Result<(), HaloError> {
            if peer >= self.size {
                return Err(HaloError::RankOutOfRange {
                    rank: peer,
                    size: self.size,
                });
            }
            let p = self.world.process_at_rank(peer as i32);
            let status = send_receive_into_with_tags(send, &p, tag.as_i32(), recv, &p, tag.as_i32());
            let got = status.count(u8::equivalent_datatype()) as usize;
            if got != recv.len() {
                return Err(HaloError::LengthMismatch {
                    neighbor: peer,
                    expected: recv.len(),
                    got,
                });
            }
            Ok(())
        }

        fn barrier(&self) {
            self.world.barrier();
        }

        fn include(&self, members: &[usize]) -> Result<Self, HaloError> {
            let ranks: Vec<i32> = members.iter().map(|&m| m as i32).collect();
            let group = self.world.group().include(&ranks);
            // group handle is released when `group` drops
            let sub = self
                .world
                .split_by_subgroup_collective(&group)
                .ok_or(HaloError::NotAMember { rank: self.rank })?;
            Ok(Self {
                rank: sub.rank() as usize,
                size: sub.size() as usize,
                world: sub,
                _universe: Rc::clone(&self._universe),
            })
        }

        fn wtime(&self) -> f64 {
            mpi::time()
        }

        fn abort(&self, status: i32) -> ! {
            self.world.abort(status)
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

static_assertions::assert_impl_all!(LocalComm: Send, Sync);
