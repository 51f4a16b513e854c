//! Halo exchange engine.
//!
//! For one field and one level, every cap walks its passes in sequence order:
//! gather the pass's values into a send buffer, swap it with the neighbor in a
//! single combined send-receive, then add what came back onto the local slots.
//! Passes never run out of order or concurrently: a corner node picks up its
//! diagonal neighbors' contributions only through the partial sums carried by
//! the earlier passes.
//!
//! Buffers live for one pass. Any transport error ends the sequence
//! immediately and the field must be treated as lost.

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::passes::{CapPasses, CommunicationPass, Pass, SurfacePass, SurfacePassTable, VolumePassTable};
use crate::algs::wire::{HaloScalar, cast_slice, cast_slice_mut, zeroed_buffer};
use crate::halo_error::HaloError;

/// Tag of every exchange message, send and receive alike.
pub const EXCHANGE_TAG: CommTag = CommTag::new(1);

fn check_caps<P, T>(caps: &[CapPasses<P>], fields: &[Vec<T>]) -> Result<(), HaloError> {
    if caps.len() != fields.len() {
        return Err(HaloError::CapCountMismatch {
            expected: caps.len(),
            got: fields.len(),
        });
    }
    Ok(())
}

fn check_indices(indices: &[usize], len: usize) -> Result<(), HaloError> {
    match indices.iter().find(|&&i| i >= len) {
        Some(&index) => Err(HaloError::FieldTooShort { index, len }),
        None => Ok(()),
    }
}

fn swap_with<C, T>(comm: &C, neighbor: usize, send: &[T], recv: &mut [T]) -> Result<(), HaloError>
where
    C: Communicator,
    T: HaloScalar,
{
    comm.sendrecv(neighbor, EXCHANGE_TAG, cast_slice(send), cast_slice_mut(recv))
}

/// Run one field through the pass sequence of every cap, reading the pass's
/// index list through `indices`.
fn exchange_with<C, P, T>(
    comm: &C,
    caps: &[CapPasses<P>],
    fields: &mut [Vec<T>],
    indices: impl Fn(&P) -> &[usize],
) -> Result<(), HaloError>
where
    C: Communicator,
    P: Pass,
    T: HaloScalar,
{
    check_caps(caps, fields)?;
    for (cap, field) in caps.iter().zip(fields.iter()) {
        for pass in &cap.passes {
            check_indices(indices(pass), field.len())?;
        }
    }

    for (cap, field) in caps.iter().zip(fields.iter_mut()) {
        for pass in &cap.passes {
            let idx = indices(pass);
            let mut send = zeroed_buffer::<T>(idx.len())?;
            let mut recv = zeroed_buffer::<T>(idx.len())?;
            for (slot, &i) in send.iter_mut().zip(idx) {
                *slot = field[i];
            }
            swap_with(comm, pass.neighbor(), &send, &mut recv)?;
            for (&i, &v) in idx.iter().zip(&recv) {
                field[i] += v;
            }
            log::debug!(
                "rank {}: pass {} {:?} <-> rank {}, {} {} values",
                comm.rank(),
                pass.seq(),
                pass.face(),
                pass.neighbor(),
                idx.len(),
                T::NAME
            );
        }
    }
    Ok(())
}

/// Accumulate a nodal field over every pass of `lev`.
pub fn exchange_node<C, T>(
    comm: &C,
    table: &VolumePassTable,
    lev: usize,
    fields: &mut [Vec<T>],
) -> Result<(), HaloError>
where
    C: Communicator,
    T: HaloScalar,
{
    exchange_with(comm, table.level(lev)?, fields, |p: &CommunicationPass| p.nodes.as_slice())
}

/// Accumulate an equation-indexed field over every pass of `lev`.
pub fn exchange_id<C, T>(
    comm: &C,
    table: &VolumePassTable,
    lev: usize,
    fields: &mut [Vec<T>],
) -> Result<(), HaloError>
where
    C: Communicator,
    T: HaloScalar,
{
    exchange_with(comm, table.level(lev)?, fields, |p: &CommunicationPass| p.equations.as_slice())
}

/// Accumulate two surface fields over the horizontal passes of `lev`,
/// sending both in one message per pass.
pub fn exchange_snode<C, T>(
    comm: &C,
    table: &SurfacePassTable,
    lev: usize,
    first: &mut [Vec<T>],
    second: &mut [Vec<T>],
) -> Result<(), HaloError>
where
    C: Communicator,
    T: HaloScalar,
{
    let caps = table.level(lev)?;
    check_caps(caps, first)?;
    check_caps(caps, second)?;
    for ((cap, a), b) in caps.iter().zip(first.iter()).zip(second.iter()) {
        for pass in &cap.passes {
            check_indices(&pass.nodes, a.len())?;
            check_indices(&pass.nodes, b.len())?;
        }
    }

    for ((cap, a), b) in caps.iter().zip(first.iter_mut()).zip(second.iter_mut()) {
        for pass in &cap.passes {
            exchange_pair(comm, pass, a, b)?;
        }
    }
    Ok(())
}

fn exchange_pair<C, T>(comm: &C, pass: &SurfacePass, a: &mut [T], b: &mut [T]) -> Result<(), HaloError>
where
    C: Communicator,
    T: HaloScalar,
{
    let n = pass.nodes.len();
    let mut send = zeroed_buffer::<T>(2 * n)?;
    let mut recv = zeroed_buffer::<T>(2 * n)?;
    let (lo, hi) = send.split_at_mut(n);
    for ((s1, s2), &i) in lo.iter_mut().zip(hi.iter_mut()).zip(&pass.nodes) {
        *s1 = a[i];
        *s2 = b[i];
    }
    swap_with(comm, pass.neighbor, &send, &mut recv)?;
    let (r1, r2) = recv.split_at(n);
    for ((&i, &v1), &v2) in pass.nodes.iter().zip(r1).zip(r2) {
        a[i] += v1;
        b[i] += v2;
    }
    log::debug!(
        "rank {}: surface pass {} {:?} <-> rank {}, 2x{} {} values",
        comm.rank(),
        pass.seq,
        pass.face,
        pass.neighbor,
        n,
        T::NAME
    );
    Ok(())
}

pub fn exchange_node_d<C: Communicator>(
    comm: &C,
    table: &VolumePassTable,
    lev: usize,
    fields: &mut [Vec<f64>],
) -> Result<(), HaloError> {
    exchange_node(comm, table, lev, fields)
}

pub fn exchange_node_f<C: Communicator>(
    comm: &C,
    table: &VolumePassTable,
    lev: usize,
    fields: &mut [Vec<f32>],
) -> Result<(), HaloError> {
    exchange_node(comm, table, lev, fields)
}

pub fn exchange_id_d<C: Communicator>(
    comm: &C,
    table: &VolumePassTable,
    lev: usize,
    fields: &mut [Vec<f64>],
) -> Result<(), HaloError> {
    exchange_id(comm, table, lev, fields)
}

pub fn exchange_snode_f<C: Communicator>(
    comm: &C,
    table: &SurfacePassTable,
    lev: usize,
    first: &mut [Vec<f32>],
    second: &mut [Vec<f32>],
) -> Result<(), HaloError> {
    exchange_snode(comm, table, lev, first, second)
}
