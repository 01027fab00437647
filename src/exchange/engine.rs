//! The boundary-exchange pipelines: post receives, pack and send, poll
//! arrivals, set ghost cells.
//!
//! Send-side state machine per (block, variable, neighbor):
//! `Uninitialized → Pending → Filled → Completed`; receive side
//! `Pending → Arrived → Completed`. The pack kernel runs block-parallel and
//! mutates only sender-owned buffers; the notify phase afterwards is serial
//! host code, which is the happens-before edge that lets it write peer
//! receive buffers and start MPI sends safely.
//!
//! Sparse protocol: the trailing tag element of every buffer is 1.0 iff any
//! packed value exceeds the allocation threshold in magnitude. A local
//! sender allocates the peer variable before the deep copy; a cross-rank
//! receiver inspects the tag on arrival. All-zero payloads never allocate,
//! and an allocated receiver of an all-zero payload writes zeros.

use std::collections::HashMap;
use std::time::Instant;

use log::{debug, trace};

use crate::communicator::{exchange_tag, Communicator, PollWait};
use crate::config::ExchangeContext;
use crate::exchange::boundary_info::{build_send_cache, build_set_cache, BoundaryInfo};
use crate::exchange::refinement::{
    AverageRestriction, ConstantProlongation, ProlongationOp, RestrictionOp,
};
use crate::exchange::windows;
use crate::mesh::block::MeshBlock;
use crate::mesh::mesh_data::MeshData;
use crate::mesh::variable::{Metadata, RecvStatus, SendStatus};
use crate::mesh_error::MeshForestError;
use crate::task::TaskStatus;
use crate::Real;

/// Per-exchange communication state: posted receive handles keyed by
/// `(block, variable, buf_id)`, in-flight sends, and the receive-poll clock.
pub struct ExchangeState<C: Communicator> {
    recv_handles: HashMap<(usize, usize, i32), C::RecvHandle>,
    send_handles: Vec<C::SendHandle>,
    recv_started: Option<Instant>,
}

impl<C: Communicator> Default for ExchangeState<C> {
    fn default() -> Self {
        Self {
            recv_handles: HashMap::new(),
            send_handles: Vec::new(),
            recv_started: None,
        }
    }
}

impl<C: Communicator> ExchangeState<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait out any in-flight sends (call between exchanges or at teardown).
    pub fn drain_sends(&mut self) {
        use crate::communicator::Wait;
        for h in self.send_handles.drain(..) {
            let _ = h.wait();
        }
    }
}

/// Post non-blocking receives for every cross-rank entry and reset all
/// receive flags to `Pending`.
///
/// Builds (or reuses) the set-side cache so receive buffers are sized from
/// this rank's own window computation, never from the wire.
///
/// # Errors
/// Cache build errors; `TagCollision` if two posted receives from one peer
/// derive the same tag.
pub fn start_receiving<C: Communicator>(
    md: &mut MeshData,
    ctx: &ExchangeContext,
    comm: &C,
    state: &mut ExchangeState<C>,
) -> Result<TaskStatus, MeshForestError> {
    let entries = md.exchange_entries(false);
    let alloc = md.collect_alloc_status(&entries);
    let stale = md
        .set_cache
        .as_ref()
        .map_or(true, |c| c.is_stale(&alloc));
    if stale {
        md.set_cache = Some(build_set_cache(md, &entries, alloc)?);
    }
    let rows: Vec<_> = md
        .set_cache
        .as_ref()
        .expect("set cache just built")
        .entries
        .iter()
        .map(|r| r.key)
        .collect();
    let mut posted: HashMap<(usize, u16), ()> = HashMap::new();
    for key in rows {
        let nb = md.block(key.block).neighbors()[key.nb].clone();
        md.block_mut(key.block)
            .var_mut(key.var)
            .bd
            .rflag
            .insert(nb.buf_id, RecvStatus::Pending);
        if nb.rank == ctx.my_rank {
            continue;
        }
        let slot = md.fill_ghost_slot(key.block, key.var);
        let tag = exchange_tag(nb.gid, md.block(key.block).gid(), nb.buf_id, slot);
        if posted.insert((nb.rank, tag), ()).is_some() {
            return Err(MeshForestError::TagCollision {
                peer: nb.rank,
                tag,
            });
        }
        let var = md.block_mut(key.block).var_mut(key.var);
        let buf = var
            .bd
            .recv
            .get_mut(&nb.buf_id)
            .expect("recv buffer sized at cache build");
        let template: &mut [u8] = bytemuck::cast_slice_mut(buf.as_mut_slice());
        let handle = comm.irecv(nb.rank, tag, template);
        state
            .recv_handles
            .insert((key.block, key.var, nb.buf_id), handle);
    }
    trace!(
        "posted {} receives on rank {}",
        state.recv_handles.len(),
        ctx.my_rank
    );
    Ok(TaskStatus::Complete)
}

/// Fill and ship every send buffer: reset flags, rebuild the send cache if
/// allocation changed, restrict into coarse buffers, pack (block-parallel),
/// then notify local peers and start cross-rank sends.
///
/// Completes when buffer filling is done and communication is started;
/// same-rank deliveries are finished, cross-rank ones may still be in
/// flight.
pub fn send_boundary_buffers<C: Communicator>(
    md: &mut MeshData,
    ctx: &ExchangeContext,
    comm: &C,
    state: &mut ExchangeState<C>,
) -> Result<TaskStatus, MeshForestError> {
    send_boundary_buffers_with(md, ctx, comm, state, &AverageRestriction)
}

/// [`send_boundary_buffers`] with a caller-chosen restriction operator.
pub fn send_boundary_buffers_with<C: Communicator>(
    md: &mut MeshData,
    ctx: &ExchangeContext,
    comm: &C,
    state: &mut ExchangeState<C>,
    restrict_op: &dyn RestrictionOp,
) -> Result<TaskStatus, MeshForestError> {
    let entries = md.exchange_entries(false);
    for &key in &entries {
        let buf_id = md.block(key.block).neighbors()[key.nb].buf_id;
        md.block_mut(key.block)
            .var_mut(key.var)
            .bd
            .sflag
            .insert(buf_id, SendStatus::Pending);
    }
    let alloc = md.collect_alloc_status(&entries);
    let stale = md
        .send_cache
        .as_ref()
        .map_or(true, |c| c.is_stale(&alloc));
    if stale {
        debug!(
            "rank {}: send cache stale, rebuilding {} entries",
            ctx.my_rank,
            entries.len()
        );
        md.send_cache = Some(build_send_cache(md, &entries, alloc)?);
    }

    run_restriction(md, restrict_op);
    let nonzero = pack_all(md, ctx);
    // pack_all returns only after every block's kernel has run: the fence
    // that orders buffer fills before MPI starts and peer-buffer writes
    send_and_notify(md, ctx, comm, state, &nonzero)?;
    Ok(TaskStatus::Complete)
}

/// Restrict fine data into the coarse buffer for every send entry whose
/// neighbor is coarser. Runs on every send, cached or not; the field data
/// changes between exchanges even when the cache does not.
fn run_restriction(md: &mut MeshData, op: &dyn RestrictionOp) {
    let jobs: Vec<_> = md
        .send_cache
        .as_ref()
        .expect("send cache built")
        .entries
        .iter()
        .filter(|r| r.restriction && r.allocated)
        .map(|r| (r.key, r.windows))
        .collect();
    for (key, win) in jobs {
        let block = md.block_mut(key.block);
        let cellbounds = *block.cellbounds();
        let c_cellbounds = *block.c_cellbounds();
        let (fine, coarse) = block.var_mut(key.var).split_restrict();
        if let (Some(fine), Some(coarse)) = (fine, coarse) {
            op.restrict(fine, coarse, &cellbounds, &c_cellbounds, &win);
        }
    }
}

/// Pack one cache entry into its send buffer; returns the non-zero flag.
fn pack_entry(block: &mut MeshBlock, row: &BoundaryInfo, threshold: Real) -> bool {
    let buf_id = block.neighbors()[row.key.nb].buf_id;
    let (data, coarse, bd) = block.var_mut(row.key.var).split_pack();
    let src = if row.restriction { coarse } else { data };
    let buf = bd
        .send
        .get_mut(&buf_id)
        .expect("send buffer sized at cache build");
    let [ni, nj, nk] = row.extents();
    let w = &row.windows;
    let mut any_nonzero = false;
    for v in 0..row.nv {
        for k in w[2].iter() {
            for j in w[1].iter() {
                for i in w[0].iter() {
                    let val = match (row.allocated, src) {
                        (true, Some(arr)) => {
                            arr[[v, k as usize, j as usize, i as usize]]
                        }
                        _ => 0.0,
                    };
                    let lin = (i - w[0].s) as usize
                        + ni * ((j - w[1].s) as usize
                            + nj * ((k - w[2].s) as usize + nk * v));
                    buf[lin] = val;
                    if val.abs() > threshold {
                        any_nonzero = true;
                    }
                }
            }
        }
    }
    buf[row.nv * ni * nj * nk] = if any_nonzero { 1.0 } else { 0.0 };
    bd.sflag.insert(buf_id, SendStatus::Filled);
    any_nonzero
}

/// The pack kernel over all cache entries, block-parallel under the `rayon`
/// feature. Returns per-entry non-zero flags in cache order.
fn pack_all(md: &mut MeshData, ctx: &ExchangeContext) -> Vec<bool> {
    let cache = md.send_cache.take().expect("send cache built");
    let threshold = ctx.sparse.allocation_threshold;
    let mut per_block: Vec<Vec<usize>> = vec![Vec::new(); md.num_blocks()];
    for (i, row) in cache.entries.iter().enumerate() {
        per_block[row.key.block].push(i);
    }
    let mut nonzero = vec![false; cache.entries.len()];

    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        let flags: Vec<Vec<(usize, bool)>> = md
            .blocks_mut()
            .par_iter_mut()
            .zip(per_block.par_iter())
            .map(|(block, idxs)| {
                idxs.iter()
                    .map(|&i| (i, pack_entry(block, &cache.entries[i], threshold)))
                    .collect()
            })
            .collect();
        for block_flags in flags {
            for (i, f) in block_flags {
                nonzero[i] = f;
            }
        }
    }
    #[cfg(not(feature = "rayon"))]
    {
        for (block, idxs) in md.blocks_mut().iter_mut().zip(per_block.iter()) {
            for &i in idxs {
                nonzero[i] = pack_entry(block, &cache.entries[i], threshold);
            }
        }
    }

    md.send_cache = Some(cache);
    nonzero
}

/// Serial notify phase: local deliveries (with sparse peer allocation) and
/// cross-rank send starts; marks every send `Completed`.
fn send_and_notify<C: Communicator>(
    md: &mut MeshData,
    ctx: &ExchangeContext,
    comm: &C,
    state: &mut ExchangeState<C>,
    nonzero: &[bool],
) -> Result<(), MeshForestError> {
    let keys: Vec<_> = md
        .send_cache
        .as_ref()
        .expect("send cache built")
        .entries
        .iter()
        .map(|r| r.key)
        .collect();
    for (b, key) in keys.into_iter().enumerate() {
        let nb = md.block(key.block).neighbors()[key.nb].clone();
        let sender_gid = md.block(key.block).gid();
        if nb.rank == ctx.my_rank {
            let peer_idx = md.find_block(nb.gid).ok_or(MeshForestError::Comm {
                peer: ctx.my_rank,
                msg: format!("local neighbor gid {} not found", nb.gid),
            })?;
            let label = md.block(key.block).var(key.var).name().to_string();
            debug_assert_eq!(md.block(peer_idx).var(key.var).name(), label);
            let peer_allocated = md.block(peer_idx).var(key.var).is_allocated();
            if ctx.sparse.enabled && !peer_allocated && nonzero[b] {
                trace!(
                    "allocating `{}` on local block {} (non-zero inbound)",
                    label,
                    nb.gid
                );
                md.block_mut(peer_idx).allocate_sparse(&label)?;
            }
            if md.block(peer_idx).var(key.var).is_allocated() {
                let payload = md.block(key.block).var(key.var).bd.send[&nb.buf_id].clone();
                let peer_var = md.block_mut(peer_idx).var_mut(key.var);
                peer_var
                    .bd
                    .ensure_recv(nb.target_id, payload.len())
                    .copy_from_slice(&payload);
            }
            md.block_mut(peer_idx)
                .var_mut(key.var)
                .bd
                .rflag
                .insert(nb.target_id, RecvStatus::Arrived);
        } else {
            let slot = md.fill_ghost_slot(key.block, key.var);
            let tag = exchange_tag(sender_gid, nb.gid, nb.target_id, slot);
            let var = md.block(key.block).var(key.var);
            let bytes: &[u8] = bytemuck::cast_slice(var.bd.send[&nb.buf_id].as_slice());
            state.send_handles.push(comm.isend(nb.rank, tag, bytes));
        }
        md.block_mut(key.block)
            .var_mut(key.var)
            .bd
            .sflag
            .insert(nb.buf_id, SendStatus::Completed);
    }
    Ok(())
}

/// Poll every receive flag. `Incomplete` until all entries have arrived;
/// cross-rank arrivals are copied into the receive buffers and drive the
/// tag-byte sparse allocation.
///
/// # Errors
/// `ReceiveTimeout` past the configured wall-clock budget,
/// `WireSizeMismatch` for short or long messages.
pub fn receive_boundary_buffers<C: Communicator>(
    md: &mut MeshData,
    ctx: &ExchangeContext,
    state: &mut ExchangeState<C>,
) -> Result<TaskStatus, MeshForestError> {
    let started = *state.recv_started.get_or_insert_with(Instant::now);
    let entries = md.exchange_entries(false);
    let expected = entries.len();
    let mut arrived = 0usize;
    for key in entries {
        let nb = md.block(key.block).neighbors()[key.nb].clone();
        let flag = md
            .block(key.block)
            .var(key.var)
            .bd
            .rflag
            .get(&nb.buf_id)
            .copied()
            .unwrap_or(RecvStatus::Pending);
        if flag != RecvStatus::Pending {
            arrived += 1;
            continue;
        }
        if nb.rank == ctx.my_rank {
            // delivered by the local sender's notify phase
            continue;
        }
        let hkey = (key.block, key.var, nb.buf_id);
        let Some(handle) = state.recv_handles.get_mut(&hkey) else {
            return Err(MeshForestError::Comm {
                peer: nb.rank,
                msg: format!("no receive posted for buffer {}", nb.buf_id),
            });
        };
        let Some(bytes) = handle.try_wait() else {
            continue;
        };
        state.recv_handles.remove(&hkey);
        let (tag_byte, was_allocated, label) = {
            let var = md.block_mut(key.block).var_mut(key.var);
            let buf = var
                .bd
                .recv
                .get_mut(&nb.buf_id)
                .expect("recv buffer sized at cache build");
            let expect_bytes = std::mem::size_of_val(buf.as_slice());
            if bytes.len() != expect_bytes {
                return Err(MeshForestError::WireSizeMismatch {
                    peer: nb.rank,
                    expected: expect_bytes,
                    got: bytes.len(),
                });
            }
            bytemuck::cast_slice_mut::<Real, u8>(buf.as_mut_slice())
                .copy_from_slice(&bytes);
            let tag_byte = *buf.last().expect("non-empty buffer");
            (tag_byte, var.is_allocated(), var.name().to_string())
        };
        md.block_mut(key.block)
            .var_mut(key.var)
            .bd
            .rflag
            .insert(nb.buf_id, RecvStatus::Arrived);
        arrived += 1;
        if ctx.sparse.enabled && tag_byte != 0.0 && !was_allocated {
            trace!(
                "allocating `{}` on block {} (non-zero tag from rank {})",
                label,
                md.block(key.block).gid(),
                nb.rank
            );
            md.block_mut(key.block).allocate_sparse(&label)?;
        }
    }
    if arrived == expected {
        state.recv_started = None;
        return Ok(TaskStatus::Complete);
    }
    if let Some(budget) = ctx.receive_timeout {
        let elapsed = started.elapsed();
        if elapsed > budget {
            return Err(MeshForestError::ReceiveTimeout {
                elapsed_secs: elapsed.as_secs_f64(),
                arrived,
                expected,
            });
        }
    }
    Ok(TaskStatus::Incomplete)
}

/// Unpack one entry from its receive buffer through the neighbor frame map.
fn set_entry(block: &mut MeshBlock, row: &BoundaryInfo, sparse_enabled: bool) {
    let nb = block.neighbors()[row.key.nb].clone();
    let (data, coarse, bd) = block.var_mut(row.key.var).split_set();
    let Some(buf) = bd.recv.get(&nb.buf_id) else {
        return;
    };
    let dest = if row.coarse_dest { coarse } else { data };
    let Some(dest) = dest else {
        return;
    };
    let tag_byte = buf[row.buf_len - 1];
    let read_buffer = !sparse_enabled || tag_byte != 0.0;
    let ext_r = row.extents();
    // sender-frame extents under the axis permutation
    let mut ext_s = [0usize; 3];
    for d in 0..3 {
        ext_s[nb.frame.perm[d]] = ext_r[d];
    }
    let w = &row.windows;
    for v in 0..row.nv {
        for k in w[2].iter() {
            for j in w[1].iter() {
                for i in w[0].iter() {
                    let val = if read_buffer {
                        let off_r = [
                            (i - w[0].s) as usize,
                            (j - w[1].s) as usize,
                            (k - w[2].s) as usize,
                        ];
                        let mut off_s = [0usize; 3];
                        for d in 0..3 {
                            off_s[nb.frame.perm[d]] = if nb.frame.sign[d] > 0 {
                                off_r[d]
                            } else {
                                ext_r[d] - 1 - off_r[d]
                            };
                        }
                        buf[off_s[0]
                            + ext_s[0] * (off_s[1] + ext_s[1] * (off_s[2] + ext_s[2] * v))]
                    } else {
                        0.0
                    };
                    dest[[v, k as usize, j as usize, i as usize]] = val;
                }
            }
        }
    }
}

/// Set ghost zones from the arrived receive buffers: rebuild the set cache
/// if allocation changed, run the unpack kernel, mark receives `Completed`.
pub fn set_boundaries(
    md: &mut MeshData,
    ctx: &ExchangeContext,
) -> Result<TaskStatus, MeshForestError> {
    let entries = md.exchange_entries(false);
    let alloc = md.collect_alloc_status(&entries);
    let stale = md
        .set_cache
        .as_ref()
        .map_or(true, |c| c.is_stale(&alloc));
    if stale {
        debug!(
            "rank {}: set cache stale, rebuilding {} entries",
            ctx.my_rank,
            entries.len()
        );
        md.set_cache = Some(build_set_cache(md, &entries, alloc)?);
    }
    let cache = md.set_cache.take().expect("set cache built");
    let mut per_block: Vec<Vec<usize>> = vec![Vec::new(); md.num_blocks()];
    for (i, row) in cache.entries.iter().enumerate() {
        per_block[row.key.block].push(i);
    }
    let sparse_enabled = ctx.sparse.enabled;

    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        md.blocks_mut()
            .par_iter_mut()
            .zip(per_block.par_iter())
            .for_each(|(block, idxs)| {
                for &i in idxs {
                    if cache.entries[i].allocated {
                        set_entry(block, &cache.entries[i], sparse_enabled);
                    }
                }
            });
    }
    #[cfg(not(feature = "rayon"))]
    {
        for (block, idxs) in md.blocks_mut().iter_mut().zip(per_block.iter()) {
            for &i in idxs {
                if cache.entries[i].allocated {
                    set_entry(block, &cache.entries[i], sparse_enabled);
                }
            }
        }
    }

    for row in &cache.entries {
        let buf_id = md.block(row.key.block).neighbors()[row.key.nb].buf_id;
        md.block_mut(row.key.block)
            .var_mut(row.key.var)
            .bd
            .rflag
            .insert(buf_id, RecvStatus::Completed);
    }
    md.set_cache = Some(cache);
    Ok(TaskStatus::Complete)
}

/// Prolongate coarse-buffer ghosts into fine ghost cells for every neighbor
/// coarser than its block. The framework calls this after [`set_boundaries`];
/// it is the post-step the exchange core leaves pluggable.
pub fn prolongate_boundaries(md: &mut MeshData) -> Result<(), MeshForestError> {
    prolongate_boundaries_with(md, &ConstantProlongation)
}

/// [`prolongate_boundaries`] with a caller-chosen operator.
pub fn prolongate_boundaries_with(
    md: &mut MeshData,
    op: &dyn ProlongationOp,
) -> Result<(), MeshForestError> {
    for block in md.blocks_mut() {
        let cellbounds = *block.cellbounds();
        let c_cellbounds = *block.c_cellbounds();
        let g = block.nghost();
        let my_level = block.level();
        let coarse_nbs: Vec<_> = block
            .neighbors()
            .iter()
            .filter(|nb| nb.level < my_level)
            .cloned()
            .collect();
        if coarse_nbs.is_empty() {
            continue;
        }
        for vi in 0..block.vars().len() {
            if !block.var(vi).is_set(Metadata::FILL_GHOST) || !block.var(vi).is_allocated() {
                continue;
            }
            for nb in &coarse_nbs {
                let window = [
                    windows::set_same(nb.ox1, cellbounds.interior(0), g),
                    windows::set_same(nb.ox2, cellbounds.interior(1), g),
                    windows::set_same(nb.ox3, cellbounds.interior(2), g),
                ];
                let (data, coarse, _) = block.var_mut(vi).split_set();
                if let (Some(data), Some(coarse)) = (data, coarse) {
                    op.prolongate(coarse, data, &c_cellbounds, &cellbounds, &window);
                }
            }
        }
    }
    Ok(())
}

/// The deallocation sweep: drop every sparse variable that has stayed at or
/// below the allocation threshold (interior and ghosts) for the configured
/// number of consecutive sweeps. Never called implicitly by the exchange.
/// Returns the number of variables deallocated.
pub fn deallocate_sparse_if_zero(md: &mut MeshData, ctx: &ExchangeContext) -> usize {
    let mut dropped = 0;
    for block in md.blocks_mut() {
        for vi in 0..block.vars().len() {
            if !block.var(vi).is_set(Metadata::SPARSE) || !block.var(vi).is_allocated() {
                continue;
            }
            let all_zero = block.var(vi).is_all_zero(ctx.sparse.allocation_threshold);
            let sweeps = block.var_mut(vi).note_zero_sweep(all_zero);
            if all_zero && sweeps >= ctx.sparse.deallocation_count {
                debug!(
                    "deallocating `{}` on block {} after {} zero sweeps",
                    block.var(vi).name(),
                    block.gid(),
                    sweeps
                );
                block.var_mut(vi).deallocate();
                dropped += 1;
            }
        }
    }
    dropped
}
