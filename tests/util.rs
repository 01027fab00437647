//! Shared helpers for the integration tests.
#![allow(dead_code)]

use mesh_forest::prelude::*;
use mesh_forest::mesh_error::MeshForestError;

/// Build `n` unit faces in a row, aligned, each holding one root block owned
/// by `ranks[i]`. With `periodic` the last face's east edge meets the first
/// face's west edge.
pub fn row_forest(ranks: &[usize], periodic: bool) -> (Forest, Vec<FaceId>) {
    let n = ranks.len();
    let mut forest = Forest::new(2);
    let mut lo = Vec::new();
    let mut hi = Vec::new();
    let ncols = if periodic { n } else { n + 1 };
    for i in 0..ncols {
        lo.push(forest.add_node([i as Real, 0.0]));
        hi.push(forest.add_node([i as Real, 1.0]));
    }
    let mut faces = Vec::new();
    for i in 0..n {
        let j = (i + 1) % ncols;
        let f = forest.add_face([lo[i], lo[j], hi[i], hi[j]]).unwrap();
        forest
            .add_block(f, LogicalLocation::root(), i as u64, ranks[i])
            .unwrap();
        faces.push(f);
    }
    (forest, faces)
}

/// MeshData for one rank over `forest`, one dense FillGhost field "rho" and
/// one sparse FillGhost field "s".
pub fn standard_mesh_data(
    forest: &Forest,
    my_rank: usize,
    nx: [i32; 3],
    ng: i32,
) -> Result<MeshData, MeshForestError> {
    let mut md = MeshData::from_forest(forest, my_rank, nx, ng)?;
    for block in md.blocks_mut() {
        block.add_field("rho", Metadata::FILL_GHOST | Metadata::INDEPENDENT, 1, 0.0);
        block.add_field(
            "s",
            Metadata::FILL_GHOST | Metadata::SPARSE | Metadata::INDEPENDENT,
            1,
            0.0,
        );
    }
    Ok(md)
}

/// Set every interior cell of `(block, var)` from `f(i_off, j_off)` where the
/// offsets are zero-based interior coordinates.
pub fn fill_interior(md: &mut MeshData, block: usize, var: usize, f: impl Fn(i32, i32) -> Real) {
    let shape = *md.block(block).cellbounds();
    let arr = md
        .block_mut(block)
        .var_mut(var)
        .data_mut()
        .expect("variable allocated");
    for k in shape.interior(2).iter() {
        for j in shape.interior(1).iter() {
            for i in shape.interior(0).iter() {
                arr[[
                    0,
                    k as usize,
                    j as usize,
                    i as usize,
                ]] = f(i - shape.interior(0).s, j - shape.interior(1).s);
            }
        }
    }
}

/// One full local exchange round with `NoComm` (all neighbors on-rank).
pub fn exchange_local(md: &mut MeshData, ctx: &ExchangeContext) -> Result<(), MeshForestError> {
    let comm = NoComm;
    let mut state = ExchangeState::<NoComm>::new();
    start_receiving(md, ctx, &comm, &mut state)?;
    send_boundary_buffers(md, ctx, &comm, &mut state)?;
    loop {
        if receive_boundary_buffers(md, ctx, &mut state)? == TaskStatus::Complete {
            break;
        }
    }
    set_boundaries(md, ctx)?;
    Ok(())
}

/// One full exchange round over a communicator (used by the thread-rank
/// tests).
pub fn exchange_with<C: Communicator>(
    md: &mut MeshData,
    ctx: &ExchangeContext,
    comm: &C,
    state: &mut ExchangeState<C>,
) -> Result<(), MeshForestError> {
    start_receiving(md, ctx, comm, state)?;
    send_boundary_buffers(md, ctx, comm, state)?;
    loop {
        if receive_boundary_buffers(md, ctx, state)? == TaskStatus::Complete {
            break;
        }
    }
    set_boundaries(md, ctx)?;
    state.drain_sends();
    Ok(())
}

/// Collect the ghost strip of `(block, var)` on the side `ox1` as
/// `(j_offset, i_offset) -> value`, interior rows only.
pub fn ghost_strip(md: &MeshData, block: usize, var: usize, ox1: i32) -> Vec<Vec<Real>> {
    let shape = *md.block(block).cellbounds();
    let g = shape.ng();
    let int0 = shape.interior(0);
    let irange = if ox1 > 0 {
        IndexRange::new(int0.e + 1, int0.e + g)
    } else {
        IndexRange::new(int0.s - g, int0.s - 1)
    };
    let arr = md.block(block).var(var).data().expect("allocated");
    shape
        .interior(1)
        .iter()
        .map(|j| {
            irange
                .iter()
                .map(|i| arr[[0, 0, j as usize, i as usize]])
                .collect()
        })
        .collect()
}
