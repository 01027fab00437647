//! Sparse allocation protocol over a two-block row.

mod util;

use mesh_forest::prelude::*;
use util::*;

fn two_blocks() -> (MeshData, ExchangeContext) {
    let (forest, _) = row_forest(&[0, 0], false);
    let md = standard_mesh_data(&forest, 0, [4, 4, 1], 2).unwrap();
    let mut ctx = ExchangeContext::serial();
    ctx.sparse.allocation_threshold = 1e-6;
    (md, ctx)
}

const S: usize = 1; // the sparse variable's index

#[test]
fn nonzero_send_allocates_the_receiver() {
    let (mut md, ctx) = two_blocks();
    md.block_mut(0).allocate_sparse("s").unwrap();
    fill_interior(&mut md, 0, S, |_, _| 1e-3);
    assert!(!md.block(1).var(S).is_allocated());

    exchange_local(&mut md, &ctx).unwrap();

    // P1: the receiver is allocated and its facing ghosts carry the data
    assert!(md.block(1).var(S).is_allocated());
    for row in ghost_strip(&md, 1, S, -1) {
        assert_eq!(row, vec![1e-3, 1e-3]);
    }
    // interior stays at the fill default
    let arr = md.block(1).var(S).data().unwrap();
    assert_eq!(arr[[0, 0, 3, 3]], 0.0);
}

#[test]
fn all_zero_send_does_not_allocate() {
    let (mut md, ctx) = two_blocks();
    md.block_mut(0).allocate_sparse("s").unwrap();
    // explicit zeros; at-threshold values count as zero by contract
    fill_interior(&mut md, 0, S, |_, _| 0.0);

    exchange_local(&mut md, &ctx).unwrap();

    // P2: the receiver stays unallocated, and the sender's tag reads 0
    assert!(!md.block(1).var(S).is_allocated());
    let east = buffer_id(1, 0, 0, 0, 0);
    let buf = &md.block(0).var(S).bd.send[&east];
    assert_eq!(*buf.last().unwrap(), 0.0);
}

#[test]
fn at_threshold_values_are_zeros_by_contract() {
    let (mut md, ctx) = two_blocks();
    md.block_mut(0).allocate_sparse("s").unwrap();
    fill_interior(&mut md, 0, S, |_, _| 1e-6); // exactly the threshold

    exchange_local(&mut md, &ctx).unwrap();
    assert!(!md.block(1).var(S).is_allocated());
}

#[test]
fn allocated_receiver_of_zeros_gets_zero_ghosts() {
    let (mut md, ctx) = two_blocks();
    md.block_mut(0).allocate_sparse("s").unwrap();
    md.block_mut(1).allocate_sparse("s").unwrap();
    fill_interior(&mut md, 0, S, |_, _| 0.0);
    // dirty the receiver's ghost region so the zero-write is observable
    md.block_mut(1)
        .var_mut(S)
        .data_mut()
        .unwrap()
        .fill(7.0);

    exchange_local(&mut md, &ctx).unwrap();

    // P3: ghosts zeroed, allocation kept
    assert!(md.block(1).var(S).is_allocated());
    for row in ghost_strip(&md, 1, S, -1) {
        assert_eq!(row, vec![0.0, 0.0]);
    }
}

#[test]
fn deallocate_then_exchange_rebuilds_and_reallocates() {
    // scenario: both allocated, exchange, deallocate on the receiver, then
    // exchange again; the cache rebuild must follow the allocation bits
    let (mut md, ctx) = two_blocks();
    md.block_mut(0).allocate_sparse("s").unwrap();
    md.block_mut(1).allocate_sparse("s").unwrap();
    fill_interior(&mut md, 0, S, |_, _| 2.5);
    exchange_local(&mut md, &ctx).unwrap();
    for row in ghost_strip(&md, 1, S, -1) {
        assert_eq!(row, vec![2.5, 2.5]);
    }

    md.block_mut(1).deallocate_sparse("s").unwrap();
    exchange_local(&mut md, &ctx).unwrap();
    // non-zero sender reallocates (as in the fresh-allocation scenario)
    assert!(md.block(1).var(S).is_allocated());
    for row in ghost_strip(&md, 1, S, -1) {
        assert_eq!(row, vec![2.5, 2.5]);
    }

    // and with a zero sender the deallocated receiver stays empty
    md.block_mut(1).deallocate_sparse("s").unwrap();
    fill_interior(&mut md, 0, S, |_, _| 0.0);
    exchange_local(&mut md, &ctx).unwrap();
    assert!(!md.block(1).var(S).is_allocated());
}

#[test]
fn deallocation_sweep_drops_zero_variables() {
    let (mut md, mut ctx) = two_blocks();
    ctx.sparse.deallocation_count = 2;
    md.block_mut(0).allocate_sparse("s").unwrap();
    fill_interior(&mut md, 0, S, |_, _| 0.0);

    assert_eq!(deallocate_sparse_if_zero(&mut md, &ctx), 0);
    assert!(md.block(0).var(S).is_allocated());
    assert_eq!(deallocate_sparse_if_zero(&mut md, &ctx), 1);
    assert!(!md.block(0).var(S).is_allocated());

    // a non-zero value resets the counter
    md.block_mut(0).allocate_sparse("s").unwrap();
    fill_interior(&mut md, 0, S, |_, _| 1.0);
    assert_eq!(deallocate_sparse_if_zero(&mut md, &ctx), 0);
    fill_interior(&mut md, 0, S, |_, _| 0.0);
    assert_eq!(deallocate_sparse_if_zero(&mut md, &ctx), 0);
    assert_eq!(deallocate_sparse_if_zero(&mut md, &ctx), 1);
}
