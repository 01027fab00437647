//! Checkpoint records: per-variable dense interior data, ghost-free.
//!
//! A record carries `(block gid, variable name, allocated bit, interior
//! data)` with `i` fastest, then `j`, `k`, `v` — the same layout as the
//! on-wire buffers. Unallocated sparse variables persist as an empty record
//! and restore to the unallocated state.

use serde::{Deserialize, Serialize};

use crate::mesh::block::MeshBlock;
use crate::mesh_error::MeshForestError;
use crate::Real;

/// One variable on one block, as persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariableRecord {
    pub block_gid: u64,
    pub name: String,
    pub allocated: bool,
    pub nv: usize,
    /// Interior extents (nx1, nx2, nx3).
    pub nx: [i32; 3],
    /// Dense interior values, empty when unallocated.
    pub data: Vec<Real>,
}

/// Snapshot every variable of `block` into records.
pub fn checkpoint_block(block: &MeshBlock) -> Vec<VariableRecord> {
    let shape = block.cellbounds();
    let nx = [shape.nx(0), shape.nx(1), shape.nx(2)];
    block
        .vars()
        .iter()
        .map(|var| {
            let mut data = Vec::new();
            if let Some(arr) = var.data() {
                data.reserve(var.nv() * (nx[0] * nx[1] * nx[2]) as usize);
                for v in 0..var.nv() {
                    for k in shape.interior(2).iter() {
                        for j in shape.interior(1).iter() {
                            for i in shape.interior(0).iter() {
                                data.push(arr[[v, k as usize, j as usize, i as usize]]);
                            }
                        }
                    }
                }
            }
            VariableRecord {
                block_gid: block.gid(),
                name: var.name().to_string(),
                allocated: var.is_allocated(),
                nv: var.nv(),
                nx,
                data,
            }
        })
        .collect()
}

/// Restore one record into `block`, honoring the allocated bit. Ghost zones
/// are left for the next exchange to fill.
///
/// # Errors
/// `CheckpointMismatch` when gid, name, extents, or component count do not
/// match the receiving block; `UnknownVariable` if the name is absent.
pub fn restore_variable(
    block: &mut MeshBlock,
    record: &VariableRecord,
) -> Result<(), MeshForestError> {
    let mismatch = |msg: String| MeshForestError::CheckpointMismatch {
        gid: record.block_gid,
        name: record.name.clone(),
        msg,
    };
    if record.block_gid != block.gid() {
        return Err(mismatch(format!("record is for block {}", record.block_gid)));
    }
    let vi = block
        .var_index(&record.name)
        .ok_or_else(|| MeshForestError::UnknownVariable(record.name.clone()))?;
    let shape = *block.cellbounds();
    let nx = [shape.nx(0), shape.nx(1), shape.nx(2)];
    if record.nx != nx || record.nv != block.var(vi).nv() {
        return Err(mismatch(format!(
            "shape mismatch: record {:?}x{}, block {:?}x{}",
            record.nx,
            record.nv,
            nx,
            block.var(vi).nv()
        )));
    }
    if !record.allocated {
        let name = record.name.clone();
        block.deallocate_sparse(&name)?;
        return Ok(());
    }
    let expected = record.nv * (nx[0] * nx[1] * nx[2]) as usize;
    if record.data.len() != expected {
        return Err(mismatch(format!(
            "data length {} != {}",
            record.data.len(),
            expected
        )));
    }
    {
        let name = record.name.clone();
        block.allocate_sparse(&name)?;
    }
    let arr = block.var_mut(vi).data_mut().expect("just allocated");
    let mut cursor = 0;
    for v in 0..record.nv {
        for k in shape.interior(2).iter() {
            for j in shape.interior(1).iter() {
                for i in shape.interior(0).iter() {
                    arr[[v, k as usize, j as usize, i as usize]] = record.data[cursor];
                    cursor += 1;
                }
            }
        }
    }
    Ok(())
}
