//! Refinement tagging: the per-block decision a refinement criterion feeds
//! back to the mesh.

use crate::mesh::block::MeshBlock;
use crate::Real;

/// What a refinement criterion wants done with a block.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AmrTag {
    Derefine,
    Same,
    Refine,
}

/// Min/max refinement criterion over the listed variables.
///
/// Unallocated variables contribute nothing; a block where every listed
/// variable is unallocated reads as all-zero and tags `Derefine`. Ghost
/// cells participate, so the tag reacts to approaching features before they
/// enter the interior.
pub fn check_refinement(
    block: &MeshBlock,
    labels: &[&str],
    refine_tol: Real,
    derefine_tol: Real,
) -> AmrTag {
    let mut min_val = Real::INFINITY;
    let mut max_val = Real::NEG_INFINITY;
    for &label in labels {
        let Some(vi) = block.var_index(label) else {
            continue;
        };
        if let Some(arr) = block.var(vi).data() {
            for &v in arr.iter() {
                min_val = min_val.min(v);
                max_val = max_val.max(v);
            }
        } else {
            min_val = min_val.min(0.0);
            max_val = max_val.max(0.0);
        }
    }
    if max_val > refine_tol && min_val < derefine_tol {
        return AmrTag::Refine;
    }
    if max_val < derefine_tol {
        return AmrTag::Derefine;
    }
    AmrTag::Same
}
