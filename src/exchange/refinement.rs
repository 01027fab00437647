//! Restriction and prolongation across refinement levels.
//!
//! Both operators are pluggable; the defaults are the lowest-order choices
//! (cell average down, piecewise-constant up). The index contracts are what
//! the exchange relies on: restriction must fill exactly the coarse-buffer
//! window it is handed, prolongation must read only coarse cells whose
//! support covers the fine ghost cell.

use ndarray::Array4;

use crate::mesh::bounds::{IndexRange, IndexShape};
use crate::Real;

/// Fine-to-coarse transfer into the coarse buffer.
pub trait RestrictionOp {
    /// Fill `coarse` over `window` (coarse-buffer indices, inclusive) from
    /// `fine`. Every coarse cell in the window covers `2^d` fine interior
    /// cells.
    fn restrict(
        &self,
        fine: &Array4<Real>,
        coarse: &mut Array4<Real>,
        fine_shape: &IndexShape,
        coarse_shape: &IndexShape,
        window: &[IndexRange; 3],
    );
}

/// Coarse-to-fine transfer from the coarse buffer into fine ghost cells.
pub trait ProlongationOp {
    /// Fill `fine` over `window` (fine indices, inclusive) from `coarse`.
    fn prolongate(
        &self,
        coarse: &Array4<Real>,
        fine: &mut Array4<Real>,
        coarse_shape: &IndexShape,
        fine_shape: &IndexShape,
        window: &[IndexRange; 3],
    );
}

/// Conservative cell-average restriction.
#[derive(Copy, Clone, Debug, Default)]
pub struct AverageRestriction;

impl RestrictionOp for AverageRestriction {
    fn restrict(
        &self,
        fine: &Array4<Real>,
        coarse: &mut Array4<Real>,
        fine_shape: &IndexShape,
        coarse_shape: &IndexShape,
        window: &[IndexRange; 3],
    ) {
        let nv = coarse.dim().0;
        let fs = [
            fine_shape.interior(0).s,
            fine_shape.interior(1).s,
            fine_shape.interior(2).s,
        ];
        let cs = [
            coarse_shape.interior(0).s,
            coarse_shape.interior(1).s,
            coarse_shape.interior(2).s,
        ];
        // doubling only on non-trivial axes
        let active = [
            fine_shape.nx(0) > 1,
            fine_shape.nx(1) > 1,
            fine_shape.nx(2) > 1,
        ];
        let span = |axis: usize| if active[axis] { 2i32 } else { 1 };
        let weight = 1.0 / (span(0) * span(1) * span(2)) as Real;
        for v in 0..nv {
            for ck in window[2].iter() {
                for cj in window[1].iter() {
                    for ci in window[0].iter() {
                        let f0 = [
                            fs[0] + if active[0] { 2 * (ci - cs[0]) } else { 0 },
                            fs[1] + if active[1] { 2 * (cj - cs[1]) } else { 0 },
                            fs[2] + if active[2] { 2 * (ck - cs[2]) } else { 0 },
                        ];
                        let mut sum = 0.0;
                        for dk in 0..span(2) {
                            for dj in 0..span(1) {
                                for di in 0..span(0) {
                                    sum += fine[[
                                        v,
                                        (f0[2] + dk) as usize,
                                        (f0[1] + dj) as usize,
                                        (f0[0] + di) as usize,
                                    ]];
                                }
                            }
                        }
                        coarse[[v, ck as usize, cj as usize, ci as usize]] = sum * weight;
                    }
                }
            }
        }
    }
}

/// Piecewise-constant (injection) prolongation.
#[derive(Copy, Clone, Debug, Default)]
pub struct ConstantProlongation;

impl ProlongationOp for ConstantProlongation {
    fn prolongate(
        &self,
        coarse: &Array4<Real>,
        fine: &mut Array4<Real>,
        coarse_shape: &IndexShape,
        fine_shape: &IndexShape,
        window: &[IndexRange; 3],
    ) {
        let nv = fine.dim().0;
        let fs = [
            fine_shape.interior(0).s,
            fine_shape.interior(1).s,
            fine_shape.interior(2).s,
        ];
        let cs = [
            coarse_shape.interior(0).s,
            coarse_shape.interior(1).s,
            coarse_shape.interior(2).s,
        ];
        let active = [
            fine_shape.nx(0) > 1,
            fine_shape.nx(1) > 1,
            fine_shape.nx(2) > 1,
        ];
        let to_coarse = |axis: usize, f: i32| {
            if active[axis] {
                cs[axis] + (f - fs[axis]).div_euclid(2)
            } else {
                0
            }
        };
        for v in 0..nv {
            for k in window[2].iter() {
                for j in window[1].iter() {
                    for i in window[0].iter() {
                        let (ck, cj, ci) = (to_coarse(2, k), to_coarse(1, j), to_coarse(0, i));
                        fine[[v, k as usize, j as usize, i as usize]] =
                            coarse[[v, ck as usize, cj as usize, ci as usize]];
                    }
                }
            }
        }
    }
}
