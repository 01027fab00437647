//! Field update helpers over the independent state vector.

use crate::mesh::mesh_data::MeshData;
use crate::mesh::variable::Metadata;
use crate::mesh_error::MeshForestError;
use crate::Real;

fn zip_independent(
    target: &mut MeshData,
    source: &MeshData,
    mut f: impl FnMut(&mut Real, Real),
) -> Result<(), MeshForestError> {
    debug_assert_eq!(target.num_blocks(), source.num_blocks());
    for bi in 0..target.num_blocks() {
        for vi in 0..target.block(bi).vars().len() {
            if !target.block(bi).var(vi).is_set(Metadata::INDEPENDENT) {
                continue;
            }
            let src = source.block(bi).var(vi);
            if !src.is_allocated() {
                continue;
            }
            // the source drives allocation on the target
            if !target.block(bi).var(vi).is_allocated() {
                let label = src.name().to_string();
                target.block_mut(bi).allocate_sparse(&label)?;
            }
            let src = source.block(bi).var(vi).data().expect("checked").clone();
            let dst = target
                .block_mut(bi)
                .var_mut(vi)
                .data_mut()
                .expect("allocated above");
            for (d, s) in dst.iter_mut().zip(src.iter()) {
                f(d, *s);
            }
        }
    }
    Ok(())
}

/// `out = in + dt * dudt` over every `Independent` variable.
///
/// # Errors
/// `UnknownVariable` if the containers disagree on variable layout.
pub fn update_independent_data(
    input: &MeshData,
    dudt: &MeshData,
    dt: Real,
    out: &mut MeshData,
) -> Result<(), MeshForestError> {
    zip_independent(out, input, |o, i| *o = i)?;
    zip_independent(out, dudt, |o, d| *o += dt * d)
}

/// `c1 = wgt * c1 + (1 - wgt) * c2` over every `Independent` variable.
///
/// # Errors
/// `UnknownVariable` if the containers disagree on variable layout.
pub fn average_independent_data(
    c1: &mut MeshData,
    c2: &MeshData,
    wgt: Real,
) -> Result<(), MeshForestError> {
    zip_independent(c1, c2, |a, b| *a = wgt * *a + (1.0 - wgt) * b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::block::MeshBlock;
    use crate::topology::forest::FaceId;
    use crate::topology::location::LogicalLocation;

    fn data(val: Real) -> MeshData {
        let mut b = MeshBlock::new(0, 0, FaceId(0), LogicalLocation::root(), [4, 4, 1], 2);
        b.add_field(
            "u",
            Metadata::FILL_GHOST | Metadata::INDEPENDENT,
            1,
            0.0,
        );
        b.add_field("aux", Metadata::FILL_GHOST, 1, 0.0);
        let mut md = MeshData::new(vec![b]);
        md.block_mut(0)
            .var_mut(0)
            .data_mut()
            .unwrap()
            .fill(val);
        md.block_mut(0)
            .var_mut(1)
            .data_mut()
            .unwrap()
            .fill(val);
        md
    }

    #[test]
    fn update_applies_dt_scaled_derivative() {
        let base = data(1.0);
        let dudt = data(2.0);
        let mut out = data(0.0);
        update_independent_data(&base, &dudt, 0.5, &mut out).unwrap();
        assert_eq!(out.block(0).var(0).data().unwrap()[[0, 0, 3, 3]], 2.0);
        // non-independent variables are untouched
        assert_eq!(out.block(0).var(1).data().unwrap()[[0, 0, 3, 3]], 0.0);
    }

    #[test]
    fn average_blends() {
        let mut c1 = data(4.0);
        let c2 = data(0.0);
        average_independent_data(&mut c1, &c2, 0.25).unwrap();
        assert_eq!(c1.block(0).var(0).data().unwrap()[[0, 0, 2, 2]], 1.0);
    }
}
