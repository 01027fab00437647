//! Configuration: parameter input, mesh/block geometry options, and the
//! explicit exchange context that replaces process-wide globals.

pub mod input;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::mesh_error::MeshForestError;
use crate::Real;

pub use input::ParameterInput;

/// Refinement mode of the mesh.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Refinement {
    None,
    Static,
    Adaptive,
}

impl std::str::FromStr for Refinement {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "none" => Ok(Self::None),
            "static" => Ok(Self::Static),
            "adaptive" => Ok(Self::Adaptive),
            other => Err(format!("unknown refinement `{other}`")),
        }
    }
}

/// Physical boundary condition selector for one mesh side.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum BoundaryFlag {
    Outflow,
    Periodic,
    Reflecting,
    User,
}

impl std::str::FromStr for BoundaryFlag {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "outflow" => Ok(Self::Outflow),
            "periodic" => Ok(Self::Periodic),
            "reflecting" => Ok(Self::Reflecting),
            "user" => Ok(Self::User),
            other => Err(format!("unknown boundary flag `{other}`")),
        }
    }
}

/// Mesh-level options from the `mesh` and `meshblock` sections.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct MeshConfig {
    pub refinement: Refinement,
    pub numlevel: i32,
    /// Mesh extents in cells.
    pub nx: [i32; 3],
    /// Block extents in cells; must divide the mesh extents.
    pub block_nx: [i32; 3],
    /// Boundary flags: inner/outer per axis.
    pub bcs: [[BoundaryFlag; 2]; 3],
}

impl MeshConfig {
    /// Read and validate the `mesh` / `meshblock` sections.
    ///
    /// # Errors
    /// `InputValue` for missing or malformed options,
    /// `BlockDoesNotDivideMesh` when the block extents do not tile the mesh.
    pub fn from_input(pin: &ParameterInput) -> Result<Self, MeshForestError> {
        fn enum_value<T: std::str::FromStr<Err = String>>(
            key: &str,
            raw: String,
        ) -> Result<T, MeshForestError> {
            raw.parse().map_err(|msg| MeshForestError::InputValue {
                section: "mesh".into(),
                key: key.into(),
                msg,
            })
        }
        let refinement = enum_value("refinement", pin.get_string("mesh", "refinement")?)?;
        let numlevel = pin.get_integer("mesh", "numlevel")? as i32;
        let axis_int = |section: &str, key: &str| -> Result<i32, MeshForestError> {
            Ok(pin.get_integer(section, key)? as i32)
        };
        let nx = [
            axis_int("mesh", "nx1")?,
            axis_int("mesh", "nx2")?,
            axis_int("mesh", "nx3")?,
        ];
        let block_nx = [
            axis_int("meshblock", "nx1")?,
            axis_int("meshblock", "nx2")?,
            axis_int("meshblock", "nx3")?,
        ];
        for axis in 0..3 {
            if block_nx[axis] <= 0 || nx[axis] % block_nx[axis] != 0 {
                return Err(MeshForestError::BlockDoesNotDivideMesh {
                    axis: axis + 1,
                    mesh: nx[axis],
                    block: block_nx[axis],
                });
            }
        }
        let bc = |key: &str| -> Result<BoundaryFlag, MeshForestError> {
            enum_value(key, pin.get_string("mesh", key)?)
        };
        let bcs = [
            [bc("ix1_bc")?, bc("ox1_bc")?],
            [bc("ix2_bc")?, bc("ox2_bc")?],
            [bc("ix3_bc")?, bc("ox3_bc")?],
        ];
        Ok(Self {
            refinement,
            numlevel,
            nx,
            block_nx,
            bcs,
        })
    }
}

/// Sparse-variable policy.
#[derive(Copy, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct SparseConfig {
    /// Master switch; with sparse disabled, tag bytes are written but
    /// ignored on the receive side.
    pub enabled: bool,
    /// Values with magnitude strictly above this trigger allocation; at or
    /// below are zeros by contract.
    pub allocation_threshold: Real,
    /// Consecutive all-zero sweeps before the deallocation sweep drops a
    /// sparse variable.
    pub deallocation_count: u32,
}

impl Default for SparseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allocation_threshold: 1e-12,
            deallocation_count: 1,
        }
    }
}

/// Process-wide exchange parameters carried explicitly through the API.
#[derive(Clone, Debug)]
pub struct ExchangeContext {
    pub my_rank: usize,
    pub n_ranks: usize,
    pub sparse: SparseConfig,
    /// Wall-clock budget for the receive poll; `None` disables the check.
    pub receive_timeout: Option<Duration>,
}

impl ExchangeContext {
    /// A serial single-rank context with default sparse policy.
    pub fn serial() -> Self {
        Self {
            my_rank: 0,
            n_ranks: 1,
            sparse: SparseConfig::default(),
            receive_timeout: None,
        }
    }

    pub fn with_rank(my_rank: usize, n_ranks: usize) -> Self {
        Self {
            my_rank,
            n_ranks,
            sparse: SparseConfig::default(),
            receive_timeout: None,
        }
    }
}
