//! Ghost-zone boundary exchange: index windows, the memoized buffer cache,
//! restriction/prolongation, and the send/receive/set pipelines.

pub mod boundary_info;
pub mod engine;
pub mod refinement;
pub mod windows;
