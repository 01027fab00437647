//! Mesh topology: logical locations, the forest of faces, and neighbor
//! descriptors.
//!
//! This module answers the question "who is next to whom, and in what
//! frame?". It knows nothing about cell data or communication:
//! - [`location`] identifies a block inside one refinement tree and orders
//!   blocks by Morton key.
//! - [`forest`] composes faces into the macro topology and resolves
//!   same-level, finer, and coarser neighbors across face edges with
//!   arbitrary relative orientation.
//! - [`neighbor`] is the descriptor the exchange layer consumes: offsets,
//!   fine indices, deterministic buffer slots, and the inter-frame axis map.

pub mod cache;
pub mod forest;
pub mod location;
pub mod neighbor;
