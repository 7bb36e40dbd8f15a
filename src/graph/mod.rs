//! Static room graph.
//!
//! This module provides:
//! - Room, exit and direction value types
//! - The immutable graph store with label and adjacency indexes

mod model;
mod store;

pub use model::{DANGEROUS_LEVEL, Direction, RoomEdge, RoomId, RoomNode};
pub use store::Graph;
