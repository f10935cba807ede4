//! CPU-side mesh topology.
//!
//! Everything here runs once at construction time; the results are uploaded by
//! the scene store and never recomputed.

mod adjacency;
mod one_ring;

pub use adjacency::{FaceRange, VertexAdjacency};
pub use one_ring::one_ring;

pub(crate) use adjacency::checked_triangles;
