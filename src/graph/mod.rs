//! Core graph implementation
//!
//! This module implements the file-backed graph model with:
//! - Vertices holding an opaque JSON payload and an ordered list of outgoing links
//! - Directed arcs and undirected edges expressed as mutual links
//! - Writers serialized through a single task queue per graph

pub mod config;
pub mod edge;
pub mod store;
pub mod types;
pub mod vertex;

// Re-export main types
pub use config::GraphConfig;
pub use store::{FileGraph, GraphError, GraphResult};
pub use types::VertexId;
pub use vertex::{Vertex, VertexPatch, VertexTree, VertexUpdate};
