//! Filegraph
//!
//! An embedded graph store that keeps every vertex as one JSON line in a
//! single file. Vertices carry an opaque payload and a list of outgoing
//! links; there is no in-memory index, so every read scans the file.
//!
//! # Architecture
//!
//! - `persistence::line_store`: append, scan and atomic rewrite of the backing file
//! - `persistence::queue`: FIFO task queue, one writer in flight per graph
//! - `graph`: vertex CRUD, arcs and edges on top of the two above
//! - `algo`: breadth-first and depth-first traversals
//!
//! Writes never overlap: appends and rewrites from every clone of a
//! [`FileGraph`] go through the same queue. Reads do not queue and see the
//! file either before or after a rewrite, never a partial one.
//!
//! ## Example Usage
//!
//! ```rust
//! use filegraph::{FileGraph, GraphConfig, Vertex};
//! use serde_json::{json, Value};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let dir = tempfile::tempdir()?;
//! let graph = FileGraph::open(GraphConfig::new(dir.path().join("people.jsonl"))).await?;
//!
//! // Create vertices
//! let alice = graph.create_vertex(json!({"name": "Alice"})).await?;
//! let bob = graph.create_vertex(json!({"name": "Bob"})).await?;
//!
//! // Link them
//! graph.create_arc(&alice.id, &bob.id).await?;
//! assert!(graph.has_path(&alice.id, &bob.id).await?);
//! assert!(!graph.has_path(&bob.id, &alice.id).await?);
//!
//! // Walk the neighbourhood
//! let tree = graph.find_up_to_level::<Value>(&alice.id, Some(1)).await?;
//! assert_eq!(tree.len(), 2);
//!
//! // Query by payload
//! let found = graph
//!     .find_one(|v: &Vertex<Value>| v.data["name"] == "Bob")
//!     .await?;
//! assert_eq!(found.map(|v| v.id), Some(bob.id));
//! # Ok(())
//! # }
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod graph;
pub mod persistence;

// Re-export main types for convenience
pub use graph::{
    FileGraph, GraphConfig, GraphError, GraphResult, Vertex, VertexId, VertexPatch, VertexTree,
    VertexUpdate,
};

pub use persistence::{LineStore, QueueError, Rewrite, StorageError, StorageResult, TaskQueue};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
