//! Graph algorithms module
//!
//! Traversals run directly against the backing file through [`FileGraph`](crate::graph::FileGraph):
//! - `find_up_to_level`: breadth-first enumeration with the level of each vertex
//! - `has_path`: depth-first reachability along forward links
//! - `search_vertices_from`: depth-first filter over the reachable set

pub mod traversal;
