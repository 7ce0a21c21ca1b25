//! Vertex model and update descriptors
//!
//! A vertex is an id, an arbitrary serde payload and an ordered list of
//! outgoing links. Updates are described by [`VertexUpdate`] and resolved by
//! the line store's rewrite pass.

use super::types::VertexId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// A vertex in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex<T> {
    /// Immutable identifier
    pub id: VertexId,

    /// Caller-defined payload
    pub data: T,

    /// Outgoing links, without duplicates, in insertion order
    #[serde(default)]
    pub links: Vec<VertexId>,
}

impl<T> Vertex<T> {
    /// Create a vertex with a freshly generated id and no links
    pub fn new(data: T) -> Self {
        Vertex {
            id: VertexId::generate(),
            data,
            links: Vec::new(),
        }
    }

    /// Check whether this vertex links to `target`
    pub fn has_link(&self, target: &VertexId) -> bool {
        self.links.contains(target)
    }

    /// Append a link if absent. Returns true if the list changed.
    pub fn add_link(&mut self, target: &VertexId) -> bool {
        if self.has_link(target) {
            return false;
        }
        self.links.push(target.clone());
        true
    }

    /// Remove a link if present. Returns true if the list changed.
    pub fn remove_link(&mut self, target: &VertexId) -> bool {
        let before = self.links.len();
        self.links.retain(|link| link != target);
        self.links.len() != before
    }

    /// Attach a BFS level to this vertex
    pub fn with_level(self, level: usize) -> VertexTree<T> {
        VertexTree { vertex: self, level }
    }
}

/// A vertex annotated with its BFS depth from a traversal root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexTree<T> {
    #[serde(flatten)]
    pub vertex: Vertex<T>,
    pub level: usize,
}

impl<T> std::ops::Deref for VertexTree<T> {
    type Target = Vertex<T>;

    fn deref(&self) -> &Self::Target {
        &self.vertex
    }
}

/// Partial replacement of a vertex's mutable fields
///
/// `data` is merged one level deep onto the stored payload, so keys not
/// mentioned in the patch survive. `links` replaces the stored list,
/// dropping repeated ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexPatch {
    pub data: Option<Value>,
    pub links: Option<Vec<VertexId>>,
}

impl VertexPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_links(mut self, links: Vec<VertexId>) -> Self {
        self.links = Some(links);
        self
    }

    /// Patch fields as a JSON object, ready to merge onto a stored record
    pub(crate) fn into_fields(self) -> Map<String, Value> {
        let mut fields = Map::new();
        if let Some(data) = self.data {
            fields.insert("data".to_string(), data);
        }
        if let Some(links) = self.links {
            // Link lists never hold the same target twice; first occurrence wins
            let mut seen = HashSet::new();
            let links = links
                .into_iter()
                .filter(|id| seen.insert(id.clone()))
                .map(|id| Value::String(id.as_str().to_string()))
                .collect();
            fields.insert("links".to_string(), Value::Array(links));
        }
        fields
    }
}

/// Outcome of an updater for a single vertex
#[derive(Debug, Clone, Default, PartialEq)]
pub enum VertexUpdate {
    /// Leave the record untouched
    #[default]
    Unchanged,
    /// Count the record as changed without altering it
    Touched,
    /// Merge the given fields onto the record
    Patch(VertexPatch),
    /// Drop the record from the file
    Delete,
}

impl From<VertexPatch> for VertexUpdate {
    fn from(patch: VertexPatch) -> Self {
        VertexUpdate::Patch(patch)
    }
}

impl From<Option<VertexPatch>> for VertexUpdate {
    fn from(patch: Option<VertexPatch>) -> Self {
        patch.map_or(VertexUpdate::Unchanged, VertexUpdate::Patch)
    }
}
