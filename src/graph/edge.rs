//! Arc and edge operations
//!
//! An arc is a directed link recorded in the source vertex's `links`; an
//! edge is a pair of arcs in both directions. Chain operations take an
//! ordered list of ids and link each vertex to its neighbours in that list.
//!
//! Every mutating operation checks its preconditions and rewrites the file
//! inside one queued task, so no other writer can slip in between.

use super::store::{find_links, require_all, rewrite_vertices, FileGraph, GraphError, GraphResult};
use super::types::VertexId;
use super::vertex::{Vertex, VertexPatch, VertexUpdate};
use crate::persistence::LineStore;
use serde::de::IgnoredAny;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Which neighbours in a chain a vertex links to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Successor only
    Forward,
    /// Predecessor and successor
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkOp {
    Add,
    Remove,
}

impl FileGraph {
    /// Link consecutive ids in both directions
    ///
    /// Fails with `MissingVertices` unless every id is stored; in that case
    /// no link is written.
    pub async fn create_edge(&self, ids: &[VertexId]) -> GraphResult<bool> {
        self.queued(relink_chain(
            Arc::clone(&self.store),
            ids.to_vec(),
            Direction::Both,
            LinkOp::Add,
        ))
        .await
    }

    /// Remove the links `create_edge` would add for the same ids
    pub async fn remove_edge(&self, ids: &[VertexId]) -> GraphResult<bool> {
        self.queued(relink_chain(
            Arc::clone(&self.store),
            ids.to_vec(),
            Direction::Both,
            LinkOp::Remove,
        ))
        .await
    }

    /// Link each id to its successor only
    pub async fn create_arcs(&self, ids: &[VertexId]) -> GraphResult<bool> {
        self.queued(relink_chain(
            Arc::clone(&self.store),
            ids.to_vec(),
            Direction::Forward,
            LinkOp::Add,
        ))
        .await
    }

    /// Add an arc from `source` to `target`
    ///
    /// Returns false when `source` is not stored.
    pub async fn create_arc(&self, source: &VertexId, target: &VertexId) -> GraphResult<bool> {
        self.queued(update_arc(
            Arc::clone(&self.store),
            source.clone(),
            target.clone(),
            LinkOp::Add,
        ))
        .await
    }

    /// Remove the arc from `source` to `target`
    pub async fn remove_arc(&self, source: &VertexId, target: &VertexId) -> GraphResult<bool> {
        self.queued(update_arc(
            Arc::clone(&self.store),
            source.clone(),
            target.clone(),
            LinkOp::Remove,
        ))
        .await
    }

    /// Whether `source` links to `target`
    pub async fn has_arc(&self, source: &VertexId, target: &VertexId) -> GraphResult<bool> {
        match find_links(&self.store, source).await? {
            Some(links) => Ok(links.contains(target)),
            None => Err(GraphError::TargetVertexNotFound(source.clone())),
        }
    }
}

/// Neighbours of every id in the chain, over all positions it occupies
fn chain_neighbors(ids: &[VertexId], direction: Direction) -> HashMap<VertexId, Vec<VertexId>> {
    let mut neighbors: HashMap<VertexId, Vec<VertexId>> = HashMap::new();
    for (i, id) in ids.iter().enumerate() {
        let predecessor = match direction {
            Direction::Both if i > 0 => ids.get(i - 1),
            _ => None,
        };
        let successor = ids.get(i + 1);

        let entry = neighbors.entry(id.clone()).or_default();
        for neighbor in predecessor.into_iter().chain(successor) {
            if neighbor != id && !entry.contains(neighbor) {
                entry.push(neighbor.clone());
            }
        }
    }
    neighbors
}

async fn relink_chain(
    store: Arc<LineStore>,
    ids: Vec<VertexId>,
    direction: Direction,
    op: LinkOp,
) -> GraphResult<bool> {
    if ids.is_empty() {
        return Ok(false);
    }
    require_all(&store, &ids).await?;

    let neighbors = chain_neighbors(&ids, direction);
    let changed = rewrite_vertices(store, move |mut vertex: Vertex<IgnoredAny>| {
        let Some(targets) = neighbors.get(&vertex.id) else {
            return Ok(VertexUpdate::Unchanged);
        };

        let mut changed = false;
        for target in targets {
            changed |= match op {
                LinkOp::Add => vertex.add_link(target),
                LinkOp::Remove => vertex.remove_link(target),
            };
        }

        Ok(if changed {
            VertexPatch::new().with_links(vertex.links).into()
        } else {
            VertexUpdate::Unchanged
        })
    })
    .await?;

    debug!("{:?} {:?} chain of {} vertices: changed={}", op, direction, ids.len(), changed);
    Ok(changed)
}

async fn update_arc(
    store: Arc<LineStore>,
    source: VertexId,
    target: VertexId,
    op: LinkOp,
) -> GraphResult<bool> {
    if find_links(&store, &target).await?.is_none() {
        return Err(GraphError::TargetVertexNotFound(target));
    }

    rewrite_vertices(store, move |mut vertex: Vertex<IgnoredAny>| {
        if vertex.id != source {
            return Ok(VertexUpdate::Unchanged);
        }

        let changed = match op {
            LinkOp::Add => vertex.add_link(&target),
            LinkOp::Remove => vertex.remove_link(&target),
        };
        if !changed {
            let (source_id, target_id) = (source.clone(), target.clone());
            return Err(match op {
                LinkOp::Add => GraphError::ArcAlreadyExists { source_id, target_id },
                LinkOp::Remove => GraphError::ArcDoesNotExist { source_id, target_id },
            });
        }
        Ok(VertexPatch::new().with_links(vertex.links).into())
    })
    .await
}
