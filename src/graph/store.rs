//! File-backed graph store
//!
//! `FileGraph` composes a [`LineStore`] with a [`TaskQueue`]:
//! - writes (vertex create/update/delete, arc and edge changes) are queued
//!   and run one at a time in submission order
//! - reads scan the file directly and may run alongside a queued write
//!
//! No index is kept in memory; the file is the only source of truth.

use super::config::GraphConfig;
use super::types::VertexId;
use super::vertex::{Vertex, VertexUpdate};
use crate::persistence::{LineStore, QueueError, Rewrite, StorageError, TaskQueue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during graph operations
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Vertex with id {0} not found")]
    VertexNotFound(VertexId),

    #[error("Some of the given vertices are missing from the graph")]
    MissingVertices,

    #[error("Target vertex with id {0} not found")]
    TargetVertexNotFound(VertexId),

    #[error("Vertex {source_id} already has an arc to {target_id}")]
    ArcAlreadyExists {
        source_id: VertexId,
        target_id: VertexId,
    },

    #[error("Vertex {source_id} has no arc to {target_id}")]
    ArcDoesNotExist {
        source_id: VertexId,
        target_id: VertexId,
    },

    #[error("Level must be a non-negative integer")]
    NegativeLevel,

    #[error("Vertex payload does not match the requested type: {0}")]
    Payload(#[source] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Id and links of a stored vertex, whatever its payload
#[derive(Debug, Deserialize)]
pub(crate) struct VertexLinks {
    pub id: VertexId,
    #[serde(default)]
    pub links: Vec<VertexId>,
}

/// Embedded graph store backed by one newline-delimited JSON file
///
/// Cloning is cheap; clones share the file and the write queue.
#[derive(Clone, Debug)]
pub struct FileGraph {
    pub(crate) store: Arc<LineStore>,
    queue: TaskQueue,
}

impl FileGraph {
    /// Open a graph store
    ///
    /// Must be called from within a tokio runtime; the write queue's worker
    /// is spawned on it. Elsewhere this fails with `QueueError::NoRuntime`.
    pub async fn open(config: GraphConfig) -> GraphResult<Self> {
        // Before any file I/O, which also needs the runtime
        let queue = TaskQueue::new()?;

        let store = LineStore::new(config.path, config.sync_writes);
        if config.create_if_missing {
            store.ensure_exists().await?;
        }

        info!("Opened graph store at {:?}", store.path());

        Ok(Self {
            store: Arc::new(store),
            queue,
        })
    }

    /// Open a graph store at `path` with default settings
    pub async fn open_path(path: impl Into<PathBuf>) -> GraphResult<Self> {
        Self::open(GraphConfig::new(path)).await
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Run `task` in this store's write queue
    pub(crate) async fn queued<T, F>(&self, task: F) -> GraphResult<T>
    where
        F: Future<Output = GraphResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.queue.submit(task).await?
    }

    /// Create a vertex holding `data`
    pub async fn create_vertex<T>(&self, data: T) -> GraphResult<Vertex<T>>
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.queued(append_vertex(Arc::clone(&self.store), Vertex::new(data)))
            .await
    }

    /// Create one vertex per payload with a single append
    pub async fn create_vertices<T>(&self, data: Vec<T>) -> GraphResult<Vec<Vertex<T>>>
    where
        T: Serialize + Send + Sync + 'static,
    {
        let vertices: Vec<Vertex<T>> = data.into_iter().map(Vertex::new).collect();
        self.queued(append_vertices(Arc::clone(&self.store), vertices))
            .await
    }

    /// Apply `updater` to every vertex; returns whether anything changed
    pub async fn update_vertex<T, F>(&self, mut updater: F) -> GraphResult<bool>
    where
        T: DeserializeOwned + Send + 'static,
        F: FnMut(Vertex<T>) -> VertexUpdate + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        self.queued(rewrite_vertices(store, move |vertex: Vertex<T>| Ok(updater(vertex))))
            .await
    }

    /// Remove every vertex matching `predicate`; returns whether any was removed
    ///
    /// Links pointing at removed vertices are left in place.
    pub async fn delete_vertex<T, P>(&self, mut predicate: P) -> GraphResult<bool>
    where
        T: DeserializeOwned + Send + 'static,
        P: FnMut(&Vertex<T>) -> bool + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        self.queued(rewrite_vertices(store, move |vertex: Vertex<T>| {
            Ok(if predicate(&vertex) {
                VertexUpdate::Delete
            } else {
                VertexUpdate::Unchanged
            })
        }))
        .await
    }

    /// First vertex in file order matching `predicate`
    pub async fn find_one<T, P>(&self, predicate: P) -> GraphResult<Option<Vertex<T>>>
    where
        T: DeserializeOwned,
        P: FnMut(&Vertex<T>) -> bool,
    {
        Ok(self.store.scan_find(predicate).await?)
    }

    /// Vertex with the given id
    pub async fn find_by_id<T>(&self, id: &VertexId) -> GraphResult<Option<Vertex<T>>>
    where
        T: DeserializeOwned,
    {
        find_vertex(&self.store, id).await
    }

    /// Every vertex matching `predicate`, in file order
    pub async fn find_all<T, P>(&self, mut predicate: P) -> GraphResult<Vec<Vertex<T>>>
    where
        T: DeserializeOwned,
        P: FnMut(&Vertex<T>) -> bool,
    {
        let mut found = Vec::new();
        self.store
            .scan_collect(|vertex: Vertex<T>| {
                if predicate(&vertex) {
                    found.push(vertex);
                }
                ControlFlow::Continue(())
            })
            .await?;
        Ok(found)
    }

    /// Visit every vertex in file order until `callback` breaks
    pub async fn for_each_vertex<T, F>(&self, callback: F) -> GraphResult<()>
    where
        T: DeserializeOwned,
        F: FnMut(Vertex<T>) -> ControlFlow<()>,
    {
        Ok(self.store.scan_collect(callback).await?)
    }
}

async fn append_vertex<T: Serialize>(store: Arc<LineStore>, vertex: Vertex<T>) -> GraphResult<Vertex<T>> {
    store.append(std::slice::from_ref(&vertex)).await?;
    debug!("Created vertex {}", vertex.id);
    Ok(vertex)
}

async fn append_vertices<T: Serialize>(
    store: Arc<LineStore>,
    vertices: Vec<Vertex<T>>,
) -> GraphResult<Vec<Vertex<T>>> {
    store.append(&vertices).await?;
    debug!("Created {} vertex record(s)", vertices.len());
    Ok(vertices)
}

/// Rewrite the store, resolving each vertex through `updater`
pub(crate) async fn rewrite_vertices<T, F>(store: Arc<LineStore>, mut updater: F) -> GraphResult<bool>
where
    T: DeserializeOwned,
    F: FnMut(Vertex<T>) -> GraphResult<VertexUpdate>,
{
    store
        .rewrite_all(|record: &Value| -> GraphResult<Rewrite> {
            let vertex = Vertex::<T>::deserialize(record).map_err(GraphError::Payload)?;
            Ok(match updater(vertex)? {
                VertexUpdate::Unchanged => Rewrite::Keep,
                VertexUpdate::Touched => Rewrite::Touch,
                VertexUpdate::Patch(patch) => Rewrite::Merge(patch.into_fields()),
                VertexUpdate::Delete => Rewrite::Delete,
            })
        })
        .await
}

pub(crate) async fn find_vertex<T: DeserializeOwned>(
    store: &LineStore,
    id: &VertexId,
) -> GraphResult<Option<Vertex<T>>> {
    Ok(store.scan_find(|vertex: &Vertex<T>| &vertex.id == id).await?)
}

/// Vertex with the given id, or `VertexNotFound`
pub(crate) async fn require_vertex<T: DeserializeOwned>(
    store: &LineStore,
    id: &VertexId,
) -> GraphResult<Vertex<T>> {
    find_vertex(store, id)
        .await?
        .ok_or_else(|| GraphError::VertexNotFound(id.clone()))
}

/// Links of the vertex with the given id, whatever its payload
pub(crate) async fn find_links(store: &LineStore, id: &VertexId) -> GraphResult<Option<Vec<VertexId>>> {
    let found: Option<VertexLinks> = store.scan_find(|vertex: &VertexLinks| &vertex.id == id).await?;
    Ok(found.map(|vertex| vertex.links))
}

/// Fail with `MissingVertices` unless every id is stored
pub(crate) async fn require_all(store: &LineStore, ids: &[VertexId]) -> GraphResult<()> {
    let mut missing: HashSet<&VertexId> = ids.iter().collect();
    store
        .scan_collect(|vertex: VertexLinks| {
            missing.remove(&vertex.id);
            if missing.is_empty() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await?;

    if missing.is_empty() {
        Ok(())
    } else {
        Err(GraphError::MissingVertices)
    }
}
