//! Graph traversal over the file store
//!
//! Implements breadth-first level enumeration and depth-first reachability.
//! There is no adjacency index: every expanded vertex costs one full scan
//! of the file to resolve its links, and linked vertices are taken in file
//! order, which fixes the visiting order.

use crate::graph::store::{require_vertex, GraphError, GraphResult};
use crate::graph::{FileGraph, Vertex, VertexId, VertexTree};
use serde::de::{DeserializeOwned, IgnoredAny};
use std::collections::{HashSet, VecDeque};
use std::ops::ControlFlow;
use tracing::debug;

impl FileGraph {
    /// Breadth-first enumeration from `root`, down to `max_level` inclusive
    ///
    /// `None` walks the whole reachable component. Each vertex appears once,
    /// at the level it was first discovered.
    pub async fn find_up_to_level<T>(
        &self,
        root: &VertexId,
        max_level: Option<i64>,
    ) -> GraphResult<Vec<VertexTree<T>>>
    where
        T: DeserializeOwned,
    {
        let max_level = match max_level {
            Some(level) if level < 0 => return Err(GraphError::NegativeLevel),
            Some(level) => Some(usize::try_from(level).unwrap_or(usize::MAX)),
            None => None,
        };

        let start: Vertex<T> = require_vertex(&self.store, root).await?;
        let mut seen = HashSet::from([start.id.clone()]);
        let mut queue = VecDeque::from([(start, 0usize)]);
        let mut result = Vec::new();

        while let Some((vertex, level)) = queue.pop_front() {
            if max_level.is_some_and(|max| level > max) {
                break;
            }

            // Children of the last level would be discarded anyway
            if !vertex.links.is_empty() && max_level != Some(level) {
                for linked in self.linked_vertices::<T>(&vertex.links, &seen).await? {
                    seen.insert(linked.id.clone());
                    queue.push_back((linked, level + 1));
                }
            }
            result.push(vertex.with_level(level));
        }

        debug!("Level walk from {} returned {} vertices", root, result.len());
        Ok(result)
    }

    /// Whether `target` is reachable from `source` following links forward
    pub async fn has_path(&self, source: &VertexId, target: &VertexId) -> GraphResult<bool> {
        let mut found = false;
        self.depth_first::<IgnoredAny, _>(source, |vertex| {
            if &vertex.id == target {
                found = true;
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await?;
        Ok(found)
    }

    /// Every vertex reachable from `root` (itself included) matching `predicate`
    pub async fn search_vertices_from<T, P>(
        &self,
        root: &VertexId,
        mut predicate: P,
    ) -> GraphResult<Vec<Vertex<T>>>
    where
        T: DeserializeOwned,
        P: FnMut(&Vertex<T>) -> bool,
    {
        let mut matches = Vec::new();
        self.depth_first(root, |vertex: Vertex<T>| {
            if predicate(&vertex) {
                matches.push(vertex);
            }
            ControlFlow::Continue(())
        })
        .await?;
        Ok(matches)
    }

    /// Stack-based walk from `start`, visiting each vertex once
    async fn depth_first<T, F>(&self, start: &VertexId, mut visit: F) -> GraphResult<()>
    where
        T: DeserializeOwned,
        F: FnMut(Vertex<T>) -> ControlFlow<()>,
    {
        let start: Vertex<T> = require_vertex(&self.store, start).await?;
        let mut stack = vec![start];
        let mut visited = HashSet::new();

        while let Some(vertex) = stack.pop() {
            if !visited.insert(vertex.id.clone()) {
                continue;
            }

            let links = vertex.links.clone();
            if visit(vertex).is_break() {
                return Ok(());
            }
            if !links.is_empty() {
                stack.extend(self.linked_vertices::<T>(&links, &visited).await?);
            }
        }
        Ok(())
    }

    /// Vertices whose id is in `links` but not in `exclude`, in file order
    async fn linked_vertices<T>(
        &self,
        links: &[VertexId],
        exclude: &HashSet<VertexId>,
    ) -> GraphResult<Vec<Vertex<T>>>
    where
        T: DeserializeOwned,
    {
        let mut linked = Vec::new();
        self.store
            .scan_collect(|vertex: Vertex<T>| {
                if links.contains(&vertex.id) && !exclude.contains(&vertex.id) {
                    linked.push(vertex);
                }
                ControlFlow::Continue(())
            })
            .await?;
        Ok(linked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphConfig;
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Numbered {
        name: String,
        num: u32,
    }

    async fn open_graph(dir: &TempDir) -> FileGraph {
        let config = GraphConfig::new(dir.path().join("graph.jsonl")).with_sync_writes(false);
        FileGraph::open(config).await.unwrap()
    }

    /// Directed chain V-0 -> V-1 -> ... of `count` vertices
    async fn chain(graph: &FileGraph, count: u32) -> Vec<VertexId> {
        let vertices = graph
            .create_vertices(
                (0..count)
                    .map(|i| Numbered { name: format!("V-{}", i), num: i + 1 })
                    .collect(),
            )
            .await
            .unwrap();
        let ids: Vec<VertexId> = vertices.into_iter().map(|v| v.id).collect();
        graph.create_arcs(&ids).await.unwrap();
        ids
    }

    #[tokio::test]
    async fn test_level_bound() {
        let dir = TempDir::new().unwrap();
        let graph = open_graph(&dir).await;
        let ids = chain(&graph, 10).await;

        let tree = graph.find_up_to_level::<Numbered>(&ids[0], Some(2)).await.unwrap();
        assert_eq!(tree.len(), 3);
        for (index, vertex) in tree.iter().enumerate() {
            assert_eq!(vertex.level, index);
            assert_eq!(vertex.id, ids[index]);
        }
    }

    #[tokio::test]
    async fn test_level_zero_is_root_only() {
        let dir = TempDir::new().unwrap();
        let graph = open_graph(&dir).await;
        let ids = chain(&graph, 4).await;

        let tree = graph.find_up_to_level::<Numbered>(&ids[0], Some(0)).await.unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, ids[0]);
        assert_eq!(tree[0].level, 0);
    }

    #[tokio::test]
    async fn test_unbounded_walk() {
        let dir = TempDir::new().unwrap();
        let graph = open_graph(&dir).await;
        let ids = chain(&graph, 10).await;

        let tree = graph.find_up_to_level::<Numbered>(&ids[0], None).await.unwrap();
        assert_eq!(tree.len(), 10);
        for (index, vertex) in tree.iter().enumerate() {
            assert_eq!(vertex.level, index);
            assert_eq!(vertex.id, ids[index]);
            assert_eq!(vertex.data.num, index as u32 + 1);
        }

        let large = graph.find_up_to_level::<Numbered>(&ids[0], Some(100)).await.unwrap();
        assert_eq!(large.len(), 10);
    }

    #[tokio::test]
    async fn test_negative_level() {
        let dir = TempDir::new().unwrap();
        let graph = open_graph(&dir).await;
        let ids = chain(&graph, 2).await;

        let missing = graph
            .find_up_to_level::<Value>(&VertexId::new("A"), Some(-1))
            .await;
        assert!(matches!(missing, Err(GraphError::NegativeLevel)));

        let existing = graph.find_up_to_level::<Value>(&ids[0], Some(-1)).await;
        assert!(matches!(existing, Err(GraphError::NegativeLevel)));
    }

    #[tokio::test]
    async fn test_missing_root() {
        let dir = TempDir::new().unwrap();
        let graph = open_graph(&dir).await;
        let ghost = VertexId::new("NonExistentVertex");

        let result = graph.find_up_to_level::<Value>(&ghost, Some(1)).await;
        assert!(matches!(result, Err(GraphError::VertexNotFound(id)) if id == ghost));
        assert!(matches!(
            graph.has_path(&ghost, &ghost).await,
            Err(GraphError::VertexNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_diamond_visits_each_vertex_once() {
        let dir = TempDir::new().unwrap();
        let graph = open_graph(&dir).await;
        let ids: Vec<VertexId> = graph
            .create_vertices(vec![json!("a"), json!("b"), json!("c"), json!("d")])
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.id)
            .collect();
        let (a, b, c, d) = (&ids[0], &ids[1], &ids[2], &ids[3]);
        graph.create_arc(a, b).await.unwrap();
        graph.create_arc(a, c).await.unwrap();
        graph.create_arc(b, d).await.unwrap();
        graph.create_arc(c, d).await.unwrap();

        let tree = graph.find_up_to_level::<Value>(a, None).await.unwrap();
        let visited: Vec<(&str, usize)> = tree
            .iter()
            .map(|v| (v.data.as_str().unwrap(), v.level))
            .collect();
        assert_eq!(visited, vec![("a", 0), ("b", 1), ("c", 1), ("d", 2)]);
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let dir = TempDir::new().unwrap();
        let graph = open_graph(&dir).await;
        let ids = chain(&graph, 3).await;
        graph.create_arc(&ids[2], &ids[0]).await.unwrap();

        let tree = graph.find_up_to_level::<Numbered>(&ids[1], None).await.unwrap();
        let order: Vec<&VertexId> = tree.iter().map(|v| &v.id).collect();
        assert_eq!(order, vec![&ids[1], &ids[2], &ids[0]]);

        assert!(graph.has_path(&ids[2], &ids[1]).await.unwrap());
    }

    #[tokio::test]
    async fn test_has_path_is_directed() {
        let dir = TempDir::new().unwrap();
        let graph = open_graph(&dir).await;
        let ids = chain(&graph, 30).await;

        assert!(graph.has_path(&ids[0], &ids[20]).await.unwrap());
        assert!(graph.has_path(&ids[0], &ids[0]).await.unwrap());
        assert!(!graph.has_path(&ids[20], &ids[0]).await.unwrap());
        assert!(!graph.has_path(&ids[0], &VertexId::new("elsewhere")).await.unwrap());
    }

    #[tokio::test]
    async fn test_has_path_follows_edges_both_ways() {
        let dir = TempDir::new().unwrap();
        let graph = open_graph(&dir).await;
        let ids: Vec<VertexId> = graph
            .create_vertices(vec![json!(1), json!(2), json!(3)])
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.id)
            .collect();
        graph.create_edge(&ids).await.unwrap();

        assert!(graph.has_path(&ids[2], &ids[0]).await.unwrap());
        assert!(graph.has_path(&ids[0], &ids[2]).await.unwrap());
    }

    #[tokio::test]
    async fn test_search_vertices_from() {
        let dir = TempDir::new().unwrap();
        let graph = open_graph(&dir).await;
        let ids = chain(&graph, 30).await;

        let even = graph
            .search_vertices_from(&ids[0], |v: &Vertex<Numbered>| v.data.num % 2 == 0)
            .await
            .unwrap();
        assert_eq!(even.len(), 15);
        assert!(even.iter().all(|v| v.data.num % 2 == 0));

        let from_middle = graph
            .search_vertices_from(&ids[10], |_: &Vertex<Numbered>| true)
            .await
            .unwrap();
        assert_eq!(from_middle.len(), 20);
        assert_eq!(from_middle[0].id, ids[10]);
    }

    #[tokio::test]
    async fn test_dangling_links_are_ignored() {
        let dir = TempDir::new().unwrap();
        let graph = open_graph(&dir).await;
        let ids = chain(&graph, 3).await;

        let doomed = ids[1].clone();
        graph
            .delete_vertex(move |v: &Vertex<Numbered>| v.id == doomed)
            .await
            .unwrap();

        let tree = graph.find_up_to_level::<Numbered>(&ids[0], None).await.unwrap();
        assert_eq!(tree.len(), 1);
        assert!(!graph.has_path(&ids[0], &ids[2]).await.unwrap());
    }
}
