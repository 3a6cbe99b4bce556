//! Proximity graph and minimum spanning tree.
//!
//! The proximity graph links every point to its k nearest neighbors. Edge
//! weights measure how much the two normals disagree in orientation
//! (`1 - |n_i · n_j|`), so a minimum spanning tree prefers to walk across
//! nearly coplanar neighborhoods. Normal orientation propagation follows the
//! tree from its root.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{CloudError, CloudResult};
use crate::kdtree::KdTree;
use crate::progress::{ProgressSink, ProgressTracker};
use crate::tracing_ext::OperationTimer;
use crate::types::Point;

/// Minimum leaf size of the KD-tree used for graph construction.
pub const GRAPH_TREE_MIN_LEAF: usize = 10;

/// An undirected edge with `i < j`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub i: usize,
    pub j: usize,
    pub weight: f64,
}

impl Edge {
    /// Create an edge, ordering the endpoints.
    #[inline]
    pub fn new(a: usize, b: usize, weight: f64) -> Self {
        Self {
            i: a.min(b),
            j: a.max(b),
            weight,
        }
    }
}

/// Weight of the edge between two normals.
#[inline]
pub fn normal_divergence(a: &Point, b: &Point) -> f64 {
    1.0 - a.normal.dot(&b.normal).abs()
}

/// k-neighbor graph over a point set.
#[derive(Debug, Clone)]
pub struct ProximityGraph {
    vertex_count: usize,
    k: usize,
    edges: Vec<Edge>,
}

impl ProximityGraph {
    /// Build the graph for `points`, using their current normals as weights.
    ///
    /// Neighbor discovery runs on the rayon pool: the points are striped
    /// across workers by index modulo the worker count, and every worker
    /// fills its own edge buffer. The buffers are merged and deduplicated
    /// once all workers have finished.
    ///
    /// The neighborhood of a point includes the point itself, so each point
    /// contributes at most `k - 1` edges.
    pub fn build(points: &[Point], k: usize, progress: &dyn ProgressSink) -> CloudResult<Self> {
        CloudError::require_k("k", k)?;
        let _timer = OperationTimer::with_context("proximity_graph", points.len());

        let missing_normals = points.iter().filter(|p| !p.has_normal()).count();
        if missing_normals > 0 {
            warn!(
                missing_normals,
                "Building proximity graph over points without normals; their edges get weight 1"
            );
        }

        let tree = KdTree::build(points, usize::MAX, GRAPH_TREE_MIN_LEAF);
        Self::from_tree(&tree, k, progress)
    }

    /// Build the graph from an existing tree over the points.
    pub fn from_tree(
        tree: &KdTree<'_, Point>,
        k: usize,
        progress: &dyn ProgressSink,
    ) -> CloudResult<Self> {
        CloudError::require_k("k", k)?;
        let points = tree.points();
        let n = points.len();
        let workers = rayon::current_num_threads().max(1);
        let tracker = ProgressTracker::begin(progress, "Proximity graph", n as u64);

        let buffers = (0..workers)
            .into_par_iter()
            .map(|worker| -> CloudResult<Vec<Edge>> {
                let mut local = Vec::new();
                for i in (worker..n).step_by(workers) {
                    for neighbor in tree.knn(&points[i].position, k)? {
                        let j = neighbor.index;
                        if i == j {
                            continue;
                        }
                        local.push(Edge::new(i, j, normal_divergence(&points[i], &points[j])));
                    }
                    tracker.tick();
                }
                Ok(local)
            })
            .collect::<CloudResult<Vec<_>>>()?;

        let raw: usize = buffers.iter().map(Vec::len).sum();
        let mut edges = Vec::with_capacity(raw);
        for buffer in buffers {
            edges.extend(buffer);
        }
        let graph = Self::from_edges(n, k, edges);

        debug!(
            points = n,
            k,
            workers,
            raw_edges = raw,
            edges = graph.edge_count(),
            "Built proximity graph"
        );
        Ok(graph)
    }

    /// Build a graph from arbitrary edges. Self-loops are dropped and
    /// duplicate pairs collapse to the first occurrence.
    pub fn from_edges(vertex_count: usize, k: usize, mut edges: Vec<Edge>) -> Self {
        edges.retain(|e| e.i != e.j);
        for edge in &mut edges {
            *edge = Edge::new(edge.i, edge.j, edge.weight);
        }
        edges.sort_by_key(|e| (e.i, e.j));
        edges.dedup_by_key(|e| (e.i, e.j));
        Self {
            vertex_count,
            k,
            edges,
        }
    }

    /// Number of vertices (points).
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// The neighborhood size the graph was built with.
    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of undirected edges.
    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// The edges, ordered by `(i, j)` unless re-sorted.
    #[inline]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Sort edges ascending by weight.
    pub fn sort_by_weight(&mut self) {
        self.edges.sort_by(|a, b| a.weight.total_cmp(&b.weight));
    }

    /// Per-vertex `(neighbor, weight)` lists.
    pub fn adjacency(&self) -> Vec<Vec<(usize, f64)>> {
        let mut adjacency = vec![Vec::new(); self.vertex_count];
        for edge in &self.edges {
            adjacency[edge.i].push((edge.j, edge.weight));
            adjacency[edge.j].push((edge.i, edge.weight));
        }
        adjacency
    }
}

/// A tree edge, directed away from the root.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeEdge {
    pub parent: usize,
    pub child: usize,
    pub weight: f64,
}

/// Minimum spanning tree with edges in discovery order.
///
/// Every edge's parent is either the root or the child of an earlier edge.
#[derive(Debug, Clone)]
pub struct SpanningTree {
    pub root: usize,
    pub edges: Vec<TreeEdge>,
}

impl SpanningTree {
    /// Sum of the edge weights.
    pub fn total_weight(&self) -> f64 {
        self.edges.iter().map(|e| e.weight).sum()
    }
}

/// Frontier entry ordered by weight, then by endpoints for determinism.
#[derive(Debug, Clone, Copy)]
struct Frontier {
    weight: f64,
    parent: usize,
    child: usize,
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.weight
            .total_cmp(&other.weight)
            .then_with(|| self.child.cmp(&other.child))
            .then_with(|| self.parent.cmp(&other.parent))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

/// Prim's algorithm from `root`.
///
/// # Errors
///
/// Returns [`CloudError::DisconnectedGraph`] when the frontier empties
/// before every vertex is reached.
pub fn minimum_spanning_tree(graph: &ProximityGraph, root: usize) -> CloudResult<SpanningTree> {
    let n = graph.vertex_count();
    if n == 0 {
        return Ok(SpanningTree {
            root,
            edges: Vec::new(),
        });
    }
    if root >= n {
        return Err(CloudError::invalid_parameter(
            "root",
            format!("{} is out of range for {} vertices", root, n),
        ));
    }

    let _timer = OperationTimer::with_context("minimum_spanning_tree", n);
    let adjacency = graph.adjacency();
    let mut in_tree = vec![false; n];
    let mut frontier = BinaryHeap::new();
    let mut edges = Vec::with_capacity(n - 1);

    in_tree[root] = true;
    for &(child, weight) in &adjacency[root] {
        frontier.push(Reverse(Frontier {
            weight,
            parent: root,
            child,
        }));
    }

    while let Some(Reverse(candidate)) = frontier.pop() {
        if in_tree[candidate.child] {
            continue;
        }
        in_tree[candidate.child] = true;
        edges.push(TreeEdge {
            parent: candidate.parent,
            child: candidate.child,
            weight: candidate.weight,
        });
        if edges.len() == n - 1 {
            break;
        }
        for &(next, weight) in &adjacency[candidate.child] {
            if !in_tree[next] {
                frontier.push(Reverse(Frontier {
                    weight,
                    parent: candidate.child,
                    child: next,
                }));
            }
        }
    }

    let reached = edges.len() + 1;
    if reached < n {
        return Err(CloudError::DisconnectedGraph {
            reached,
            total: n,
            k: graph.k(),
        });
    }

    let tree = SpanningTree { root, edges };
    info!(
        vertices = n,
        total_weight = format!("{:.4}", tree.total_weight()),
        "Built minimum spanning tree"
    );
    Ok(tree)
}
