//! Normal estimation from local neighborhoods with consistent orientation.
//!
//! Each normal is the eigenvector of the smallest eigenvalue of the
//! covariance of the point's k nearest neighbors. PCA alone leaves the sign
//! undetermined, so the signs are then made consistent by walking a minimum
//! spanning tree of the proximity graph and flipping every child whose
//! normal points away from its parent's.

use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;
use tracing::info;

use crate::error::{CloudError, CloudResult};
use crate::graph::{ProximityGraph, SpanningTree, minimum_spanning_tree};
use crate::kdtree::KdTree;
use crate::progress::{ProgressSink, ProgressTracker};
use crate::tracing_ext::OperationTimer;
use crate::types::{Cloud, Point};

/// Parameters for normal estimation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "config",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct NormalParams {
    /// Neighborhood size for the covariance, including the point itself.
    ///
    /// Default: 10
    pub k: usize,

    /// Neighborhood size for the orientation graph. Falls back to `k`.
    pub graph_k: Option<usize>,

    /// Flip the root normal before propagating, inverting the global sign.
    pub flip_root: bool,
}

impl Default for NormalParams {
    fn default() -> Self {
        Self {
            k: 10,
            graph_k: None,
            flip_root: false,
        }
    }
}

impl NormalParams {
    /// Parameters with neighborhood size `k`.
    #[must_use]
    pub fn with_k(k: usize) -> Self {
        Self {
            k,
            ..Self::default()
        }
    }

    /// Use a different neighborhood size for the orientation graph.
    #[must_use]
    pub fn graph_k(mut self, graph_k: usize) -> Self {
        self.graph_k = Some(graph_k);
        self
    }

    /// Invert the global sign of the result.
    #[must_use]
    pub fn flip_root(mut self, flip: bool) -> Self {
        self.flip_root = flip;
        self
    }

    /// Neighborhood size used for the orientation graph.
    pub fn effective_graph_k(&self) -> usize {
        self.graph_k.unwrap_or(self.k)
    }

    /// Check the parameter ranges.
    pub fn validate(&self) -> CloudResult<()> {
        CloudError::require_k("k", self.k)?;
        CloudError::require_k("graph_k", self.effective_graph_k())
    }
}

/// Summary of a normal recomputation.
#[derive(Debug, Clone)]
pub struct NormalReport {
    /// Number of points that received a normal.
    pub points: usize,
    /// Normals flipped during orientation propagation.
    pub flipped: usize,
    /// Total weight of the spanning tree used for propagation.
    pub tree_weight: f64,
}

/// Recompute every normal of `cloud` and orient them consistently.
///
/// Errors after the PCA phase leave the unoriented normals in place.
///
/// # Errors
///
/// - Invalid parameters (`k == 0`).
/// - [`CloudError::DisconnectedGraph`] when the orientation graph falls
///   apart into several components; a larger `k` usually fixes this.
pub fn recalc_normals(
    cloud: &mut Cloud,
    params: &NormalParams,
    progress: &dyn ProgressSink,
) -> CloudResult<NormalReport> {
    params.validate()?;
    let _span = crate::cloud_span!("recalc_normals", cloud, k = params.k).entered();
    let _timer = OperationTimer::with_context("recalc_normals", cloud.len());

    let normals = estimate_normals(cloud.points(), params.k, progress)?;
    let points = cloud.points_mut();
    for (point, normal) in points.iter_mut().zip(normals) {
        point.normal = normal;
    }

    let (tree, flipped) = orient_normals(
        points,
        params.effective_graph_k(),
        params.flip_root,
        progress,
    )?;

    let report = NormalReport {
        points: cloud.len(),
        flipped,
        tree_weight: tree.total_weight(),
    };
    info!(
        cloud = cloud.name(),
        points = report.points,
        flipped = report.flipped,
        "Recalculated normals"
    );
    Ok(report)
}

/// Unoriented PCA normals for `points`, in point order.
pub fn estimate_normals(
    points: &[Point],
    k: usize,
    progress: &dyn ProgressSink,
) -> CloudResult<Vec<Vector3<f64>>> {
    CloudError::require_k("k", k)?;
    let n = points.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let tree = KdTree::new(points);
    let workers = rayon::current_num_threads().max(1);
    let tracker = ProgressTracker::begin(progress, "Normals", n as u64);

    let slots = (0..workers)
        .into_par_iter()
        .map(|worker| -> CloudResult<Vec<(usize, Vector3<f64>)>> {
            let mut local = Vec::with_capacity(n / workers + 1);
            for i in (worker..n).step_by(workers) {
                let neighbors = tree.knn(&points[i].position, k)?;
                let positions: Vec<Vector3<f64>> = neighbors
                    .iter()
                    .map(|nb| points[nb.index].position.coords)
                    .collect();
                local.push((i, pca_normal(&positions)));
                tracker.tick();
            }
            Ok(local)
        })
        .collect::<CloudResult<Vec<_>>>()?;

    let mut normals = vec![Vector3::zeros(); n];
    for (i, normal) in slots.into_iter().flatten() {
        normals[i] = normal;
    }
    Ok(normals)
}

/// Eigenvector of the smallest eigenvalue of the neighborhood covariance.
pub fn pca_normal(neighborhood: &[Vector3<f64>]) -> Vector3<f64> {
    if neighborhood.is_empty() {
        return Vector3::zeros();
    }
    let count = neighborhood.len() as f64;
    let mean = neighborhood.iter().sum::<Vector3<f64>>() / count;

    let mut covariance = Matrix3::zeros();
    for p in neighborhood {
        let d = p - mean;
        covariance += d * d.transpose();
    }
    covariance /= count;

    let eigen = covariance.symmetric_eigen();
    let smallest = eigen.eigenvalues.imin();
    eigen
        .eigenvectors
        .column(smallest)
        .into_owned()
        .try_normalize(0.0)
        .unwrap_or_else(Vector3::zeros)
}

/// Make normal signs agree along a minimum spanning tree rooted at point 0.
///
/// Returns the tree and the number of flipped normals. After this, every
/// tree edge joins two normals with a non-negative dot product.
pub fn orient_normals(
    points: &mut [Point],
    k: usize,
    flip_root: bool,
    progress: &dyn ProgressSink,
) -> CloudResult<(SpanningTree, usize)> {
    CloudError::require_k("k", k)?;
    let graph = ProximityGraph::build(points, k, progress)?;
    let tree = minimum_spanning_tree(&graph, 0)?;
    let flipped = propagate_orientation(points, &tree, flip_root);
    Ok((tree, flipped))
}

/// Walk `tree` from its root, flipping children that disagree with their
/// parent. Returns the number of flips.
pub fn propagate_orientation(points: &mut [Point], tree: &SpanningTree, flip_root: bool) -> usize {
    if points.is_empty() {
        return 0;
    }
    if flip_root {
        points[tree.root].normal = -points[tree.root].normal;
    }

    let mut flipped = 0;
    for edge in &tree.edges {
        let parent = points[edge.parent].normal;
        let child = &mut points[edge.child].normal;
        if parent.dot(child) < 0.0 {
            *child = -*child;
            flipped += 1;
        }
    }
    flipped
}
