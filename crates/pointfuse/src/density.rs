//! Local density estimation and density-based outlier culling.
//!
//! The density of a point is `k / (π r²)` where `r` is the distance to its
//! k-th nearest neighbor (the point itself not counted), i.e. the number of
//! neighbors per unit area of a disc in the locally planar case.

use std::f64::consts::PI;

use rayon::prelude::*;
use tracing::info;

use crate::error::{CloudError, CloudResult};
use crate::kdtree::KdTree;
use crate::progress::{ProgressSink, ProgressTracker};
use crate::tracing_ext::OperationTimer;
use crate::types::{Cloud, Point};

/// Parameters for density estimation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "config",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct DensityParams {
    /// Neighbor count; the k-th neighbor defines the disc radius.
    ///
    /// Default: 10
    pub k: usize,
}

impl Default for DensityParams {
    fn default() -> Self {
        Self { k: 10 }
    }
}

impl DensityParams {
    /// Check the parameter ranges.
    pub fn validate(&self) -> CloudResult<()> {
        CloudError::require_k("k", self.k)
    }
}

/// Parameters for outlier culling.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "config",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct CullParams {
    /// Fraction of points to discard, lowest density first. Must lie in [0, 1].
    ///
    /// Default: 0.1
    pub ratio: f64,

    /// Neighbor count for the density estimate.
    ///
    /// Default: 10
    pub k: usize,
}

impl Default for CullParams {
    fn default() -> Self {
        Self { ratio: 0.1, k: 10 }
    }
}

impl CullParams {
    /// Cull `ratio` of the points using the default `k`.
    #[must_use]
    pub fn with_ratio(ratio: f64) -> Self {
        Self {
            ratio,
            ..Self::default()
        }
    }

    /// Set the neighbor count.
    #[must_use]
    pub fn k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Check the parameter ranges.
    pub fn validate(&self) -> CloudResult<()> {
        if !(0.0..=1.0).contains(&self.ratio) {
            return Err(CloudError::invalid_parameter(
                "ratio",
                format!("{} is outside [0, 1]", self.ratio),
            ));
        }
        CloudError::require_k("k", self.k)
    }
}

/// Outcome of a cull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CullReport {
    pub before: usize,
    pub after: usize,
}

impl CullReport {
    /// Number of discarded points.
    pub fn removed(&self) -> usize {
        self.before - self.after
    }
}

/// Density for a disc of `radius` holding `k` neighbors.
///
/// A zero radius (coincident points) yields infinity.
#[inline]
pub fn disc_density(k: usize, radius: f64) -> f64 {
    if radius > 0.0 {
        k as f64 / (PI * radius * radius)
    } else {
        f64::INFINITY
    }
}

/// Densities of `points`, in point order.
pub fn compute_densities(
    points: &[Point],
    k: usize,
    progress: &dyn ProgressSink,
) -> CloudResult<Vec<f64>> {
    CloudError::require_k("k", k)?;
    let tree = KdTree::new(points);
    let tracker = ProgressTracker::begin(progress, "Density", points.len() as u64);

    points
        .par_iter()
        .map(|point| -> CloudResult<f64> {
            // The point itself comes back first at distance zero.
            let neighbors = tree.knn(&point.position, k + 1)?;
            let radius = neighbors.last().map_or(0.0, |n| n.distance());
            tracker.tick();
            Ok(disc_density(k, radius))
        })
        .collect()
}

/// Recompute and store the density of every point.
pub fn recalc_density(
    cloud: &mut Cloud,
    params: &DensityParams,
    progress: &dyn ProgressSink,
) -> CloudResult<()> {
    let _timer = OperationTimer::with_context("recalc_density", cloud.len());
    let densities = compute_densities(cloud.points(), params.k, progress)?;
    for (point, density) in cloud.points_mut().iter_mut().zip(densities) {
        point.density = density;
    }
    cloud.mark_densities(params.k);

    info!(cloud = cloud.name(), points = cloud.len(), k = params.k, "Recalculated density");
    Ok(())
}

/// Compute densities unless the cloud already holds them for this `k`.
pub fn ensure_density(cloud: &mut Cloud, k: usize, progress: &dyn ProgressSink) -> CloudResult<()> {
    if cloud.density_k() == Some(k) {
        return Ok(());
    }
    recalc_density(cloud, &DensityParams { k }, progress)
}

/// Discard the `ratio` fraction of least dense points.
///
/// Keeps `round((1 - ratio) * N)` points, ordered by descending density.
/// A ratio of zero leaves the cloud untouched.
pub fn cull(
    cloud: &mut Cloud,
    params: &CullParams,
    progress: &dyn ProgressSink,
) -> CloudResult<CullReport> {
    params.validate()?;
    let before = cloud.len();
    if params.ratio == 0.0 {
        return Ok(CullReport {
            before,
            after: before,
        });
    }

    let _timer = OperationTimer::with_context("cull", before);
    ensure_density(cloud, params.k, progress)?;

    let keep = ((1.0 - params.ratio) * before as f64).round() as usize;
    let points = cloud.points_mut();
    points.sort_by(|a, b| b.density.total_cmp(&a.density));
    points.truncate(keep);

    let report = CullReport {
        before,
        after: cloud.len(),
    };
    info!(
        cloud = cloud.name(),
        before = report.before,
        after = report.after,
        ratio = params.ratio,
        "Culled low-density points"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn grid_with_outlier() -> Cloud {
        let mut positions = Vec::new();
        for x in 0..10 {
            for y in 0..10 {
                positions.push(Point3::new(x as f64, y as f64, 0.0));
            }
        }
        positions.push(Point3::new(50.0, 50.0, 0.0));
        Cloud::from_positions("grid", &positions)
    }

    #[test]
    fn test_disc_density() {
        assert_relative_eq!(disc_density(4, 1.0), 4.0 / PI);
        assert_eq!(disc_density(4, 0.0), f64::INFINITY);
    }

    #[test]
    fn test_grid_density() {
        let mut cloud = grid_with_outlier();
        recalc_density(&mut cloud, &DensityParams { k: 4 }, &NoProgress).unwrap();
        assert_eq!(cloud.density_k(), Some(4));

        // Interior point (5, 5) has four neighbors at distance 1.
        let interior = cloud
            .points()
            .iter()
            .find(|p| p.position == Point3::new(5.0, 5.0, 0.0))
            .unwrap();
        assert_relative_eq!(interior.density, 4.0 / PI, epsilon = 1e-12);

        let outlier = cloud.points().last().unwrap();
        assert!(outlier.density < interior.density * 1e-3);
    }

    #[test]
    fn test_cull_removes_outlier() {
        let mut cloud = grid_with_outlier();
        let ratio = 1.0 / cloud.len() as f64;
        let report = cull(&mut cloud, &CullParams::with_ratio(ratio).k(4), &NoProgress).unwrap();
        assert_eq!(report.removed(), 1);
        assert!(cloud.points().iter().all(|p| p.position.x < 20.0));
        for pair in cloud.points().windows(2) {
            assert!(pair[0].density >= pair[1].density);
        }
        // The survivors' densities refer to the old point set.
        assert_eq!(cloud.density_k(), None);
    }

    #[test]
    fn test_cull_zero_is_noop() {
        let mut cloud = grid_with_outlier();
        let original = cloud.points().to_vec();
        let report = cull(&mut cloud, &CullParams::with_ratio(0.0), &NoProgress).unwrap();
        assert_eq!(report.removed(), 0);
        assert_eq!(cloud.points(), &original[..]);
    }

    #[test]
    fn test_cull_one_empties() {
        let mut cloud = grid_with_outlier();
        cull(&mut cloud, &CullParams::with_ratio(1.0), &NoProgress).unwrap();
        assert!(cloud.is_empty());
    }

    #[test]
    fn test_cull_rejects_bad_ratio() {
        let mut cloud = grid_with_outlier();
        for ratio in [-0.1, 1.5, f64::NAN] {
            let err = cull(&mut cloud, &CullParams::with_ratio(ratio), &NoProgress).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::Precondition);
        }
        let err = cull(&mut cloud, &CullParams::with_ratio(0.5).k(0), &NoProgress).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Precondition);
        assert_eq!(cloud.len(), 101);
    }

    #[test]
    fn test_ensure_density_reuses_cache() {
        let mut cloud = grid_with_outlier();
        ensure_density(&mut cloud, 4, &NoProgress).unwrap();
        let generation = cloud.generation();
        ensure_density(&mut cloud, 4, &NoProgress).unwrap();
        assert_eq!(cloud.generation(), generation);
        ensure_density(&mut cloud, 6, &NoProgress).unwrap();
        assert_eq!(cloud.density_k(), Some(6));
    }

    #[test]
    fn test_single_point_density_is_infinite() {
        let mut cloud = Cloud::from_positions("one", &[Point3::origin()]);
        recalc_density(&mut cloud, &DensityParams { k: 3 }, &NoProgress).unwrap();
        assert_eq!(cloud.points()[0].density, f64::INFINITY);
    }
}
