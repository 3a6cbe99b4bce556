//! Pairwise rigid registration by trimmed iterative closest point.
//!
//! The first cloud stays fixed; the second cloud's pose is refined so that its
//! points land on the first cloud. Every iteration:
//!
//! 1. draws `samples` distinct points of the first cloud from a seeded RNG,
//! 2. maps them into the second cloud's local frame and pairs each with its
//!    nearest neighbor there,
//! 3. keeps the closest `1 - outlier_fraction` of the pairs (at least one),
//! 4. solves the best rigid motion between the pairs in the global frame with
//!    an SVD (Kabsch) and composes it onto the second cloud's pose.
//!
//! The iteration count is fixed; there is no convergence test.
//!
//! # Example
//!
//! ```
//! use nalgebra::{Matrix4, Point3, Vector3};
//! use pointfuse::registration::{IcpParams, icp};
//! use pointfuse::{Cloud, NoProgress};
//!
//! let positions: Vec<_> = (0..64)
//!     .map(|i| Point3::new((i % 4) as f64, ((i / 4) % 4) as f64, (i / 16) as f64 * 1.3))
//!     .collect();
//! let fixed = Cloud::from_positions("fixed", &positions);
//! let mut moving = fixed.clone();
//! moving.set_pose(Matrix4::new_translation(&Vector3::new(0.1, 0.0, 0.0)));
//!
//! let result = icp(&fixed, &mut moving, &IcpParams::default(), &NoProgress).unwrap();
//! assert!(result.final_rms().unwrap() < 1e-9);
//! ```

use nalgebra::{Matrix3, Matrix4, Point3, Vector3};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use tracing::{debug, info};

use crate::error::{CloudError, CloudResult};
use crate::kdtree::KdTree;
use crate::progress::{ProgressSink, ProgressTracker};
use crate::tracing_ext::OperationTimer;
use crate::types::Cloud;

/// Parameters for trimmed ICP.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "config",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct IcpParams {
    /// Points drawn from the first cloud per iteration. Clamped to its size.
    ///
    /// Default: 1000
    pub samples: usize,

    /// Number of iterations.
    ///
    /// Default: 30
    pub iterations: usize,

    /// Fraction of the farthest correspondences discarded each iteration,
    /// in [0, 1).
    ///
    /// Default: 0.1
    pub outlier_fraction: f64,

    /// Seed for the sampling RNG.
    ///
    /// Default: 0x5eed
    pub seed: u64,
}

impl Default for IcpParams {
    fn default() -> Self {
        Self {
            samples: 1000,
            iterations: 30,
            outlier_fraction: 0.1,
            seed: 0x5eed,
        }
    }
}

impl IcpParams {
    /// Set the per-iteration sample count.
    #[must_use]
    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples;
        self
    }

    /// Set the iteration count.
    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the trimmed fraction.
    #[must_use]
    pub fn with_outlier_fraction(mut self, outlier_fraction: f64) -> Self {
        self.outlier_fraction = outlier_fraction;
        self
    }

    /// Set the RNG seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check the parameter ranges.
    pub fn validate(&self) -> CloudResult<()> {
        if self.samples == 0 {
            return Err(CloudError::invalid_parameter(
                "samples",
                "must be at least 1",
            ));
        }
        if !(0.0..1.0).contains(&self.outlier_fraction) {
            return Err(CloudError::invalid_parameter(
                "outlier_fraction",
                format!("{} is outside [0, 1)", self.outlier_fraction),
            ));
        }
        Ok(())
    }

    /// Correspondences kept out of `count`.
    pub fn retained(&self, count: usize) -> usize {
        let keep = ((1.0 - self.outlier_fraction) * count as f64).round() as usize;
        keep.clamp(1, count.max(1))
    }
}

/// A sampled point of the first cloud paired with its nearest neighbor in
/// the second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    /// Index into the first cloud.
    pub source: usize,
    /// Index into the second cloud.
    pub target: usize,
    /// Distance measured in the second cloud's local frame.
    pub distance: f64,
}

/// Outcome of an ICP run.
#[derive(Debug, Clone)]
pub struct IcpResult {
    /// Final global pose of the second cloud.
    pub pose: Matrix4<f64>,

    /// RMS distance of the retained correspondences, one entry per iteration,
    /// measured before that iteration's update.
    pub rms_per_iteration: Vec<f64>,

    /// Correspondences retained per iteration.
    pub retained: usize,
}

impl IcpResult {
    /// RMS of the last iteration.
    pub fn final_rms(&self) -> Option<f64> {
        self.rms_per_iteration.last().copied()
    }
}

/// Refine `second`'s pose to align it onto `first`.
///
/// # Errors
///
/// - Invalid parameters or an empty cloud (checked before iterating).
/// - A singular pose on either cloud.
pub fn icp(
    first: &Cloud,
    second: &mut Cloud,
    params: &IcpParams,
    progress: &dyn ProgressSink,
) -> CloudResult<IcpResult> {
    params.validate()?;
    if first.is_empty() || second.is_empty() {
        return Err(CloudError::EmptyCloud { operation: "icp" });
    }

    let _timer = OperationTimer::with_context("icp", first.len());
    let samples = params.samples.min(first.len());
    let retained = params.retained(samples);
    let pose_a = *first.pose();
    let mut pose_b = *second.pose();
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut rms_per_iteration = Vec::with_capacity(params.iterations);

    {
        let tree = KdTree::new(second.points());
        let tracker = ProgressTracker::begin(progress, "ICP", params.iterations as u64);

        for iteration in 0..params.iterations {
            let inverse_b = pose_b.try_inverse().ok_or_else(|| CloudError::SingularTransform {
                cloud: second.name().to_string(),
            })?;
            let relative = inverse_b * pose_a;

            let mut correspondences: Vec<Correspondence> = index::sample(&mut rng, first.len(), samples)
                .into_iter()
                .filter_map(|source| {
                    let local = relative.transform_point(&first.points()[source].position);
                    tree.nearest(&local).map(|n| Correspondence {
                        source,
                        target: n.index,
                        distance: n.distance(),
                    })
                })
                .collect();
            correspondences.sort_by(|a, b| a.distance.total_cmp(&b.distance));
            correspondences.truncate(retained);

            let rms = (correspondences
                .iter()
                .map(|c| c.distance * c.distance)
                .sum::<f64>()
                / correspondences.len() as f64)
                .sqrt();
            rms_per_iteration.push(rms);

            let (p, q): (Vec<Point3<f64>>, Vec<Point3<f64>>) = correspondences
                .iter()
                .map(|c| {
                    (
                        pose_a.transform_point(&first.points()[c.source].position),
                        pose_b.transform_point(&second.points()[c.target].position),
                    )
                })
                .unzip();

            pose_b = kabsch(&p, &q) * pose_b;
            debug!(iteration, rms, retained = correspondences.len(), "ICP iteration");
            tracker.tick();
        }
    }

    second.set_pose(pose_b);
    info!(
        fixed = first.name(),
        moving = second.name(),
        iterations = params.iterations,
        samples,
        retained,
        final_rms = rms_per_iteration.last().copied().unwrap_or(0.0),
        "ICP registration complete"
    );

    Ok(IcpResult {
        pose: pose_b,
        rms_per_iteration,
        retained,
    })
}

/// Rigid motion that best maps `q` onto `p` in the least-squares sense.
///
/// The rotation is forced proper (determinant +1) by flipping the axis of the
/// smallest singular value when the plain SVD solution is a reflection.
/// Empty or mismatched input yields the identity.
pub fn kabsch(p: &[Point3<f64>], q: &[Point3<f64>]) -> Matrix4<f64> {
    let n = p.len();
    if n == 0 || n != q.len() {
        return Matrix4::identity();
    }

    let centroid_p: Vector3<f64> = p.iter().map(|x| x.coords).sum::<Vector3<f64>>() / n as f64;
    let centroid_q: Vector3<f64> = q.iter().map(|x| x.coords).sum::<Vector3<f64>>() / n as f64;

    // Cross-covariance H = mean(q_rel * p_rel^T)
    let mut h = Matrix3::zeros();
    for (pi, qi) in p.iter().zip(q) {
        h += (qi.coords - centroid_q) * (pi.coords - centroid_p).transpose();
    }
    h /= n as f64;

    let svd = h.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Matrix4::identity();
    };
    let v = v_t.transpose();
    let d = (v * u.transpose()).determinant().signum();
    let rotation = v * Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, d)) * u.transpose();
    let translation = centroid_p - rotation * centroid_q;

    let mut transform = rotation.to_homogeneous();
    transform.fixed_view_mut::<3, 1>(0, 3).copy_from(&translation);
    transform
}
