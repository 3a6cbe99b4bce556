//! Voxel-grid merge of several posed clouds into one.
//!
//! Every point is carried into the global frame by its cloud's pose and
//! binned into a cubic voxel of edge `resolution`. Each occupied voxel yields
//! one point: the mean position, color and density of its members and their
//! summed normal re-normalized to unit length.

use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};
use tracing::info;

use crate::error::{CloudError, CloudResult};
use crate::tracing_ext::OperationTimer;
use crate::types::{Cloud, Point, PoseTransform};

/// Parameters for cloud unification.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "config",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct UnifyParams {
    /// Voxel edge length in global units.
    ///
    /// Default: 1.0
    pub resolution: f64,
}

impl Default for UnifyParams {
    fn default() -> Self {
        Self { resolution: 1.0 }
    }
}

impl UnifyParams {
    /// Parameters with the given voxel size.
    #[must_use]
    pub fn with_resolution(resolution: f64) -> Self {
        Self { resolution }
    }

    /// Check the parameter ranges.
    pub fn validate(&self) -> CloudResult<()> {
        if self.resolution.is_finite() && self.resolution > 0.0 {
            Ok(())
        } else {
            Err(CloudError::invalid_parameter(
                "resolution",
                format!("{} is not a positive finite length", self.resolution),
            ))
        }
    }
}

/// Integer voxel coordinates.
pub type VoxelKey = [i64; 3];

/// Voxel containing `position`, rounding toward negative infinity per axis.
#[inline]
pub fn voxel_key(position: &Point3<f64>, resolution: f64) -> VoxelKey {
    let scaled = position.coords / resolution;
    [
        scaled.x.floor() as i64,
        scaled.y.floor() as i64,
        scaled.z.floor() as i64,
    ]
}

#[derive(Debug, Default)]
struct Accumulator {
    position: Vector3<f64>,
    normal: Vector3<f64>,
    color: Vector3<f64>,
    density: f64,
    count: usize,
}

impl Accumulator {
    fn add(&mut self, position: &Point3<f64>, normal: &Vector3<f64>, point: &Point) {
        self.position += position.coords;
        self.normal += normal;
        self.color += point.color;
        self.density += point.density;
        self.count += 1;
    }

    fn finish(&self) -> Point {
        let count = self.count as f64;
        Point {
            position: Point3::from(self.position / count),
            normal: self
                .normal
                .try_normalize(0.0)
                .unwrap_or_else(Vector3::zeros),
            color: self.color / count,
            density: self.density / count,
        }
    }
}

/// Merge `clouds` into a single cloud at identity pose.
///
/// Output points are ordered by voxel key.
///
/// # Errors
///
/// - Invalid resolution.
/// - A cloud whose pose has a singular linear part.
pub fn unify<'a>(
    clouds: impl IntoIterator<Item = &'a Cloud>,
    params: &UnifyParams,
    name: impl Into<String>,
) -> CloudResult<Cloud> {
    params.validate()?;
    let _timer = OperationTimer::new("unify");

    let mut voxels: HashMap<VoxelKey, Accumulator> = HashMap::new();
    let mut inputs = 0;
    let mut input_points = 0;

    for cloud in clouds {
        let transform = PoseTransform::new(cloud.pose(), cloud.name())?;
        for point in cloud.points() {
            let position = transform.point(&point.position);
            let normal = transform.normal_unnormalized(&point.normal);
            voxels
                .entry(voxel_key(&position, params.resolution))
                .or_default()
                .add(&position, &normal, point);
        }
        inputs += 1;
        input_points += cloud.len();
    }

    let mut cells: Vec<(VoxelKey, Accumulator)> = voxels.into_iter().collect();
    cells.sort_unstable_by_key(|(key, _)| *key);
    let points: Vec<Point> = cells.iter().map(|(_, acc)| acc.finish()).collect();

    info!(
        clouds = inputs,
        input_points,
        output_points = points.len(),
        resolution = params.resolution,
        "Unified clouds"
    );

    Ok(Cloud::with_points(name, points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix4, Rotation3};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_voxel_key_floors() {
        assert_eq!(voxel_key(&Point3::new(0.5, -0.5, 1.0), 1.0), [0, -1, 1]);
        assert_eq!(voxel_key(&Point3::new(-2.0, 2.99, 0.0), 2.0), [-1, 1, 0]);
    }

    #[test]
    fn test_merges_points_in_same_voxel() {
        let mut a = Point::with_normal(Point3::new(0.1, 0.1, 0.1), Vector3::x());
        a.color = Vector3::new(1.0, 0.0, 0.0);
        a.density = 2.0;
        let mut b = Point::with_normal(Point3::new(0.3, 0.5, 0.7), Vector3::y());
        b.color = Vector3::new(0.0, 0.0, 1.0);
        b.density = 4.0;
        let cloud = Cloud::with_points("pair", vec![a, b]);

        let merged = unify([&cloud], &UnifyParams::with_resolution(1.0), "merged").unwrap();
        assert_eq!(merged.len(), 1);
        let p = merged.points()[0];
        assert_relative_eq!(p.position, Point3::new(0.2, 0.3, 0.4), epsilon = 1e-12);
        assert_relative_eq!(p.color, Vector3::new(0.5, 0.0, 0.5), epsilon = 1e-12);
        assert_relative_eq!(p.density, 3.0);
        assert_relative_eq!(p.normal, Vector3::new(1.0, 1.0, 0.0).normalize(), epsilon = 1e-12);
        assert_eq!(merged.name(), "merged");
    }

    #[test]
    fn test_opposite_normals_cancel_to_zero() {
        let cloud = Cloud::with_points(
            "opposed",
            vec![
                Point::with_normal(Point3::new(0.1, 0.1, 0.1), Vector3::z()),
                Point::with_normal(Point3::new(0.2, 0.2, 0.2), -Vector3::z()),
            ],
        );
        let merged = unify([&cloud], &UnifyParams::default(), "m").unwrap();
        assert_eq!(merged.points()[0].normal, Vector3::zeros());
    }

    #[test]
    fn test_applies_poses() {
        let local = Cloud::with_points(
            "local",
            vec![Point::with_normal(Point3::new(1.0, 0.0, 0.0), Vector3::x())],
        );
        let mut moved = local.clone();
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2);
        let pose = Matrix4::new_translation(&Vector3::new(0.0, 0.0, 10.0)) * rotation.to_homogeneous();
        moved.set_pose(pose);

        let merged = unify([&local, &moved], &UnifyParams::with_resolution(0.5), "m").unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(*merged.pose(), Matrix4::identity());

        let rotated = merged
            .points()
            .iter()
            .find(|p| p.position.z > 5.0)
            .unwrap();
        assert_relative_eq!(rotated.position, Point3::new(0.0, 1.0, 10.0), epsilon = 1e-12);
        assert_relative_eq!(rotated.normal, Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_unify_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(11);
        let points: Vec<Point> = (0..2000)
            .map(|_| {
                let mut p = Point::with_normal(
                    Point3::new(
                        rng.gen_range(-5.0..5.0),
                        rng.gen_range(-5.0..5.0),
                        rng.gen_range(-5.0..5.0),
                    ),
                    Vector3::new(rng.gen_range(-1.0..1.0), 1.0, 0.0).normalize(),
                );
                p.color = Vector3::new(rng.gen_range(0.0..1.0), 0.5, 0.25);
                p.density = rng.gen_range(0.0..10.0);
                p
            })
            .collect();
        let cloud = Cloud::with_points("random", points);
        let params = UnifyParams::with_resolution(0.75);

        let once = unify([&cloud], &params, "once").unwrap();
        let twice = unify([&once], &params, "twice").unwrap();
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.points().iter().zip(twice.points()) {
            assert_relative_eq!(a.position, b.position, epsilon = 1e-12);
            assert_relative_eq!(a.normal, b.normal, epsilon = 1e-12);
            assert_relative_eq!(a.color, b.color, epsilon = 1e-12);
            assert_relative_eq!(a.density, b.density, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rejects_bad_resolution() {
        let cloud = Cloud::from_positions("c", &[Point3::origin()]);
        for resolution in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = unify([&cloud], &UnifyParams::with_resolution(resolution), "m").unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::Precondition);
        }
    }

    #[test]
    fn test_empty_input() {
        let clouds: Vec<Cloud> = Vec::new();
        let merged = unify(&clouds, &UnifyParams::default(), "empty").unwrap();
        assert!(merged.is_empty());
    }
}
