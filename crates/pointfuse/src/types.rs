//! Core point cloud data types.

use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

use crate::error::{CloudError, CloudResult};

/// A scanned point with its derived attributes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// 3D position in the cloud's local frame.
    pub position: Point3<f64>,

    /// Unit surface normal, or zero when undefined.
    pub normal: Vector3<f64>,

    /// RGB color with components in [0, 1].
    pub color: Vector3<f64>,

    /// Local point density. Only meaningful after density estimation.
    pub density: f64,
}

impl Point {
    /// Create a white point with no normal.
    #[inline]
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            normal: Vector3::zeros(),
            color: Vector3::new(1.0, 1.0, 1.0),
            density: 0.0,
        }
    }

    /// Create a point from raw coordinates.
    #[inline]
    pub fn from_coords(x: f64, y: f64, z: f64) -> Self {
        Self::new(Point3::new(x, y, z))
    }

    /// Create a point with position and normal.
    #[inline]
    pub fn with_normal(position: Point3<f64>, normal: Vector3<f64>) -> Self {
        Self {
            normal,
            ..Self::new(position)
        }
    }

    /// Whether the normal is defined (non-zero).
    #[inline]
    pub fn has_normal(&self) -> bool {
        self.normal != Vector3::zeros()
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(Point3::origin())
    }
}

/// An ordered set of points with a pose and a display name.
///
/// The points live in the cloud's local frame; `pose` maps them into the
/// shared global frame. Mutable access to the points or the pose drops the
/// cached densities and bumps the render generation.
#[derive(Debug, Clone)]
pub struct Cloud {
    points: Vec<Point>,
    pose: Matrix4<f64>,
    name: String,
    density_k: Option<usize>,
    generation: u64,
}

impl Cloud {
    /// Create an empty cloud at identity pose.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_points(name, Vec::new())
    }

    /// Create a cloud owning `points`, at identity pose.
    pub fn with_points(name: impl Into<String>, points: Vec<Point>) -> Self {
        Self {
            points,
            pose: Matrix4::identity(),
            name: name.into(),
            density_k: None,
            generation: 0,
        }
    }

    /// Create a cloud of white, normal-less points.
    pub fn from_positions(name: impl Into<String>, positions: &[Point3<f64>]) -> Self {
        Self::with_points(name, positions.iter().map(|&p| Point::new(p)).collect())
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the cloud.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// The points in local coordinates.
    #[inline]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Mutable access to the points. Invalidates cached densities and marks
    /// the render state stale.
    pub fn points_mut(&mut self) -> &mut Vec<Point> {
        self.invalidate();
        &mut self.points
    }

    /// Append a point.
    pub fn push(&mut self, point: Point) {
        self.points_mut().push(point);
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the cloud has no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether any point has a defined normal.
    pub fn has_normals(&self) -> bool {
        self.points.iter().any(Point::has_normal)
    }

    /// Local-frame axis-aligned bounding box.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = self.points.first()?.position;
        let mut min = first;
        let mut max = first;

        for point in &self.points[1..] {
            let p = &point.position;
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }

        Some((min, max))
    }

    /// Local-frame centroid.
    pub fn centroid(&self) -> Option<Point3<f64>> {
        if self.points.is_empty() {
            return None;
        }
        let sum = self
            .points
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.position.coords);
        Some(Point3::from(sum / self.points.len() as f64))
    }

    /// The pose mapping local coordinates into the global frame.
    #[inline]
    pub fn pose(&self) -> &Matrix4<f64> {
        &self.pose
    }

    /// Replace the pose.
    pub fn set_pose(&mut self, pose: Matrix4<f64>) {
        self.pose = pose;
        self.generation += 1;
    }

    /// Mutable access to the pose. Marks the render state stale.
    pub fn pose_mut(&mut self) -> &mut Matrix4<f64> {
        self.generation += 1;
        &mut self.pose
    }

    /// The `k` the stored densities were computed with, if still valid.
    #[inline]
    pub fn density_k(&self) -> Option<usize> {
        self.density_k
    }

    pub(crate) fn mark_densities(&mut self, k: usize) {
        self.density_k = Some(k);
    }

    /// Counter bumped by every structural or pose mutation.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a render snapshot taken at `generation` is out of date.
    #[inline]
    pub fn is_render_stale(&self, generation: u64) -> bool {
        generation != self.generation
    }

    /// Bake the pose into the points and reset it to identity.
    ///
    /// Normals are carried by the inverse-transpose of the pose's linear
    /// part and re-normalized.
    pub fn apply_pose(&mut self) -> CloudResult<()> {
        let transform = PoseTransform::new(&self.pose, &self.name)?;
        for point in self.points_mut() {
            point.position = transform.point(&point.position);
            point.normal = transform.normal(&point.normal);
        }
        self.set_pose(Matrix4::identity());
        Ok(())
    }

    fn invalidate(&mut self) {
        self.density_k = None;
        self.generation += 1;
    }
}

impl Default for Cloud {
    fn default() -> Self {
        Self::new("(unnamed)")
    }
}

/// A pose prepared for mapping positions and normals into the global frame.
#[derive(Debug, Clone, Copy)]
pub struct PoseTransform {
    matrix: Matrix4<f64>,
    normal_matrix: Matrix3<f64>,
}

impl PoseTransform {
    /// Prepare `pose`; fails if its linear part is singular.
    pub fn new(pose: &Matrix4<f64>, cloud: &str) -> CloudResult<Self> {
        let linear: Matrix3<f64> = pose.fixed_view::<3, 3>(0, 0).into_owned();
        let inverse = linear
            .try_inverse()
            .ok_or_else(|| CloudError::SingularTransform {
                cloud: cloud.to_string(),
            })?;
        Ok(Self {
            matrix: *pose,
            normal_matrix: inverse.transpose(),
        })
    }

    /// Map a position.
    #[inline]
    pub fn point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.matrix.transform_point(p)
    }

    /// Map a normal, re-normalizing it. Zero normals stay zero.
    #[inline]
    pub fn normal(&self, n: &Vector3<f64>) -> Vector3<f64> {
        let mapped = self.normal_matrix * n;
        mapped.try_normalize(0.0).unwrap_or_else(Vector3::zeros)
    }

    /// Map a normal without re-normalizing it.
    #[inline]
    pub fn normal_unnormalized(&self, n: &Vector3<f64>) -> Vector3<f64> {
        self.normal_matrix * n
    }
}
