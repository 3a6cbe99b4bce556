//! GPU-ready vertex snapshots of clouds.
//!
//! A renderer uploads [`RenderSnapshot::as_bytes`] into a vertex buffer and
//! keeps the snapshot's generation; [`Cloud::is_render_stale`] tells it when
//! to re-upload.

use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix4, Point3, Vector3};

use crate::graph::ProximityGraph;
use crate::types::{Cloud, Point};

/// Interleaved point vertex.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuVertex {
    /// Local-frame position.
    pub position: [f32; 3],
    /// Unit normal, or zero.
    pub normal: [f32; 3],
    /// RGB in [0, 1].
    pub color: [f32; 3],
}

impl GpuVertex {
    /// Vertex for a cloud point.
    pub fn from_point(point: &Point) -> Self {
        Self {
            position: to_f32(&point.position.coords),
            normal: to_f32(&point.normal),
            color: to_f32(&point.color),
        }
    }

    fn line_end(position: &Point3<f64>, normal: &Vector3<f64>, color: [f32; 3]) -> Self {
        Self {
            position: to_f32(&position.coords),
            normal: to_f32(normal),
            color,
        }
    }
}

#[inline]
fn to_f32(v: &Vector3<f64>) -> [f32; 3] {
    [v.x as f32, v.y as f32, v.z as f32]
}

/// Vertex data and model matrix of one cloud at one generation.
#[derive(Debug, Clone)]
pub struct RenderSnapshot {
    /// One vertex per point, in point order.
    pub vertices: Vec<GpuVertex>,
    /// The cloud's pose, column-major.
    pub model: [[f32; 4]; 4],
    /// Generation of the cloud when the snapshot was taken.
    pub generation: u64,
}

impl RenderSnapshot {
    /// Raw bytes of the vertex array.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Stride of one vertex in bytes.
    pub const fn stride() -> usize {
        std::mem::size_of::<GpuVertex>()
    }
}

/// Column-major `f32` copy of a pose.
pub fn model_matrix(pose: &Matrix4<f64>) -> [[f32; 4]; 4] {
    let mut model = [[0.0f32; 4]; 4];
    for (c, column) in model.iter_mut().enumerate() {
        for (r, value) in column.iter_mut().enumerate() {
            *value = pose[(r, c)] as f32;
        }
    }
    model
}

impl Cloud {
    /// Capture the vertex data and pose for rendering.
    pub fn render_snapshot(&self) -> RenderSnapshot {
        RenderSnapshot {
            vertices: self.points().iter().map(GpuVertex::from_point).collect(),
            model: model_matrix(self.pose()),
            generation: self.generation(),
        }
    }

    /// Line-list vertices drawing each defined normal as a segment of length
    /// `scale`, colored by the absolute normal components.
    pub fn normal_lines(&self, scale: f64) -> Vec<GpuVertex> {
        self.points()
            .iter()
            .filter(|p| p.has_normal())
            .flat_map(|p| {
                let color = to_f32(&p.normal.abs());
                let tip = p.position + p.normal * scale;
                [
                    GpuVertex::line_end(&p.position, &p.normal, color),
                    GpuVertex::line_end(&tip, &p.normal, color),
                ]
            })
            .collect()
    }
}

/// Line-list vertices for every edge of a proximity graph over `cloud`.
///
/// Edges are colored from white (parallel normals) to red (perpendicular).
pub fn graph_lines(cloud: &Cloud, graph: &ProximityGraph) -> Vec<GpuVertex> {
    let points = cloud.points();
    graph
        .edges()
        .iter()
        .filter(|e| e.i < points.len() && e.j < points.len())
        .flat_map(|e| {
            let shade = (1.0 - e.weight).clamp(0.0, 1.0) as f32;
            let color = [1.0, shade, shade];
            [
                GpuVertex::line_end(&points[e.i].position, &points[e.i].normal, color),
                GpuVertex::line_end(&points[e.j].position, &points[e.j].normal, color),
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;

    #[test]
    fn test_vertex_layout() {
        assert_eq!(RenderSnapshot::stride(), 36);
        let zero = GpuVertex::zeroed();
        assert_eq!(zero.position, [0.0; 3]);
    }

    #[test]
    fn test_snapshot_contents() {
        let mut cloud = Cloud::with_points(
            "c",
            vec![Point::with_normal(Point3::new(1.0, 2.0, 3.0), Vector3::z())],
        );
        cloud.set_pose(Matrix4::new_translation(&Vector3::new(4.0, 5.0, 6.0)));

        let snapshot = cloud.render_snapshot();
        assert_eq!(snapshot.vertices[0].position, [1.0, 2.0, 3.0]);
        assert_eq!(snapshot.vertices[0].normal, [0.0, 0.0, 1.0]);
        assert_eq!(snapshot.vertices[0].color, [1.0, 1.0, 1.0]);
        assert_eq!(snapshot.model[3], [4.0, 5.0, 6.0, 1.0]);
        assert_eq!(snapshot.as_bytes().len(), 36);
    }

    #[test]
    fn test_snapshot_staleness() {
        let mut cloud = Cloud::from_positions("c", &[Point3::origin()]);
        let snapshot = cloud.render_snapshot();
        assert!(!cloud.is_render_stale(snapshot.generation));

        cloud.push(Point::from_coords(1.0, 0.0, 0.0));
        assert!(cloud.is_render_stale(snapshot.generation));

        let snapshot = cloud.render_snapshot();
        *cloud.pose_mut() = Matrix4::new_scaling(2.0);
        assert!(cloud.is_render_stale(snapshot.generation));
    }

    #[test]
    fn test_normal_lines() {
        let cloud = Cloud::with_points(
            "c",
            vec![
                Point::with_normal(Point3::origin(), -Vector3::x()),
                Point::from_coords(5.0, 5.0, 5.0),
            ],
        );
        let lines = cloud.normal_lines(0.5);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].position, [0.0, 0.0, 0.0]);
        assert_eq!(lines[1].position, [-0.5, 0.0, 0.0]);
        assert_eq!(lines[0].color, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_graph_lines() {
        let cloud = Cloud::with_points(
            "c",
            vec![
                Point::with_normal(Point3::origin(), Vector3::z()),
                Point::with_normal(Point3::new(1.0, 0.0, 0.0), Vector3::z()),
                Point::with_normal(Point3::new(0.0, 1.0, 0.0), Vector3::x()),
            ],
        );
        let graph = ProximityGraph::build(cloud.points(), 2, &NoProgress).unwrap();
        let lines = graph_lines(&cloud, &graph);
        assert_eq!(lines.len(), graph.edge_count() * 2);
        assert!(lines.iter().any(|v| v.color == [1.0, 1.0, 1.0]));
        assert!(lines.iter().any(|v| v.color == [1.0, 0.0, 0.0]));
    }
}
