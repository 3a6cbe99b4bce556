//! PLY format conformance tests.
//!
//! Feeds hand-written PLY text through the reader and checks both the
//! accepted variants and every rejection rule.
//!
//! Run with: cargo test -p pointfuse --test format_conformance

use nalgebra::{Point3, Vector3};
use pointfuse::{Cloud, CloudSet, ErrorCode, ErrorKind, Point, read_ply, write_ply};
use tempfile::tempdir;

fn header(body: &str) -> String {
    format!("ply\nformat ascii 1.0\n{}", body)
}

fn assert_format_error(text: &str) {
    match read_ply(text.as_bytes(), "conformance.ply") {
        Ok(points) => panic!("accepted {} points from:\n{}", points.len(), text),
        Err(err) => {
            assert_eq!(err.kind(), ErrorKind::Format, "{}", err);
            assert_eq!(err.code(), ErrorCode::MalformedFile);
        }
    }
}

// =============================================================================
// Accepted Variants
// =============================================================================

#[test]
fn test_positions_only() {
    let text = header("element vertex 3\nproperty float x\nproperty float y\nproperty float z\nend_header\n0 0 0\n1 0 0\n0 1 0\n");
    let points = read_ply(text.as_bytes(), "p").unwrap();
    assert_eq!(points.len(), 3);
    assert_eq!(points[1].position, Point3::new(1.0, 0.0, 0.0));
    assert!(points.iter().all(|p| p.color == Vector3::new(1.0, 1.0, 1.0)));
}

#[test]
fn test_comments_are_ignored() {
    let text = "ply\ncomment made by a scanner\nformat ascii 1.0\ncomment units: mm\nelement vertex 1\nproperty float x\nend_header\n2.5\n";
    let points = read_ply(text.as_bytes(), "p").unwrap();
    assert_eq!(points[0].position.x, 2.5);
}

#[test]
fn test_float_colors_are_taken_as_is() {
    let text = header("element vertex 1\nproperty float red\nproperty float green\nproperty float blue\nend_header\n0.25 0.5 0.75\n");
    let points = read_ply(text.as_bytes(), "p").unwrap();
    assert_eq!(points[0].color, Vector3::new(0.25, 0.5, 0.75));
}

#[test]
fn test_empty_cloud() {
    let text = header("element vertex 0\nproperty float x\nend_header\n");
    assert!(read_ply(text.as_bytes(), "p").unwrap().is_empty());
}

// =============================================================================
// Rejections
// =============================================================================

#[test]
fn test_rejects_missing_magic() {
    assert_format_error("format ascii 1.0\nelement vertex 0\nproperty float x\nend_header\n");
}

#[test]
fn test_rejects_binary_encoding() {
    assert_format_error("ply\nformat binary_big_endian 1.0\nelement vertex 0\nproperty float x\nend_header\n");
}

#[test]
fn test_rejects_other_versions() {
    assert_format_error("ply\nformat ascii 2.0\nelement vertex 0\nproperty float x\nend_header\n");
}

#[test]
fn test_rejects_unknown_header_command() {
    assert_format_error(&header("element vertex 0\nproperty float x\nfrobnicate 3\nend_header\n"));
}

#[test]
fn test_rejects_multiple_elements() {
    assert_format_error(&header(
        "element vertex 1\nproperty float x\nelement face 0\nproperty list uchar int vertex_indices\nend_header\n1\n",
    ));
}

#[test]
fn test_rejects_non_vertex_element() {
    assert_format_error(&header("element point 1\nproperty float x\nend_header\n1\n"));
}

#[test]
fn test_rejects_zero_properties() {
    assert_format_error(&header("element vertex 0\nend_header\n"));
}

#[test]
fn test_rejects_unsupported_types() {
    for ty in ["double", "int", "char", "short", "ushort", "uint"] {
        assert_format_error(&header(&format!(
            "element vertex 1\nproperty {} x\nend_header\n1\n",
            ty
        )));
    }
    assert_format_error(&header(
        "element vertex 1\nproperty list uchar float x\nend_header\n1 1\n",
    ));
}

#[test]
fn test_rejects_unknown_property_name() {
    assert_format_error(&header("element vertex 1\nproperty float confidence\nend_header\n1\n"));
}

#[test]
fn test_rejects_truncated_body() {
    assert_format_error(&header(
        "element vertex 4\nproperty float x\nproperty float y\nend_header\n1 2\n3 4\n",
    ));
}

#[test]
fn test_rejects_garbage_values() {
    assert_format_error(&header("element vertex 1\nproperty float x\nend_header\nabc\n"));
    assert_format_error(&header("element vertex 1\nproperty uchar red\nend_header\n256\n"));
}

// =============================================================================
// Round Trip
// =============================================================================

#[test]
fn test_round_trip_preserves_f32_values() {
    let points: Vec<Point> = (0..50)
        .map(|i| {
            let t = i as f32 * 0.37;
            let mut p = Point::with_normal(
                Point3::new(f64::from(t), f64::from(-t * 2.0), f64::from(t.sin())),
                Vector3::new(0.0, 0.6, 0.8),
            );
            p.color = Vector3::new(f64::from(i as u8) / 255.0, 1.0, 0.0);
            p
        })
        .collect();

    let mut buffer = Vec::new();
    write_ply(&points, &mut buffer).unwrap();
    let loaded = read_ply(buffer.as_slice(), "round_trip").unwrap();

    assert_eq!(loaded.len(), points.len());
    for (a, b) in points.iter().zip(&loaded) {
        assert_eq!(a.position, b.position);
        assert_eq!(a.color, b.color);
        assert_eq!(b.normal, Vector3::new(0.0, f64::from(0.6f32), f64::from(0.8f32)));
    }
}

#[test]
fn test_failed_load_does_not_touch_collection() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("good.ply");
    let bad = dir.path().join("bad.ply");

    Cloud::from_positions("good", &[Point3::new(1.0, 2.0, 3.0)])
        .store(&good)
        .unwrap();
    std::fs::write(&bad, header("element vertex 5\nproperty float x\nend_header\n1\n")).unwrap();

    let mut set = CloudSet::new();
    set.load_new(&good, "good").unwrap();
    let err = set.load_new(&bad, "bad").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(err.location().unwrap().ends_with("bad.ply"));
    assert_eq!(set.len(), 1);
    assert_eq!(set.clouds()[0].name(), "good");
}
