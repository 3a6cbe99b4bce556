//! Cross-validation of the k-NN index and derived quantities against the
//! `kiddo` crate.
//!
//! Run with: cargo test -p pointfuse --test cross_validation

use approx::assert_relative_eq;
use kiddo::SquaredEuclidean;
use nalgebra::Point3;
use pointfuse::{Cloud, DensityParams, KdTree, NoProgress, recalc_density};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// =============================================================================
// Test Data
// =============================================================================

fn random_positions(count: usize, seed: u64) -> Vec<Point3<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            Point3::new(
                rng.gen_range(-50.0..50.0),
                rng.gen_range(-50.0..50.0),
                rng.gen_range(-5.0..5.0),
            )
        })
        .collect()
}

fn kiddo_tree(points: &[Point3<f64>]) -> kiddo::KdTree<f64, 3> {
    let mut tree: kiddo::KdTree<f64, 3> = kiddo::KdTree::new();
    for (i, p) in points.iter().enumerate() {
        tree.add(&[p.x, p.y, p.z], i as u64);
    }
    tree
}

// =============================================================================
// k-NN
// =============================================================================

#[test]
fn test_knn_distances_match_kiddo() {
    let points = random_positions(5000, 1);
    let ours = KdTree::new(&points);
    let reference = kiddo_tree(&points);
    let queries = random_positions(200, 2);

    for k in [1, 5, 16, 64] {
        for query in &queries {
            let expected = reference.nearest_n::<SquaredEuclidean>(&[query.x, query.y, query.z], k);
            let actual = ours.knn(query, k).unwrap();

            assert_eq!(actual.len(), expected.len());
            for (a, e) in actual.iter().zip(&expected) {
                assert_relative_eq!(a.distance_squared, e.distance, max_relative = 1e-12);
            }
            // The nearest point is unique for continuous random data.
            assert_eq!(actual[0].index as u64, expected[0].item);
        }
    }
}

#[test]
fn test_nearest_matches_kiddo_for_members() {
    let points = random_positions(2000, 3);
    let ours = KdTree::new(&points);
    let reference = kiddo_tree(&points);

    for (i, p) in points.iter().enumerate().step_by(7) {
        let expected = reference.nearest_one::<SquaredEuclidean>(&[p.x, p.y, p.z]);
        let actual = ours.nearest(p).unwrap();
        assert_eq!(actual.index, i);
        assert_eq!(expected.item, i as u64);
        assert_eq!(actual.distance_squared, 0.0);
    }
}

// =============================================================================
// Density
// =============================================================================

#[test]
fn test_density_matches_kiddo_radius() {
    let positions = random_positions(3000, 4);
    let mut cloud = Cloud::from_positions("random", &positions);
    let k = 8;
    recalc_density(&mut cloud, &DensityParams { k }, &NoProgress).unwrap();

    let reference = kiddo_tree(&positions);
    for (point, position) in cloud.points().iter().zip(&positions).step_by(11) {
        let neighbors =
            reference.nearest_n::<SquaredEuclidean>(&[position.x, position.y, position.z], k + 1);
        let radius_squared = neighbors[k].distance;
        let expected = k as f64 / (std::f64::consts::PI * radius_squared);
        assert_relative_eq!(point.density, expected, max_relative = 1e-9);
    }
}
