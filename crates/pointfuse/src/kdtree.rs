//! Exact k-nearest-neighbor search over a borrowed point slice.
//!
//! The tree is an arena of nodes over a permutation of point indices. Each
//! internal node splits its slice along the axis of largest bounding-box
//! extent at the exact median; points with `coord <= value` go left and
//! points with `coord > value` go right. When many points share the median
//! coordinate the split index is walked down until the partition is proper;
//! a slice whose points are all identical becomes a single leaf.
//!
//! The tree borrows the points it was built from, so it cannot outlive a
//! mutation of the owning cloud.
//!
//! # Example
//!
//! ```
//! use nalgebra::Point3;
//! use pointfuse::kdtree::KdTree;
//!
//! let points = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(5.0, 0.0, 0.0),
//! ];
//! let tree = KdTree::new(&points);
//! let neighbors = tree.knn(&Point3::new(0.9, 0.0, 0.0), 2).unwrap();
//! assert_eq!(neighbors[0].index, 1);
//! assert_eq!(neighbors.last().unwrap().index, 0);
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use nalgebra::Point3;

use crate::error::{CloudError, CloudResult};
use crate::types::Point;

/// Anything with a 3D position can be indexed.
pub trait Position {
    fn position(&self) -> &Point3<f64>;
}

impl Position for Point {
    #[inline]
    fn position(&self) -> &Point3<f64> {
        &self.position
    }
}

impl Position for Point3<f64> {
    #[inline]
    fn position(&self) -> &Point3<f64> {
        self
    }
}

/// One result of a k-NN query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index into the slice the tree was built from.
    pub index: usize,
    /// Squared Euclidean distance to the query.
    pub distance_squared: f64,
}

impl Neighbor {
    /// Euclidean distance to the query.
    #[inline]
    pub fn distance(&self) -> f64 {
        self.distance_squared.sqrt()
    }
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Leaf {
        start: usize,
        end: usize,
    },
    Split {
        dim: usize,
        value: f64,
        left: usize,
        right: usize,
    },
}

/// A KD-tree over `&[P]`.
#[derive(Debug)]
pub struct KdTree<'a, P: Position = Point> {
    points: &'a [P],
    indices: Vec<usize>,
    nodes: Vec<Node>,
    root: usize,
    min_leaf: usize,
}

impl<'a, P: Position> KdTree<'a, P> {
    /// Build with unlimited depth and single-point leaves.
    pub fn new(points: &'a [P]) -> Self {
        Self::build(points, usize::MAX, 1)
    }

    /// Build a tree.
    ///
    /// A slice is split while it holds at least `2 * min_leaf` points and
    /// fewer than `max_depth` levels lie above it.
    pub fn build(points: &'a [P], max_depth: usize, min_leaf: usize) -> Self {
        let mut tree = Self {
            points,
            indices: (0..points.len()).collect(),
            nodes: Vec::new(),
            root: 0,
            min_leaf: min_leaf.max(1),
        };
        tree.root = tree.build_node(0, points.len(), max_depth);
        tree
    }

    /// Number of indexed points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the tree indexes no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of arena nodes (internal and leaves).
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The indexed points.
    #[inline]
    pub fn points(&self) -> &'a [P] {
        self.points
    }

    #[inline]
    fn coord(&self, slot: usize, dim: usize) -> f64 {
        self.points[self.indices[slot]].position()[dim]
    }

    fn build_node(&mut self, start: usize, end: usize, depth_left: usize) -> usize {
        if end - start < 2 * self.min_leaf || depth_left == 0 {
            return self.push(Node::Leaf { start, end });
        }

        let Some(dim) = self.widest_axis(start, end) else {
            // Every point in the slice is identical.
            return self.push(Node::Leaf { start, end });
        };

        let points = self.points;
        self.indices[start..end].sort_by(|&a, &b| {
            points[a].position()[dim].total_cmp(&points[b].position()[dim])
        });

        let Some((mid, value)) = self.find_split(start, end, dim) else {
            return self.push(Node::Leaf { start, end });
        };

        let left = self.build_node(start, mid, depth_left - 1);
        let right = self.build_node(mid, end, depth_left - 1);
        self.push(Node::Split {
            dim,
            value,
            left,
            right,
        })
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Axis of largest extent, or `None` when the extent is zero on all axes.
    fn widest_axis(&self, start: usize, end: usize) -> Option<usize> {
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for &i in &self.indices[start..end] {
            let p = self.points[i].position();
            for d in 0..3 {
                min[d] = min[d].min(p[d]);
                max[d] = max[d].max(p[d]);
            }
        }

        let mut best = 0;
        for d in 1..3 {
            if max[d] - min[d] > max[best] - min[best] {
                best = d;
            }
        }
        (max[best] - min[best] > 0.0).then_some(best)
    }

    /// First slot of the right half and the split value, for a slice sorted
    /// along `dim`.
    fn find_split(&self, start: usize, end: usize, dim: usize) -> Option<(usize, f64)> {
        let count = end - start;
        let odd = count % 2 == 1;
        let base = if odd {
            start + (count - 1) / 2
        } else {
            start + count / 2 - 1
        };

        for median in (start..=base).rev() {
            let value = if odd {
                self.coord(median, dim)
            } else {
                0.5 * (self.coord(median, dim) + self.coord(median + 1, dim))
            };

            let mut split = median;
            while split < end && self.coord(split, dim) <= value {
                split += 1;
            }
            if split < end {
                return Some((split, value));
            }
        }
        None
    }

    /// The `k` nearest points to `query`, nearest first.
    ///
    /// The last element is the k-th nearest. Ties are broken by the
    /// coordinates of the candidate (x, then y, then z) and finally by its
    /// index, so the result set is reproducible. Returns every point when
    /// `k` exceeds the tree size.
    ///
    /// # Errors
    ///
    /// `k == 0` is rejected as an invalid parameter.
    pub fn knn(&self, query: &Point3<f64>, k: usize) -> CloudResult<Vec<Neighbor>> {
        CloudError::require_k("k", k)?;
        let k = k.min(self.points.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut best = BinaryHeap::with_capacity(k + 1);
        self.search(self.root, query, k, &mut best);

        Ok(best
            .into_sorted_vec()
            .into_iter()
            .map(|c| Neighbor {
                index: c.index,
                distance_squared: c.distance_squared,
            })
            .collect())
    }

    /// The nearest point to `query`, if any.
    pub fn nearest(&self, query: &Point3<f64>) -> Option<Neighbor> {
        self.knn(query, 1).ok()?.into_iter().next()
    }

    fn search(&self, node: usize, query: &Point3<f64>, k: usize, best: &mut BinaryHeap<Candidate>) {
        match self.nodes[node] {
            Node::Leaf { start, end } => {
                for &index in &self.indices[start..end] {
                    let position = *self.points[index].position();
                    let candidate = Candidate {
                        distance_squared: (position - query).norm_squared(),
                        position,
                        index,
                    };
                    if best.len() < k {
                        best.push(candidate);
                    } else if best.peek().is_some_and(|worst| candidate < *worst) {
                        best.pop();
                        best.push(candidate);
                    }
                }
            }
            Node::Split {
                dim,
                value,
                left,
                right,
            } => {
                let diff = query[dim] - value;
                let (near, far) = if diff <= 0.0 {
                    (left, right)
                } else {
                    (right, left)
                };

                self.search(near, query, k, best);

                // Equal distances must still be visited: a tie on the far
                // side may win the coordinate tie-break.
                let plane_squared = diff * diff;
                if best.len() < k
                    || best
                        .peek()
                        .is_some_and(|worst| plane_squared <= worst.distance_squared)
                {
                    self.search(far, query, k, best);
                }
            }
        }
    }
}

/// Heap entry; the heap's maximum is the current worst of the k best.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance_squared: f64,
    position: Point3<f64>,
    index: usize,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance_squared
            .total_cmp(&other.distance_squared)
            .then_with(|| self.position.x.total_cmp(&other.position.x))
            .then_with(|| self.position.y.total_cmp(&other.position.y))
            .then_with(|| self.position.z.total_cmp(&other.position.z))
            .then_with(|| self.index.cmp(&other.index))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_points(n: usize, seed: u64) -> Vec<Point3<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                Point3::new(
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                )
            })
            .collect()
    }

    fn brute_force(points: &[Point3<f64>], query: &Point3<f64>, k: usize) -> Vec<usize> {
        let mut all: Vec<(f64, usize)> = points
            .iter()
            .enumerate()
            .map(|(i, p)| ((p - query).norm_squared(), i))
            .collect();
        all.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        all.into_iter().take(k).map(|(_, i)| i).collect()
    }

    /// Walks the arena and checks the partition invariant for every node.
    fn check_partition<P: Position>(tree: &KdTree<'_, P>, node: usize) -> Vec<usize> {
        match tree.nodes[node] {
            Node::Leaf { start, end } => tree.indices[start..end].to_vec(),
            Node::Split {
                dim,
                value,
                left,
                right,
            } => {
                let l = check_partition(tree, left);
                let r = check_partition(tree, right);
                assert!(!l.is_empty() && !r.is_empty());
                for &i in &l {
                    assert!(tree.points[i].position()[dim] <= value);
                }
                for &i in &r {
                    assert!(tree.points[i].position()[dim] > value);
                }
                l.into_iter().chain(r).collect()
            }
        }
    }

    #[test]
    fn test_empty_tree() {
        let points: Vec<Point3<f64>> = Vec::new();
        let tree = KdTree::new(&points);
        assert!(tree.is_empty());
        assert!(tree.knn(&Point3::origin(), 3).unwrap().is_empty());
        assert!(tree.nearest(&Point3::origin()).is_none());
    }

    #[test]
    fn test_zero_k_rejected() {
        let points = random_points(10, 1);
        let tree = KdTree::new(&points);
        let err = tree.knn(&Point3::origin(), 0).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Precondition);
    }

    #[test]
    fn test_k_larger_than_cloud_returns_all() {
        let points = random_points(7, 2);
        let tree = KdTree::new(&points);
        let result = tree.knn(&Point3::origin(), 50).unwrap();
        assert_eq!(result.len(), 7);
        for pair in result.windows(2) {
            assert!(pair[0].distance_squared <= pair[1].distance_squared);
        }
    }

    #[test]
    fn test_partition_invariant() {
        let points = random_points(500, 3);
        for min_leaf in [1, 4, 10] {
            let tree = KdTree::build(&points, usize::MAX, min_leaf);
            let mut covered = check_partition(&tree, tree.root);
            covered.sort_unstable();
            assert_eq!(covered, (0..points.len()).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_matches_brute_force() {
        let points = random_points(400, 4);
        let tree = KdTree::build(&points, usize::MAX, 10);
        for query in random_points(50, 5) {
            for k in [1, 5, 17] {
                let got: Vec<usize> = tree.knn(&query, k).unwrap().iter().map(|n| n.index).collect();
                assert_eq!(got, brute_force(&points, &query, k));
            }
        }
    }

    #[test]
    fn test_self_is_nearest() {
        let points = random_points(300, 6);
        let tree = KdTree::new(&points);
        for (i, p) in points.iter().enumerate() {
            let n = tree.nearest(p).unwrap();
            assert_eq!(n.index, i);
            assert_eq!(n.distance(), 0.0);
        }
    }

    #[test]
    fn test_identical_points_form_one_leaf() {
        let points = vec![Point3::new(1.0, 2.0, 3.0); 64];
        let tree = KdTree::build(&points, usize::MAX, 2);
        assert_eq!(tree.node_count(), 1);
        let result = tree.knn(&Point3::origin(), 5).unwrap();
        // All distances tie, so the index decides.
        let indices: Vec<usize> = result.iter().map(|n| n.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_many_points_share_median() {
        // Nine points at x = 1 and one at x = 0 force the median to walk down
        // to the first slot before a proper split appears.
        let mut points = vec![Point3::new(1.0, 0.0, 0.0); 9];
        points.push(Point3::new(0.0, 0.0, 0.0));
        let tree = KdTree::build(&points, usize::MAX, 1);
        let mut covered = check_partition(&tree, tree.root);
        covered.sort_unstable();
        assert_eq!(covered.len(), 10);
        let n = tree.nearest(&Point3::new(0.1, 0.0, 0.0)).unwrap();
        assert_eq!(n.index, 9);
    }

    #[test]
    fn test_tie_break_prefers_lower_coordinates() {
        let points = vec![
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, -1.0, 0.0),
        ];
        let tree = KdTree::new(&points);
        let result = tree.knn(&Point3::origin(), 2).unwrap();
        let indices: Vec<usize> = result.iter().map(|n| n.index).collect();
        assert_eq!(indices, vec![1, 3]);
    }

    #[test]
    fn test_depth_limit() {
        let points = random_points(100, 7);
        let tree = KdTree::build(&points, 0, 1);
        assert_eq!(tree.node_count(), 1);
        let query = Point3::new(0.5, 0.5, 0.5);
        let got: Vec<usize> = tree.knn(&query, 3).unwrap().iter().map(|n| n.index).collect();
        assert_eq!(got, brute_force(&points, &query, 3));
    }
}
