//! An ordered set of loaded clouds.

use std::path::Path;

use tracing::info;

use crate::error::{CloudError, CloudResult};
use crate::progress::ProgressSink;
use crate::registration::{IcpParams, IcpResult, icp};
use crate::types::Cloud;
use crate::unify::{UnifyParams, unify};

/// The clouds of a session, in load order.
#[derive(Debug, Clone, Default)]
pub struct CloudSet {
    clouds: Vec<Cloud>,
}

impl CloudSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a PLY file and append it. On failure the set is unchanged.
    pub fn load_new(&mut self, path: impl AsRef<Path>, name: impl Into<String>) -> CloudResult<&mut Cloud> {
        let cloud = Cloud::load_named(path, name)?;
        Ok(self.push(cloud))
    }

    /// Append a cloud.
    pub fn push(&mut self, cloud: Cloud) -> &mut Cloud {
        self.clouds.push(cloud);
        let last = self.clouds.len() - 1;
        &mut self.clouds[last]
    }

    /// Remove and return the cloud at `index`.
    pub fn remove(&mut self, index: usize) -> Option<Cloud> {
        (index < self.clouds.len()).then(|| self.clouds.remove(index))
    }

    pub fn clouds(&self) -> &[Cloud] {
        &self.clouds
    }

    pub fn clouds_mut(&mut self) -> &mut [Cloud] {
        &mut self.clouds
    }

    pub fn get(&self, index: usize) -> Option<&Cloud> {
        self.clouds.get(index)
    }

    pub fn len(&self) -> usize {
        self.clouds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clouds.is_empty()
    }

    /// Total number of points over all clouds.
    pub fn point_count(&self) -> usize {
        self.clouds.iter().map(Cloud::len).sum()
    }

    /// Replace every cloud by their voxel-grid union.
    pub fn unify(&mut self, params: &UnifyParams, name: impl Into<String>) -> CloudResult<&Cloud> {
        let merged = unify(&self.clouds, params, name)?;
        info!(
            replaced = self.clouds.len(),
            points = merged.len(),
            "Replaced collection with unified cloud"
        );
        self.clouds = vec![merged];
        Ok(&self.clouds[0])
    }

    /// Align the second cloud onto the first.
    ///
    /// # Errors
    ///
    /// [`CloudError::CloudCount`] unless exactly two clouds are loaded, plus
    /// the errors of [`icp`].
    pub fn register(&mut self, params: &IcpParams, progress: &dyn ProgressSink) -> CloudResult<IcpResult> {
        let actual = self.clouds.len();
        let [first, second] = self.clouds.as_mut_slice() else {
            return Err(CloudError::CloudCount {
                expected: 2,
                actual,
            });
        };
        icp(first, second, params, progress)
    }
}

impl From<Vec<Cloud>> for CloudSet {
    fn from(clouds: Vec<Cloud>) -> Self {
        Self { clouds }
    }
}

impl IntoIterator for CloudSet {
    type Item = Cloud;
    type IntoIter = std::vec::IntoIter<Cloud>;

    fn into_iter(self) -> Self::IntoIter {
        self.clouds.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;
    use crate::progress::NoProgress;
    use nalgebra::Point3;

    fn cloud(name: &str, offset: f64) -> Cloud {
        let positions: Vec<Point3<f64>> = (0..20)
            .map(|i| Point3::new(i as f64 * 0.1 + offset, (i % 3) as f64, (i % 7) as f64 * 0.5))
            .collect();
        Cloud::from_positions(name, &positions)
    }

    #[test]
    fn test_push_remove() {
        let mut set = CloudSet::new();
        set.push(cloud("a", 0.0));
        set.push(cloud("b", 0.0));
        assert_eq!(set.len(), 2);
        assert_eq!(set.point_count(), 40);

        let removed = set.remove(0).unwrap();
        assert_eq!(removed.name(), "a");
        assert_eq!(set.get(0).unwrap().name(), "b");
        assert!(set.remove(5).is_none());
    }

    #[test]
    fn test_register_requires_two_clouds() {
        let mut set = CloudSet::from(vec![cloud("a", 0.0)]);
        let err = set.register(&IcpParams::default(), &NoProgress).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CloudCount);

        set.push(cloud("b", 0.0));
        set.push(cloud("c", 0.0));
        let err = set.register(&IcpParams::default(), &NoProgress).unwrap_err();
        match err {
            CloudError::CloudCount { expected, actual } => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 3);
            }
            other => panic!("Expected CloudCount, got {:?}", other),
        }
    }

    #[test]
    fn test_register_updates_second_pose() {
        let mut set = CloudSet::from(vec![cloud("a", 0.0), cloud("b", 0.02)]);
        let result = set
            .register(&IcpParams::default().with_iterations(10), &NoProgress)
            .unwrap();
        assert_eq!(set.clouds()[1].pose(), &result.pose);
        assert_eq!(*set.clouds()[0].pose(), nalgebra::Matrix4::identity());
    }

    #[test]
    fn test_unify_replaces_all() {
        let mut set = CloudSet::from(vec![cloud("a", 0.0), cloud("b", 100.0)]);
        let merged = set.unify(&UnifyParams::with_resolution(0.01), "merged").unwrap();
        assert_eq!(merged.len(), 40);
        assert_eq!(set.len(), 1);
        assert_eq!(set.clouds()[0].name(), "merged");
    }

    #[test]
    fn test_failed_load_leaves_set_untouched() {
        let mut set = CloudSet::from(vec![cloud("a", 0.0)]);
        assert!(set.load_new("/nonexistent/cloud.ply", "missing").is_err());
        assert_eq!(set.len(), 1);
    }
}
