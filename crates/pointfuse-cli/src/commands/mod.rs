//! Subcommand implementations.

pub mod config;
pub mod cull;
pub mod density;
pub mod info;
pub mod normals;
pub mod register;
pub mod unify;

use std::path::Path;

use anyhow::{Context, Result};
use pointfuse::{Cloud, log_cloud_stats};

/// Load a PLY file, naming the cloud after the file stem.
pub fn load_cloud(path: &Path) -> Result<Cloud> {
    let cloud = Cloud::load(path)
        .with_context(|| format!("Failed to load point cloud from {:?}", path))?;
    log_cloud_stats(&cloud, "loaded");
    Ok(cloud)
}

/// Store a cloud, with the path in the error context.
pub fn store_cloud(cloud: &Cloud, path: &Path) -> Result<()> {
    cloud
        .store(path)
        .with_context(|| format!("Failed to save point cloud to {:?}", path))
}
