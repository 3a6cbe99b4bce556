//! Point cloud processing for merging 3D scans.
//!
//! This crate loads scanned point clouds, derives per-point attributes and
//! fuses several scans into one cloud:
//!
//! - **Spatial index**: exact k-nearest-neighbor search ([`KdTree`])
//! - **Normals**: PCA normals with MST-based consistent orientation
//! - **Density**: local density estimation and low-density outlier culling
//! - **Registration**: trimmed ICP between two posed scans
//! - **Unification**: voxel-grid merge of any number of posed scans
//! - **File I/O**: ASCII PLY load and store
//!
//! # Frames
//!
//! Every [`Cloud`] stores its points in a local frame together with a 4×4
//! pose mapping them into a shared global frame. Registration only changes
//! poses; unification bakes them in and produces a cloud at identity pose.
//!
//! # Quick Start
//!
//! ```no_run
//! use pointfuse::{CloudSet, IcpParams, NormalParams, NoProgress, UnifyParams};
//!
//! let mut set = CloudSet::new();
//! set.load_new("front.ply", "front").unwrap();
//! set.load_new("back.ply", "back").unwrap();
//!
//! // Align the second scan onto the first, then merge them.
//! set.register(&IcpParams::default(), &NoProgress).unwrap();
//! let merged = set.unify(&UnifyParams::with_resolution(0.5), "merged").unwrap();
//! println!("{} points after merge", merged.len());
//!
//! let mut cloud = set.clouds()[0].clone();
//! pointfuse::recalc_normals(&mut cloud, &NormalParams::with_k(12), &NoProgress).unwrap();
//! cloud.store("merged.ply").unwrap();
//! ```
//!
//! # Progress
//!
//! Long-running operations take a `&dyn` [`ProgressSink`]. Pass
//! [`NoProgress`] to ignore progress, [`LogProgress`] to emit `tracing`
//! events, or a [`CallbackProgress`] to drive a UI.
//!
//! # Feature Flags
//!
//! - `config` (default): serde support for all parameter structs and the
//!   TOML/JSON [`ProcessingConfig`].

mod error;
pub mod tracing_ext;
mod types;

pub mod collection;
#[cfg(feature = "config")]
pub mod config;
pub mod density;
pub mod graph;
pub mod io;
pub mod kdtree;
pub mod normals;
pub mod progress;
pub mod registration;
pub mod render;
pub mod unify;

// Core types
pub use error::{CloudError, CloudResult, ErrorCode, ErrorKind, RecoverySuggestion};
pub use types::{Cloud, Point, PoseTransform};

// Spatial index and graph
pub use graph::{Edge, ProximityGraph, SpanningTree, TreeEdge, minimum_spanning_tree};
pub use kdtree::{KdTree, Neighbor, Position};

// Operations
pub use collection::CloudSet;
pub use density::{
    CullParams, CullReport, DensityParams, compute_densities, cull, ensure_density, recalc_density,
};
pub use io::{read_ply, write_ply};
pub use normals::{NormalParams, NormalReport, estimate_normals, orient_normals, recalc_normals};
pub use registration::{Correspondence, IcpParams, IcpResult, icp, kabsch};
pub use render::{GpuVertex, RenderSnapshot, graph_lines};
pub use unify::{UnifyParams, unify};

#[cfg(feature = "config")]
pub use config::{ConfigError, ProcessingConfig};

pub use progress::{
    CallbackProgress, LogProgress, NoProgress, Progress, ProgressCallback, ProgressSink,
    ProgressTracker,
};
pub use tracing_ext::{OperationTimer, log_cloud_stats};
