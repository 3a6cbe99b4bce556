//! Tracing extensions for point cloud operations.
//!
//! This module provides structured logging and performance tracing. It
//! integrates with the `tracing` ecosystem to provide:
//!
//! - **Performance spans**: Track operation timing with [`OperationTimer`]
//! - **Structured fields**: Log point counts, bounds, timing
//! - **Progress events**: Emit progress updates for long-running operations
//!
//! # Usage
//!
//! Enable tracing by initializing a subscriber in your application:
//!
//! ```rust,ignore
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env())
//!     .init();
//!
//! // Set RUST_LOG=pointfuse=debug for detailed output
//! ```
//!
//! # Log Targets
//!
//! - `pointfuse::timing`: operation durations
//! - `pointfuse::cloud_state`: point counts and bounds
//! - `pointfuse::progress`: progress updates
//! - `pointfuse::io`: file loads and stores

use std::time::Instant;
use tracing::{Span, debug, info, trace, warn};

use crate::types::Cloud;

/// A performance timer that logs duration on drop.
///
/// ```rust,ignore
/// fn expensive_operation() {
///     let _timer = OperationTimer::new("expensive_operation");
///     // ... do work ...
/// } // Timer logs duration when dropped
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    span: Span,
}

impl OperationTimer {
    /// Create a new operation timer.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!("cloud_operation", operation = name);
        debug!(target: "pointfuse::timing", operation = name, "Starting operation");
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Create a timer that also records the number of points processed.
    pub fn with_context(name: &'static str, point_count: usize) -> Self {
        let span = tracing::info_span!("cloud_operation", operation = name, points = point_count);
        debug!(
            target: "pointfuse::timing",
            operation = name,
            points = point_count,
            "Starting operation"
        );
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Get the elapsed time.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Get the span for this timer.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let elapsed_ms = self.elapsed_ms();
        info!(
            target: "pointfuse::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", elapsed_ms),
            "Operation completed"
        );
    }
}

/// Log cloud statistics at debug level.
pub fn log_cloud_stats(cloud: &Cloud, context: &str) {
    let dims = cloud
        .bounds()
        .map(|(min, max)| max - min)
        .unwrap_or_default();

    debug!(
        target: "pointfuse::cloud_state",
        context = context,
        cloud = cloud.name(),
        points = cloud.len(),
        dimensions = format!("{:.3} x {:.3} x {:.3}", dims.x, dims.y, dims.z),
        "Cloud state"
    );
}

/// Log progress for a long-running operation.
pub fn log_progress(operation: &str, current: u64, total: u64) {
    let percent = if total > 0 {
        (current as f64 / total as f64 * 100.0) as u32
    } else {
        0
    };

    trace!(
        target: "pointfuse::progress",
        operation = operation,
        current = current,
        total = total,
        percent = percent,
        "Progress update"
    );
}

/// Log a file I/O operation.
pub fn log_io_operation(operation: &str, path: &std::path::Path, points: usize, success: bool) {
    if success {
        info!(
            target: "pointfuse::io",
            operation = operation,
            path = path.display().to_string(),
            points = points,
            "I/O operation completed"
        );
    } else {
        warn!(
            target: "pointfuse::io",
            operation = operation,
            path = path.display().to_string(),
            "I/O operation failed"
        );
    }
}

/// Macro for creating instrumented cloud operation spans.
#[macro_export]
macro_rules! cloud_span {
    ($name:expr, $cloud:expr) => {
        tracing::info_span!($name, cloud = $cloud.name(), points = $cloud.len())
    };
    ($name:expr, $cloud:expr, $($field:tt)*) => {
        tracing::info_span!(
            $name,
            cloud = $cloud.name(),
            points = $cloud.len(),
            $($field)*
        )
    };
}
