//! Error types for point cloud operations with rich diagnostics.
//!
//! Every failure carries:
//! - A machine-readable error code for programmatic handling
//! - An [`ErrorKind`] grouping (format, geometry, precondition, I/O)
//! - A recovery suggestion
//! - Terminal-friendly display via miette
//!
//! # Error Codes
//!
//! Each error has a unique code in the format `CLOUD-XXXX`:
//! - `CLOUD-1xxx`: I/O errors (opening, reading, writing files)
//! - `CLOUD-2xxx`: Format errors (malformed point cloud files)
//! - `CLOUD-3xxx`: Geometry errors (computations that cannot complete on this data)
//! - `CLOUD-4xxx`: Precondition errors (invalid arguments)
//!
//! # Example
//!
//! ```
//! use pointfuse::{CloudError, ErrorCode, ErrorKind};
//!
//! let err = CloudError::invalid_parameter("k", "must be at least 1");
//! assert_eq!(err.code(), ErrorCode::InvalidParameter);
//! assert_eq!(err.kind(), ErrorKind::Precondition);
//! println!("Recovery: {}", err.recovery_suggestion());
//! ```

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for point cloud operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Coarse classification of a [`CloudError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed point cloud file.
    Format,
    /// The data does not support the requested computation.
    Geometry,
    /// The caller passed an invalid argument combination.
    Precondition,
    /// A file could not be opened, read or written.
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Format => "format error",
            ErrorKind::Geometry => "geometry error",
            ErrorKind::Precondition => "precondition error",
            ErrorKind::Io => "I/O error",
        };
        f.write_str(name)
    }
}

/// Machine-readable error codes.
///
/// Codes follow the pattern `CLOUD-XXXX` where:
/// - 1xxx = I/O errors
/// - 2xxx = Format errors
/// - 3xxx = Geometry errors
/// - 4xxx = Precondition errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // I/O errors (1xxx)
    /// CLOUD-1001: Failed to read file
    IoRead = 1001,
    /// CLOUD-1002: Failed to write file
    IoWrite = 1002,

    // Format errors (2xxx)
    /// CLOUD-2001: Malformed PLY header or body
    MalformedFile = 2001,

    // Geometry errors (3xxx)
    /// CLOUD-3001: Proximity graph has more than one connected component
    DisconnectedGraph = 3001,
    /// CLOUD-3002: Pose has a singular linear part
    SingularTransform = 3002,

    // Precondition errors (4xxx)
    /// CLOUD-4001: Parameter out of range
    InvalidParameter = 4001,
    /// CLOUD-4002: Wrong number of clouds for the operation
    CloudCount = 4002,
    /// CLOUD-4003: Operation needs at least one point
    EmptyCloud = 4003,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `CLOUD-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::IoRead => "CLOUD-1001",
            ErrorCode::IoWrite => "CLOUD-1002",
            ErrorCode::MalformedFile => "CLOUD-2001",
            ErrorCode::DisconnectedGraph => "CLOUD-3001",
            ErrorCode::SingularTransform => "CLOUD-3002",
            ErrorCode::InvalidParameter => "CLOUD-4001",
            ErrorCode::CloudCount => "CLOUD-4002",
            ErrorCode::EmptyCloud => "CLOUD-4003",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions for point cloud errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Re-export the file with a supported layout.
    ReexportFile { details: String },
    /// Check the environment (paths, permissions).
    CheckEnvironment { checks: Vec<String> },
    /// Adjust parameters for the operation.
    AdjustParameters { parameters: Vec<(String, String)> },
    /// Load or remove clouds so the collection has the right shape.
    AdjustCollection { description: String },
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::ReexportFile { details } => {
                write!(f, "Try re-exporting the cloud as {}", details)
            }
            RecoverySuggestion::CheckEnvironment { checks } => {
                write!(f, "Check: {}", checks.join(", "))
            }
            RecoverySuggestion::AdjustParameters { parameters } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|(k, v)| format!("{} = {}", k, v))
                    .collect();
                write!(f, "Try adjusting: {}", params.join(", "))
            }
            RecoverySuggestion::AdjustCollection { description } => {
                write!(f, "{}", description)
            }
        }
    }
}

/// Errors that can occur during point cloud operations.
#[derive(Debug, Error, Diagnostic)]
pub enum CloudError {
    /// Error opening or reading a file.
    #[error("failed to read point cloud from {path}")]
    #[diagnostic(
        code(pointfuse::io::read),
        help("Check that the file exists and is readable. Try: ls -la {}", path.display())
    )]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error creating or writing a file.
    #[error("failed to write point cloud to {path}")]
    #[diagnostic(
        code(pointfuse::io::write),
        help("Check that the directory exists and is writable")
    )]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed PLY data.
    #[error("malformed point cloud data in {source_name}: {details}")]
    #[diagnostic(
        code(pointfuse::format::malformed),
        help(
            "Only ASCII PLY 1.0 with a single `vertex` element and float/uchar properties named x, y, z, nx, ny, nz, red, green, blue is supported."
        )
    )]
    Format { source_name: String, details: String },

    /// The proximity graph used for normal orientation is not connected.
    #[error(
        "proximity graph is disconnected: spanning tree reached {reached} of {total} points with k = {k}"
    )]
    #[diagnostic(
        code(pointfuse::geometry::disconnected),
        help("Increase k so that every point is linked to the rest of the cloud.")
    )]
    DisconnectedGraph { reached: usize, total: usize, k: usize },

    /// A pose whose linear part cannot be inverted.
    #[error("pose of cloud '{cloud}' has a singular linear part")]
    #[diagnostic(
        code(pointfuse::geometry::singular_transform),
        help("Poses must be invertible affine transforms.")
    )]
    SingularTransform { cloud: String },

    /// Parameter outside of its valid range.
    #[error("invalid parameter {parameter}: {details}")]
    #[diagnostic(code(pointfuse::precondition::parameter))]
    InvalidParameter {
        parameter: &'static str,
        details: String,
    },

    /// Operation requires a specific number of clouds.
    #[error("operation requires exactly {expected} clouds, but {actual} are loaded")]
    #[diagnostic(
        code(pointfuse::precondition::cloud_count),
        help("Load or remove clouds until the collection has the required size.")
    )]
    CloudCount { expected: usize, actual: usize },

    /// Operation requires a non-empty cloud.
    #[error("{operation} requires a non-empty cloud")]
    #[diagnostic(code(pointfuse::precondition::empty))]
    EmptyCloud { operation: &'static str },
}

impl CloudError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            CloudError::IoRead { .. } => ErrorCode::IoRead,
            CloudError::IoWrite { .. } => ErrorCode::IoWrite,
            CloudError::Format { .. } => ErrorCode::MalformedFile,
            CloudError::DisconnectedGraph { .. } => ErrorCode::DisconnectedGraph,
            CloudError::SingularTransform { .. } => ErrorCode::SingularTransform,
            CloudError::InvalidParameter { .. } => ErrorCode::InvalidParameter,
            CloudError::CloudCount { .. } => ErrorCode::CloudCount,
            CloudError::EmptyCloud { .. } => ErrorCode::EmptyCloud,
        }
    }

    /// Returns the error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CloudError::IoRead { .. } | CloudError::IoWrite { .. } => ErrorKind::Io,
            CloudError::Format { .. } => ErrorKind::Format,
            CloudError::DisconnectedGraph { .. } | CloudError::SingularTransform { .. } => {
                ErrorKind::Geometry
            }
            CloudError::InvalidParameter { .. }
            | CloudError::CloudCount { .. }
            | CloudError::EmptyCloud { .. } => ErrorKind::Precondition,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            CloudError::IoRead { .. } => RecoverySuggestion::CheckEnvironment {
                checks: vec!["file exists".into(), "file permissions".into()],
            },
            CloudError::IoWrite { .. } => RecoverySuggestion::CheckEnvironment {
                checks: vec!["directory exists".into(), "write permissions".into()],
            },
            CloudError::Format { .. } => RecoverySuggestion::ReexportFile {
                details: "ASCII PLY 1.0 with a single vertex element".into(),
            },
            CloudError::DisconnectedGraph { k, .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![("k".into(), format!("try a value larger than {}", k))],
            },
            CloudError::SingularTransform { .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![("pose".into(), "use an invertible transform".into())],
            },
            CloudError::InvalidParameter { parameter, details } => {
                RecoverySuggestion::AdjustParameters {
                    parameters: vec![((*parameter).into(), details.clone())],
                }
            }
            CloudError::CloudCount { expected, .. } => RecoverySuggestion::AdjustCollection {
                description: format!("Load exactly {} clouds before running this", expected),
            },
            CloudError::EmptyCloud { .. } => RecoverySuggestion::AdjustCollection {
                description: "Load a cloud with at least one point".into(),
            },
        }
    }

    /// Returns the file involved in the error, if any.
    pub fn location(&self) -> Option<String> {
        match self {
            CloudError::IoRead { path, .. } | CloudError::IoWrite { path, .. } => {
                Some(path.display().to_string())
            }
            CloudError::Format { source_name, .. } => Some(source_name.clone()),
            _ => None,
        }
    }

    // Constructor helpers for common error patterns

    /// Create an IoRead error.
    pub fn io_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CloudError::IoRead {
            path: path.into(),
            source,
        }
    }

    /// Create an IoWrite error.
    pub fn io_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CloudError::IoWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a Format error.
    pub fn format(source_name: impl Into<String>, details: impl Into<String>) -> Self {
        CloudError::Format {
            source_name: source_name.into(),
            details: details.into(),
        }
    }

    /// Create an InvalidParameter error.
    pub fn invalid_parameter(parameter: &'static str, details: impl Into<String>) -> Self {
        CloudError::InvalidParameter {
            parameter,
            details: details.into(),
        }
    }

    /// Fails with an InvalidParameter error when `k` is zero.
    pub fn require_k(parameter: &'static str, k: usize) -> CloudResult<()> {
        if k == 0 {
            Err(Self::invalid_parameter(parameter, "must be at least 1"))
        } else {
            Ok(())
        }
    }
}
