//! Serializable processing configuration.
//!
//! Every section and every field falls back to its default, so a config file
//! only needs to mention what it changes:
//!
//! ```toml
//! [normals]
//! k = 16
//!
//! [icp]
//! iterations = 50
//! seed = 7
//! ```

use serde::{Deserialize, Serialize};

use crate::density::{CullParams, DensityParams};
use crate::error::CloudResult;
use crate::normals::NormalParams;
use crate::registration::IcpParams;
use crate::unify::UnifyParams;

/// Parameters for every operation, grouped by operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub normals: NormalParams,
    pub density: DensityParams,
    pub cull: CullParams,
    pub unify: UnifyParams,
    pub icp: IcpParams,
}

impl ProcessingConfig {
    /// Load configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&contents)?)
    }

    /// Serialize to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Save configuration to a TOML file.
    pub fn save_toml(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let toml_str = self.to_toml()?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Validate every section.
    pub fn validate(&self) -> CloudResult<()> {
        self.normals.validate()?;
        self.density.validate()?;
        self.cull.validate()?;
        self.unify.validate()?;
        self.icp.validate()
    }
}

/// Error loading or saving configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error reading or writing file.
    Io(std::io::Error),
    /// TOML parsing error.
    TomlParse(toml::de::Error),
    /// TOML serialization error.
    TomlSerialize(toml::ser::Error),
    /// JSON error.
    Json(serde_json::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::TomlParse(e) => write!(f, "TOML parse error: {}", e),
            Self::TomlSerialize(e) => write!(f, "TOML serialize error: {}", e),
            Self::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::TomlParse(e) => Some(e),
            Self::TomlSerialize(e) => Some(e),
            Self::Json(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::TomlParse(e)
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(e: toml::ser::Error) -> Self {
        Self::TomlSerialize(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = ProcessingConfig::default();
        assert_eq!(config.normals.k, 10);
        assert_eq!(config.density.k, 10);
        assert_eq!(config.cull.ratio, 0.1);
        assert_eq!(config.unify.resolution, 1.0);
        assert_eq!(config.icp.samples, 1000);
        assert_eq!(config.icp.iterations, 30);
        assert_eq!(config.icp.outlier_fraction, 0.1);
        assert_eq!(config.icp.seed, 0x5eed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = ProcessingConfig::from_toml(
            r#"
            [normals]
            k = 16
            flip_root = true

            [icp]
            seed = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.normals.k, 16);
        assert!(config.normals.flip_root);
        assert_eq!(config.normals.graph_k, None);
        assert_eq!(config.icp.seed, 7);
        assert_eq!(config.icp.iterations, 30);
        assert_eq!(config.cull, CullParams::default());
    }

    #[test]
    fn test_toml_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pointfuse.toml");

        let mut config = ProcessingConfig::default();
        config.cull.ratio = 0.25;
        config.unify.resolution = 0.05;
        config.normals.graph_k = Some(12);
        config.save_toml(&path).unwrap();

        let loaded = ProcessingConfig::from_toml_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = ProcessingConfig::default();
        config.icp.samples = 250;
        let json = config.to_json().unwrap();
        assert_eq!(ProcessingConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_validate_reports_bad_section() {
        let mut config = ProcessingConfig::default();
        config.icp.outlier_fraction = 1.0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Precondition);
    }

    #[test]
    fn test_missing_file() {
        let err = ProcessingConfig::from_toml_file("/nonexistent/pointfuse.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
        assert!(err.to_string().starts_with("I/O error"));
    }
}
