use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Iteration budget and relative tolerance of the coordinate-descent solver.
///
/// `tol` is relative: it bounds both the largest coefficient change per sweep
/// (relative to the largest coefficient) and the duality gap (relative to
/// `|y|^2`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    pub max_iter: usize,
    pub tol: f64,
}

impl SolverConfig {
    pub const DEFAULT_MAX_ITER: usize = 100;
    pub const DEFAULT_TOL: f64 = 1e-2;

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iter == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if !self.tol.is_finite() || self.tol < 0.0 {
            return Err(ConfigError::InvalidTolerance(self.tol));
        }
        Ok(())
    }

    /// Reads a solver configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: SolverConfig = toml::from_str(&toml_string)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iter: Self::DEFAULT_MAX_ITER,
            tol: Self::DEFAULT_TOL,
        }
    }
}

/// Batch layout of the Gram matrices handed to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// One Gram matrix per sample.
    Multi,
    /// One Gram matrix shared by the whole batch.
    Single,
}

/// Floating-point width used for a run whose element type is chosen at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    F32,
    #[default]
    F64,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("max_iter must be at least 1.")]
    ZeroIterations,
    #[error("Tolerance must be finite and non-negative, but was {0}.")]
    InvalidTolerance(f64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_online_learner_settings() {
        let config = SolverConfig::default();
        assert_eq!(config.max_iter, 100);
        assert_eq!(config.tol, 1e-2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: SolverConfig = toml::from_str("max_iter = 250").unwrap();
        assert_eq!(config.max_iter, 250);
        assert_eq!(config.tol, SolverConfig::DEFAULT_TOL);
    }

    #[test]
    fn load_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_iter = 0").unwrap();
        assert!(matches!(
            SolverConfig::load(file.path()),
            Err(ConfigError::ZeroIterations)
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tol = -1.0").unwrap();
        assert!(matches!(
            SolverConfig::load(file.path()),
            Err(ConfigError::InvalidTolerance(_))
        ));
    }

    #[test]
    fn layout_and_precision_use_lowercase_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            layout: Layout,
            precision: Precision,
        }
        let parsed: Wrapper = toml::from_str("layout = \"multi\"\nprecision = \"f32\"").unwrap();
        assert_eq!(parsed.layout, Layout::Multi);
        assert_eq!(parsed.precision, Precision::F32);
    }
}
