//! TOML configuration for silicon-rca.
//!
//! Defaults are compiled in; a config file can override them and CLI flags
//! override the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::detect::DetectionParams;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "SILICON_RCA_CONFIG";

/// Config file picked up from the working directory when present.
pub const LOCAL_CONFIG: &str = "silicon-rca.toml";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: i64 },
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

impl PipelineConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try, in order: the file named by `SILICON_RCA_CONFIG`, `./silicon-rca.toml`,
    /// then compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "SILICON_RCA_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %e,
                        "local config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Caller-supplied detection knobs. Kept signed so that bad values can be
/// reported instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Bucket size (seconds) for joining logs to counters.
    pub window_sec: i64,
    /// Minimum samples per incident window.
    pub min_points: i64,
    /// Largest gap (seconds) tolerated inside one incident window.
    pub max_gap_sec: i64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            window_sec: 5,
            min_points: 8,
            max_gap_sec: 10,
        }
    }
}

impl DetectionConfig {
    /// Reject non-positive `min_points` / `max_gap_sec`.
    pub fn validate(&self) -> Result<DetectionParams, ConfigError> {
        let min_points = positive("min_points", self.min_points)?;
        let max_gap_sec = positive("max_gap_sec", self.max_gap_sec)?;
        Ok(DetectionParams {
            min_points: min_points as usize,
            max_gap: chrono::Duration::seconds(max_gap_sec),
        })
    }

    pub fn bucket(&self) -> Result<chrono::Duration, ConfigError> {
        positive("window_sec", self.window_sec).map(chrono::Duration::seconds)
    }
}

fn positive(field: &'static str, value: i64) -> Result<i64, ConfigError> {
    if value > 0 {
        Ok(value)
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding `counters.csv` and `logs.jsonl`.
    pub data_dir: PathBuf,
    /// Directory receiving incidents, RCA results and the report.
    pub out_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/demo_fleet"),
            out_dir: PathBuf::from("out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let params = DetectionConfig::default().validate().unwrap();
        assert_eq!(params.min_points, 8);
        assert_eq!(params.max_gap, chrono::Duration::seconds(10));
    }

    #[test]
    fn test_non_positive_values_are_rejected() {
        let cfg = DetectionConfig {
            min_points: 0,
            ..Default::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::NonPositive {
                field: "min_points",
                value: 0
            })
        );

        let cfg = DetectionConfig {
            max_gap_sec: -3,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NonPositive { field: "max_gap_sec", .. })
        ));

        let cfg = DetectionConfig {
            window_sec: 0,
            ..Default::default()
        };
        assert!(cfg.bucket().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg: PipelineConfig = toml::from_str(
            r#"
            [detection]
            min_points = 4

            [logging]
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.detection.min_points, 4);
        assert_eq!(cfg.detection.max_gap_sec, 10);
        assert!(cfg.logging.json);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.paths.out_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silicon-rca.toml");
        std::fs::write(&path, "[detection]\nmax_gap_sec = 30\n").unwrap();
        let cfg = PipelineConfig::load(&path).unwrap();
        assert_eq!(cfg.detection.max_gap_sec, 30);

        assert!(PipelineConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
