//! Scanner configuration file.
//!
//! Read as JSON5 (comments and trailing commas allowed), written back as
//! pretty JSON. Missing sections and keys fall back to their defaults.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::scanner::{CaptureSettings, DetectionSettings, PipelineConfig, TrackingSettings};
use crate::core::stats::{STATBOTICS_BASE_URL, TBA_BASE_URL};

/// Lowest brightness threshold the detector accepts.
pub const MIN_BRIGHTNESS_THRESHOLD: u8 = 50;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置解析失败: {0}")]
    Parse(String),

    #[error("配置序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Overrides the platform data directory.
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSettings {
    pub tba_api_key: Option<String>,
    pub tba_base_url: String,
    pub statbotics_base_url: String,
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            tba_api_key: None,
            tba_base_url: TBA_BASE_URL.to_string(),
            statbotics_base_url: STATBOTICS_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub detection: DetectionSettings,
    pub tracking: TrackingSettings,
    pub capture: CaptureSettings,
    pub storage: StorageSettings,
    pub stats: StatsSettings,
}

impl ScannerConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_json5_str(&content)?;
        info!("⚙️ Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_json5_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = json5::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// `path` if given, otherwise the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detection;
        if d.brightness_threshold < MIN_BRIGHTNESS_THRESHOLD {
            return Err(ConfigError::Invalid(format!(
                "brightness_threshold {} is below {}",
                d.brightness_threshold, MIN_BRIGHTNESS_THRESHOLD
            )));
        }
        if d.min_rect_size > d.max_rect_size {
            return Err(ConfigError::Invalid(format!(
                "min_rect_size {} exceeds max_rect_size {}",
                d.min_rect_size, d.max_rect_size
            )));
        }
        if !(d.rect_aspect_ratio >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "rect_aspect_ratio must be at least 1, got {}",
                d.rect_aspect_ratio
            )));
        }
        if self.tracking.max_history_size == 0 {
            return Err(ConfigError::Invalid("max_history_size must be non-zero".into()));
        }
        let scale = self.capture.scale;
        if !(scale > 0.0 && scale <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "capture scale must be in (0, 1], got {}",
                scale
            )));
        }
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            detection: self.detection.clone(),
            tracking: self.tracking.clone(),
        }
    }
}
