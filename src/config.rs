// Run configuration
//
// File-backed settings for a pipeline run. Every field has a default so a
// partial JSON document is valid; command line flags are applied on top.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audio::delay::DelayEstimatorConfig;
use crate::audio::frame_processor::ProcessorConfig;
use crate::audio::pipeline::{DelayMode, PipelineConfig};
use crate::audio::types::{AecError, Result};

/// Complete configuration for one `aec-sync` run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AecConfig {
    /// Stream format of generated test data; loaded files replace it with their own
    pub sample_rate: u32,
    pub channels: u16,
    /// Produce the 16kHz linear stage output alongside the cancelled output
    pub export_linear: bool,
    /// Buffer delay hint in samples; also the fallback when auto-detection fails
    pub delay_samples: i32,
    /// Estimate the delay from the signals before processing
    pub auto_delay: bool,
    /// Explicit path to the native AEC3 library
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_path: Option<PathBuf>,
    pub estimator: DelayEstimatorConfig,
}

impl Default for AecConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            export_linear: true,
            delay_samples: 0,
            auto_delay: false,
            library_path: None,
            estimator: DelayEstimatorConfig::default(),
        }
    }
}

impl AecConfig {
    /// Load settings from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate < 8000 || self.sample_rate > 192000 {
            return Err(AecError::Config(format!(
                "Invalid sample rate: {} (must be 8000-192000 Hz)",
                self.sample_rate
            )));
        }
        if self.sample_rate % 100 != 0 {
            return Err(AecError::Config(format!(
                "Invalid sample rate: {} (10ms frames need a multiple of 100 Hz)",
                self.sample_rate
            )));
        }
        if self.channels < 1 || self.channels > 2 {
            return Err(AecError::Config(format!(
                "Invalid channel count: {} (must be 1-2 channels)",
                self.channels
            )));
        }
        self.estimator.validate()
    }

    /// Copy of this config with the stream format replaced by the loaded audio's
    pub fn with_format(&self, sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            ..self.clone()
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            processor: ProcessorConfig {
                sample_rate: self.sample_rate,
                channels: self.channels,
                export_linear: self.export_linear,
            },
            delay: if self.auto_delay {
                DelayMode::Auto {
                    fallback: self.delay_samples,
                }
            } else {
                DelayMode::Fixed(self.delay_samples)
            },
            estimator: self.estimator.clone(),
        }
    }
}
