// Pipeline driver
//
// Composes optional delay estimation with frame processing. When the delay is
// estimated, estimation finishes before the first frame is processed, since
// one constant delay is used for the whole run.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::canceller::CancellerFactory;
use super::delay::{DelayEstimator, DelayEstimatorConfig, EstimationReport};
use super::frame_processor::{FrameProcessor, ProcessorConfig};
use super::types::{AecError, AudioBuffer, ProcessedAudio, Result};

/// Where the buffer delay hint comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayMode {
    /// Use this delay as given
    Fixed(i32),
    /// Estimate from the signals, keeping `fallback` if no estimate is available
    Auto { fallback: i32 },
}

impl Default for DelayMode {
    fn default() -> Self {
        DelayMode::Fixed(0)
    }
}

/// Phase of a run reported to progress observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Delay estimation, counted in analysis chunks
    Estimation,
    /// Echo cancellation, counted in 10ms frames
    Processing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub processor: ProcessorConfig,
    pub delay: DelayMode,
    pub estimator: DelayEstimatorConfig,
}

/// Result of a complete pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    pub audio: ProcessedAudio,
    /// Delay hint passed to every frame
    pub delay_samples: i32,
    /// Estimation details when the delay was detected automatically
    pub estimation: Option<EstimationReport>,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.estimator.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Resolve the delay hint for this signal pair
    pub fn resolve_delay(
        &self,
        reference: &AudioBuffer,
        capture: &AudioBuffer,
    ) -> Result<(i32, Option<EstimationReport>)> {
        self.resolve_delay_with_progress(reference, capture, |_, _| {})
    }

    fn resolve_delay_with_progress<P>(
        &self,
        reference: &AudioBuffer,
        capture: &AudioBuffer,
        on_progress: P,
    ) -> Result<(i32, Option<EstimationReport>)>
    where
        P: FnMut(usize, usize),
    {
        match self.config.delay {
            DelayMode::Fixed(delay) => Ok((delay, None)),
            DelayMode::Auto { fallback } => {
                let mut estimator = DelayEstimator::new(self.config.estimator.clone())?;
                let report =
                    estimator.estimate_buffers_with_progress(reference, capture, on_progress)?;
                let delay = report.delay_samples.unwrap_or_else(|| {
                    warn!("Using default delay of {} samples", fallback);
                    fallback
                });
                Ok((delay, Some(report)))
            }
        }
    }

    pub fn run(
        &self,
        reference: &AudioBuffer,
        capture: &AudioBuffer,
        factory: &dyn CancellerFactory,
    ) -> Result<PipelineOutput> {
        self.run_with_progress(reference, capture, factory, |_, _, _| {})
    }

    /// Like `run`, reporting `(stage, done, total)` as chunks and frames complete
    pub fn run_with_progress<P>(
        &self,
        reference: &AudioBuffer,
        capture: &AudioBuffer,
        factory: &dyn CancellerFactory,
        mut on_progress: P,
    ) -> Result<PipelineOutput>
    where
        P: FnMut(PipelineStage, usize, usize),
    {
        if reference.format() != capture.format() {
            return Err(AecError::SourceFormatMismatch {
                reference: reference.format(),
                capture: capture.format(),
            });
        }

        let (delay_samples, estimation) =
            self.resolve_delay_with_progress(reference, capture, |done, total| {
                on_progress(PipelineStage::Estimation, done, total)
            })?;
        info!(
            "Audio buffer delay: {} samples{}",
            delay_samples,
            if estimation.is_some() { " (auto)" } else { "" }
        );

        let processor = FrameProcessor::new(self.config.processor);
        let audio =
            processor.process_with_progress(reference, capture, delay_samples, factory, |done, total| {
                on_progress(PipelineStage::Processing, done, total)
            })?;

        Ok(PipelineOutput {
            audio,
            delay_samples,
            estimation,
        })
    }
}
