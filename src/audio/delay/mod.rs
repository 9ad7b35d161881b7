// Delay estimation between reference and capture streams
//
// Splits both signals into fixed-size chunks, measures a per-chunk delay with
// GCC-PHAT over each chunk's leading analysis window, rejects implausible
// chunk results and averages the rest into one delay in samples.

pub mod gcc_phat;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::codec::{downmix_to_mono, DownmixMode};
use super::types::{AecError, AudioBuffer, Result};

pub use gcc_phat::{ChunkDelay, CorrelationPeak, GccPhat};

/// Tunables for chunked delay estimation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayEstimatorConfig {
    /// Samples per channel in one chunk
    pub chunk_len: usize,
    /// Leading samples of each chunk fed to GCC-PHAT, must be a power of two
    pub analysis_window: usize,
    /// Analyze every Nth chunk; 1 analyzes all of them
    pub chunk_stride: usize,
    /// Lower edge of the correlation band
    pub min_freq_hz: f64,
    /// Upper edge of the correlation band
    pub max_freq_hz: f64,
    /// Policy for reducing stereo chunks to mono
    pub downmix: DownmixMode,
    /// Which correlation extremum marks the delay
    pub peak: CorrelationPeak,
}

impl Default for DelayEstimatorConfig {
    fn default() -> Self {
        Self {
            chunk_len: 4096,
            analysis_window: 2048,
            chunk_stride: 2,
            min_freq_hz: 300.0,
            max_freq_hz: 3000.0,
            downmix: DownmixMode::Average,
            peak: CorrelationPeak::Positive,
        }
    }
}

impl DelayEstimatorConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.analysis_window.is_power_of_two() || self.analysis_window < 2 {
            return Err(AecError::Config(format!(
                "analysis window {} must be a power of two",
                self.analysis_window
            )));
        }
        if self.chunk_len < self.analysis_window {
            return Err(AecError::Config(format!(
                "chunk length {} is shorter than the analysis window {}",
                self.chunk_len, self.analysis_window
            )));
        }
        if self.chunk_stride == 0 {
            return Err(AecError::Config("chunk stride cannot be zero".to_string()));
        }
        if !(self.min_freq_hz >= 0.0 && self.min_freq_hz < self.max_freq_hz) {
            return Err(AecError::Config(format!(
                "invalid correlation band [{}, {}] Hz",
                self.min_freq_hz, self.max_freq_hz
            )));
        }
        Ok(())
    }
}

/// Delay measured on one analysis chunk
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkEstimate {
    pub chunk_index: usize,
    pub lag_ms: f64,
    pub delay_samples: i32,
}

impl ChunkEstimate {
    fn new(chunk_index: usize, lag_ms: f64, sample_rate: u32) -> Self {
        Self {
            chunk_index,
            lag_ms,
            delay_samples: (lag_ms * sample_rate as f64 / 1000.0).round() as i32,
        }
    }
}

/// Outcome of one estimation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstimationReport {
    /// Averaged delay, `None` when no chunk produced a usable estimate
    pub delay_samples: Option<i32>,
    pub analyzed_chunks: usize,
    pub accepted_chunks: usize,
}

impl EstimationReport {
    pub fn is_no_estimate(&self) -> bool {
        self.delay_samples.is_none()
    }
}

/// Chunked GCC-PHAT delay estimator
#[derive(Debug)]
pub struct DelayEstimator<M: ChunkDelay = GccPhat> {
    config: DelayEstimatorConfig,
    method: M,
}

impl DelayEstimator<GccPhat> {
    pub fn new(config: DelayEstimatorConfig) -> Result<Self> {
        config.validate()?;
        let method = GccPhat::new(config.analysis_window, config.min_freq_hz, config.max_freq_hz)
            .with_peak(config.peak);
        Ok(Self { config, method })
    }
}

impl<M: ChunkDelay> DelayEstimator<M> {
    /// Create an estimator with a custom per-chunk lag method
    pub fn with_method(config: DelayEstimatorConfig, method: M) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, method })
    }

    pub fn config(&self) -> &DelayEstimatorConfig {
        &self.config
    }

    /// Estimate how many samples `capture` lags `reference`
    ///
    /// Both slices are interleaved with `channels` channels. Signals shorter
    /// than one chunk yield a report without a delay.
    pub fn estimate(
        &mut self,
        reference: &[i16],
        capture: &[i16],
        sample_rate: u32,
        channels: usize,
    ) -> EstimationReport {
        self.estimate_with_progress(reference, capture, sample_rate, channels, |_, _| {})
    }

    /// Like `estimate`, reporting `(chunk_index + 1, chunk_count)` after every analyzed chunk
    pub fn estimate_with_progress<P>(
        &mut self,
        reference: &[i16],
        capture: &[i16],
        sample_rate: u32,
        channels: usize,
        mut on_progress: P,
    ) -> EstimationReport
    where
        P: FnMut(usize, usize),
    {
        let channels = channels.max(1);
        let chunk_samples = self.config.chunk_len * channels;
        let window_samples = self.config.analysis_window * channels;
        let total_chunks = reference.len().min(capture.len()) / chunk_samples;

        info!(
            "Estimating audio buffer delay over {} chunks (stride {})",
            total_chunks, self.config.chunk_stride
        );

        let mut estimates = Vec::new();
        for chunk_index in (0..total_chunks).step_by(self.config.chunk_stride) {
            let offset = chunk_index * chunk_samples;
            let window = offset..offset + window_samples;

            let reference_mono =
                downmix_to_mono(&reference[window.clone()], channels, self.config.downmix);
            let capture_mono = downmix_to_mono(&capture[window], channels, self.config.downmix);

            let lag_ms = self
                .method
                .chunk_delay_ms(&reference_mono, &capture_mono, sample_rate);
            let estimate = ChunkEstimate::new(chunk_index, lag_ms, sample_rate);
            debug!(
                "Chunk {}: {:.2} ms ({} samples)",
                estimate.chunk_index, estimate.lag_ms, estimate.delay_samples
            );
            estimates.push(estimate);
            on_progress(chunk_index + 1, total_chunks);
        }

        let report = aggregate_estimates(&estimates, sample_rate);
        match report.delay_samples {
            Some(delay) => info!(
                "Estimated audio buffer delay: {} samples ({:.2} ms) from {}/{} chunks",
                delay,
                delay as f64 * 1000.0 / sample_rate as f64,
                report.accepted_chunks,
                report.analyzed_chunks
            ),
            None => warn!(
                "Could not reliably estimate audio buffer delay ({} chunks analyzed)",
                report.analyzed_chunks
            ),
        }
        report
    }

    /// Estimate from two buffers, using the reference's format
    pub fn estimate_buffers(
        &mut self,
        reference: &AudioBuffer,
        capture: &AudioBuffer,
    ) -> Result<EstimationReport> {
        self.estimate_buffers_with_progress(reference, capture, |_, _| {})
    }

    pub fn estimate_buffers_with_progress<P>(
        &mut self,
        reference: &AudioBuffer,
        capture: &AudioBuffer,
        on_progress: P,
    ) -> Result<EstimationReport>
    where
        P: FnMut(usize, usize),
    {
        if reference.format() != capture.format() {
            return Err(AecError::SourceFormatMismatch {
                reference: reference.format(),
                capture: capture.format(),
            });
        }
        Ok(self.estimate_with_progress(
            reference.samples(),
            capture.samples(),
            reference.sample_rate(),
            reference.channels() as usize,
            on_progress,
        ))
    }

    /// Overwrite `delay` with a fresh estimate, leaving it untouched when none is available
    pub fn update_delay(
        &mut self,
        reference: &[i16],
        capture: &[i16],
        sample_rate: u32,
        channels: usize,
        delay: &mut i32,
    ) -> bool {
        match self
            .estimate(reference, capture, sample_rate, channels)
            .delay_samples
        {
            Some(estimate) => {
                *delay = estimate;
                true
            }
            None => false,
        }
    }
}

/// Average the chunk delays that stay within half a second
///
/// Uses integer division, truncating toward zero.
pub fn aggregate_estimates(estimates: &[ChunkEstimate], sample_rate: u32) -> EstimationReport {
    let limit = (sample_rate / 2) as i64;
    let accepted: Vec<i64> = estimates
        .iter()
        .map(|e| e.delay_samples as i64)
        .filter(|delay| delay.abs() < limit)
        .collect();

    for rejected in estimates
        .iter()
        .filter(|e| (e.delay_samples as i64).abs() >= limit)
    {
        debug!(
            "Rejecting chunk {} outlier of {} samples",
            rejected.chunk_index, rejected.delay_samples
        );
    }

    let delay_samples = if accepted.is_empty() {
        None
    } else {
        Some((accepted.iter().sum::<i64>() / accepted.len() as i64) as i32)
    };

    EstimationReport {
        delay_samples,
        analyzed_chunks: estimates.len(),
        accepted_chunks: accepted.len(),
    }
}
