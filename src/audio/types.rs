// Core audio types and error definitions
//
// This module contains the buffer and format structures shared by the delay
// estimator, the frame processor and the PCM file plumbing, together with the
// error taxonomy used across the crate.

use serde::{Deserialize, Serialize};

/// Bit depth of every buffer handled by the pipeline
pub const BITS_PER_SAMPLE: u16 = 16;

/// Sample rate of the canceller's secondary linear output, independent of the main rate
pub const LINEAR_OUTPUT_SAMPLE_RATE: u32 = 16000;

/// Samples per channel in one 10ms linear output frame
pub const LINEAR_FRAME_SAMPLES: usize = 160;

/// Frames per second for the 10ms processing quantum
pub const FRAMES_PER_SECOND: u32 = 100;

/// Format description of a PCM stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    pub fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: BITS_PER_SAMPLE,
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}Hz/{}ch/{}bit",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}

/// Interleaved 16-bit PCM audio with its format
///
/// The sample vector always holds a whole number of frames: its length is an
/// exact multiple of the channel count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBuffer {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    /// Wrap interleaved samples, validating the channel layout
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16) -> Result<Self> {
        if channels == 0 {
            return Err(AecError::ShapeMismatch(
                "channel count must be at least 1".to_string(),
            ));
        }
        if sample_rate == 0 {
            return Err(AecError::ShapeMismatch(
                "sample rate must be positive".to_string(),
            ));
        }
        if samples.len() % channels as usize != 0 {
            return Err(AecError::ShapeMismatch(format!(
                "{} samples is not a multiple of {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    /// Zero-filled buffer holding `len` interleaved samples
    pub fn silence(len: usize, sample_rate: u32, channels: u16) -> Result<Self> {
        Self::new(vec![0; len], sample_rate, channels)
    }

    /// Build an interleaved buffer from per-channel sample sequences
    pub fn from_channels(channels: &[Vec<i16>], sample_rate: u32) -> Result<Self> {
        let interleaved = super::codec::interleave(channels)?;
        Self::new(interleaved, sample_rate, channels.len() as u16)
    }

    /// Split the buffer into per-channel sample sequences
    pub fn to_channels(&self) -> Vec<Vec<i16>> {
        // Layout is validated at construction
        super::codec::deinterleave(&self.samples, self.channels as usize).unwrap_or_default()
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [i16] {
        &mut self.samples
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Total interleaved sample count
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample count per channel
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn format(&self) -> AudioFormat {
        AudioFormat::pcm16(self.sample_rate, self.channels)
    }
}

/// Result of running the canceller over a whole signal pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedAudio {
    /// Echo-cancelled output, same length and format as the reference
    pub output: AudioBuffer,
    /// Linear stage output at 16kHz, present when linear export is enabled
    pub linear_output: Option<AudioBuffer>,
    /// Number of frames written into the buffers
    pub frames_processed: usize,
}

/// Errors that can occur in the echo cancellation pipeline
#[derive(Debug, thiserror::Error)]
pub enum AecError {
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Failed to create echo canceller ({sample_rate}Hz, {channels}ch): {reason}")]
    CreationFailure {
        sample_rate: u32,
        channels: u16,
        reason: String,
    },

    #[error("Canceller rejected frame with status {status}")]
    FrameRejected { status: i32 },

    #[error("Processing failed at frame {frame_index} of {frame_count}: {reason}")]
    ProcessingFailure {
        frame_index: usize,
        frame_count: usize,
        reason: String,
        partial: Box<ProcessedAudio>,
    },

    #[error("Reference format {reference} does not match capture format {capture}")]
    SourceFormatMismatch {
        reference: AudioFormat,
        capture: AudioFormat,
    },

    #[error("Native library error: {0}")]
    Library(#[from] libloading::Error),

    #[error("Audio decode error: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AecError>;
