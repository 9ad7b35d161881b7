// Frame-synchronized echo cancellation over whole signals
//
// Cuts the reference and capture buffers into 10ms frames, drives one
// canceller instance over them in order and assembles the cancelled output
// plus the optional 16kHz linear output.

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::canceller::{CancellerConfig, CancellerFactory};
use super::types::{
    AecError, AudioBuffer, ProcessedAudio, Result, FRAMES_PER_SECOND, LINEAR_FRAME_SAMPLES,
    LINEAR_OUTPUT_SAMPLE_RATE,
};
use crate::pipeline_debug;

/// Stream parameters for one processing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub export_linear: bool,
}

impl ProcessorConfig {
    /// Samples per channel in one 10ms frame
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate / FRAMES_PER_SECOND) as usize
    }

    /// Interleaved samples in one frame
    pub fn frame_len(&self) -> usize {
        self.samples_per_frame() * self.channels as usize
    }

    /// Interleaved samples in one linear output frame
    pub fn linear_frame_len(&self) -> usize {
        LINEAR_FRAME_SAMPLES * self.channels as usize
    }

    /// Whole frames in a signal of `total_samples`; the short tail is excluded
    pub fn frame_count(&self, total_samples: usize) -> usize {
        match self.frame_len() {
            0 => 0,
            frame_len => total_samples / frame_len,
        }
    }

    fn canceller_config(&self) -> CancellerConfig {
        CancellerConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
            export_linear: self.export_linear,
        }
    }
}

/// Runs the external canceller frame by frame
#[derive(Debug, Clone)]
pub struct FrameProcessor {
    config: ProcessorConfig,
}

impl FrameProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Cancel echo across the whole signal pair using a constant delay hint
    pub fn process(
        &self,
        reference: &AudioBuffer,
        capture: &AudioBuffer,
        delay_samples: i32,
        factory: &dyn CancellerFactory,
    ) -> Result<ProcessedAudio> {
        self.process_with_progress(reference, capture, delay_samples, factory, |_, _| {})
    }

    /// Like `process`, reporting `(frames_done, frame_count)` after every frame
    pub fn process_with_progress<P>(
        &self,
        reference: &AudioBuffer,
        capture: &AudioBuffer,
        delay_samples: i32,
        factory: &dyn CancellerFactory,
        mut on_progress: P,
    ) -> Result<ProcessedAudio>
    where
        P: FnMut(usize, usize),
    {
        self.validate_inputs(reference, capture)?;

        let config = self.config;
        let frame_len = config.frame_len();
        let linear_frame_len = config.linear_frame_len();
        let frame_count = config.frame_count(reference.len());

        // Dropped on every return path below, which releases the native handle
        let mut canceller = factory.create(&config.canceller_config())?;

        let mut output = AudioBuffer::silence(reference.len(), config.sample_rate, config.channels)?;
        let mut linear_output = if config.export_linear {
            Some(AudioBuffer::silence(
                frame_count * linear_frame_len,
                LINEAR_OUTPUT_SAMPLE_RATE,
                config.channels,
            )?)
        } else {
            None
        };

        let mut reference_frame = vec![0i16; frame_len];
        let mut capture_frame = vec![0i16; frame_len];
        let mut output_frame = vec![0i16; frame_len];
        let mut linear_frame = vec![0i16; linear_frame_len];

        info!(
            "Processing {} frames of {} samples with delay {} samples",
            frame_count, frame_len, delay_samples
        );

        for frame_index in 0..frame_count {
            let offset = frame_index * frame_len;
            copy_frame(&mut reference_frame, reference.samples(), offset);
            copy_frame(&mut capture_frame, capture.samples(), offset);
            output_frame.fill(0);
            linear_frame.fill(0);

            let linear_slot = if config.export_linear {
                Some(linear_frame.as_mut_slice())
            } else {
                None
            };

            if let Err(e) = canceller.process_frame(
                &reference_frame,
                &capture_frame,
                &mut output_frame,
                linear_slot,
                delay_samples,
            ) {
                error!("Error processing frame {}/{}: {}", frame_index, frame_count, e);
                return Err(AecError::ProcessingFailure {
                    frame_index,
                    frame_count,
                    reason: e.to_string(),
                    partial: Box::new(ProcessedAudio {
                        output,
                        linear_output,
                        frames_processed: frame_index,
                    }),
                });
            }

            output.samples_mut()[offset..offset + frame_len].copy_from_slice(&output_frame);
            if let Some(linear) = linear_output.as_mut() {
                let linear_offset = frame_index * linear_frame_len;
                linear.samples_mut()[linear_offset..linear_offset + linear_frame_len]
                    .copy_from_slice(&linear_frame);
            }

            pipeline_debug!("frame {}/{} processed", frame_index + 1, frame_count);
            on_progress(frame_index + 1, frame_count);
        }

        info!("Processing complete: {} frames", frame_count);
        Ok(ProcessedAudio {
            output,
            linear_output,
            frames_processed: frame_count,
        })
    }

    fn validate_inputs(&self, reference: &AudioBuffer, capture: &AudioBuffer) -> Result<()> {
        let config = &self.config;
        if config.samples_per_frame() == 0 {
            return Err(AecError::Config(format!(
                "sample rate {} is too low for 10ms frames",
                config.sample_rate
            )));
        }
        for (name, buffer) in [("reference", reference), ("capture", capture)] {
            if buffer.channels() != config.channels {
                return Err(AecError::ShapeMismatch(format!(
                    "{} has {} channels, processor expects {}",
                    name,
                    buffer.channels(),
                    config.channels
                )));
            }
        }
        if reference.sample_rate() != config.sample_rate
            || capture.sample_rate() != config.sample_rate
        {
            return Err(AecError::SourceFormatMismatch {
                reference: reference.format(),
                capture: capture.format(),
            });
        }
        Ok(())
    }
}

/// Zero `frame`, then copy what remains of `source` from `offset`
fn copy_frame(frame: &mut [i16], source: &[i16], offset: usize) {
    frame.fill(0);
    if offset >= source.len() {
        return;
    }
    let available = frame.len().min(source.len() - offset);
    frame[..available].copy_from_slice(&source[offset..offset + available]);
}
