// Audio module - echo cancellation pipeline
//
// This module is broken down into logical components:
// - types: Buffers, formats and the error taxonomy
// - codec: Channel interleaving and mono downmix
// - delay: Chunked GCC-PHAT delay estimation
// - canceller: The echo canceller seam and its native AEC3 binding
// - frame_processor: 10ms frame loop driving one canceller
// - pipeline: Estimation + processing composition
// - wav / synthetic: PCM file plumbing and generated test signals

pub mod types;
pub mod codec;
pub mod delay;
pub mod canceller;
pub mod frame_processor;
pub mod pipeline;
pub mod synthetic;
pub mod wav;

// Re-export commonly used types for easier imports
pub use types::{
    AecError, AudioBuffer, AudioFormat, ProcessedAudio, Result, BITS_PER_SAMPLE,
    LINEAR_FRAME_SAMPLES, LINEAR_OUTPUT_SAMPLE_RATE,
};

pub use codec::{deinterleave, downmix_to_mono, interleave, DownmixMode};

pub use delay::{
    aggregate_estimates, ChunkDelay, ChunkEstimate, CorrelationPeak, DelayEstimator,
    DelayEstimatorConfig, EstimationReport, GccPhat,
};

pub use canceller::{
    CancellerConfig, CancellerFactory, EchoCanceller, NativeAec3Library, NativeCanceller,
};

pub use frame_processor::{FrameProcessor, ProcessorConfig};

pub use pipeline::{DelayMode, Pipeline, PipelineConfig, PipelineOutput, PipelineStage};

pub use synthetic::{
    default_test_pair, generate_echo_capture, generate_sine_wave, synthetic_pair, EchoParams,
};

pub use wav::{encode_pcm16, read_pcm16, read_pcm16_pair, write_pcm16};
