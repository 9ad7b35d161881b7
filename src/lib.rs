pub mod audio;
pub mod config;
pub mod log;

// Re-export the pipeline surface for the binary, tests and external use
pub use audio::{
    AecError, AudioBuffer, AudioFormat, CancellerConfig, CancellerFactory, CorrelationPeak,
    DelayEstimator, DelayEstimatorConfig, DelayMode, EchoCanceller, EstimationReport,
    FrameProcessor, Pipeline, PipelineConfig, PipelineOutput, PipelineStage, ProcessedAudio,
    ProcessorConfig, Result,
};
pub use config::AecConfig;
