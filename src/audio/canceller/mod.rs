// Echo canceller interface
//
// The cancellation algorithm itself is an external black box. This module
// defines the seam the frame processor drives: a factory that creates one
// configured canceller per run, and the per-frame call. Dropping a canceller
// releases its underlying resources.

pub mod native;

use serde::{Deserialize, Serialize};

use super::types::Result;

pub use native::{NativeAec3Library, NativeCanceller};

/// Fixed configuration a canceller instance is bound to for its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellerConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub export_linear: bool,
}

/// One stateful echo canceller instance
///
/// Frames must be fed strictly in order; the canceller adapts across calls.
pub trait EchoCanceller {
    /// Cancel echo in one 10ms frame
    ///
    /// `reference`, `capture` and `output` hold `sample_rate / 100 * channels`
    /// interleaved samples. `linear_output` holds `160 * channels` samples at
    /// 16kHz and must be provided exactly when linear export is enabled.
    fn process_frame(
        &mut self,
        reference: &[i16],
        capture: &[i16],
        output: &mut [i16],
        linear_output: Option<&mut [i16]>,
        delay_samples: i32,
    ) -> Result<()>;
}

/// Creates canceller instances for a pipeline run
pub trait CancellerFactory {
    fn create(&self, config: &CancellerConfig) -> Result<Box<dyn EchoCanceller>>;
}

impl<F> CancellerFactory for F
where
    F: Fn(&CancellerConfig) -> Result<Box<dyn EchoCanceller>>,
{
    fn create(&self, config: &CancellerConfig) -> Result<Box<dyn EchoCanceller>> {
        self(config)
    }
}
