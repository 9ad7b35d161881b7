// Synthetic test signals
//
// Deterministic reference/capture pairs for exercising the pipeline without
// recorded files: a sine reference and a capture built from a delayed,
// attenuated echo of it plus seeded uniform noise.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::types::{AudioBuffer, Result};

/// Sample rate used for generated test data
pub const TEST_SAMPLE_RATE: u32 = 16000;

/// Shape of the simulated echo path
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoParams {
    /// Echo delay in samples per channel
    pub delay_samples: usize,
    /// Linear gain applied to the delayed reference
    pub echo_gain: f64,
    /// Peak-to-peak noise span in sample units
    pub noise_amplitude: f64,
    /// Whether the capture also contains the undelayed reference
    pub include_direct: bool,
    pub seed: u64,
}

impl Default for EchoParams {
    fn default() -> Self {
        Self {
            delay_samples: (TEST_SAMPLE_RATE / 4) as usize, // 250ms
            echo_gain: 0.7,
            noise_amplitude: i16::MAX as f64 * 0.2,
            include_direct: true,
            seed: 42,
        }
    }
}

/// Sine wave with the same value written to every channel
pub fn generate_sine_wave(
    sample_rate: u32,
    channels: u16,
    frequency: f64,
    duration_secs: f64,
    amplitude: f64,
) -> Result<AudioBuffer> {
    let frames = (sample_rate as f64 * duration_secs) as usize;
    let mut samples = Vec::with_capacity(frames * channels as usize);
    for i in 0..frames {
        let t = i as f64 / sample_rate as f64;
        let value = (amplitude * (2.0 * std::f64::consts::PI * frequency * t).sin()) as i16;
        samples.extend(std::iter::repeat(value).take(channels as usize));
    }
    AudioBuffer::new(samples, sample_rate, channels)
}

/// Build a capture signal from `reference` through a simulated echo path
///
/// Each output sample is saturated to the 16-bit range.
pub fn generate_echo_capture(reference: &AudioBuffer, params: &EchoParams) -> Result<AudioBuffer> {
    let channels = reference.channels() as usize;
    let delay = params.delay_samples * channels;
    let source = reference.samples();
    let mut rng = StdRng::seed_from_u64(params.seed);

    let capture = source
        .iter()
        .enumerate()
        .map(|(i, &sample)| {
            let mut value = if params.include_direct { sample as f64 } else { 0.0 };
            if i >= delay {
                value += source[i - delay] as f64 * params.echo_gain;
            }
            if params.noise_amplitude > 0.0 {
                value += rng.gen::<f64>() * params.noise_amplitude - params.noise_amplitude / 2.0;
            }
            value.clamp(i16::MIN as f64, i16::MAX as f64) as i16
        })
        .collect();

    AudioBuffer::new(capture, reference.sample_rate(), reference.channels())
}

/// Three seconds of a half-scale 1kHz tone in the given format, with a 250ms echo capture
pub fn synthetic_pair(sample_rate: u32, channels: u16) -> Result<(AudioBuffer, AudioBuffer)> {
    let reference = generate_sine_wave(sample_rate, channels, 1000.0, 3.0, i16::MAX as f64 * 0.5)?;
    let params = EchoParams {
        delay_samples: (sample_rate / 4) as usize,
        ..Default::default()
    };
    let capture = generate_echo_capture(&reference, &params)?;
    Ok((reference, capture))
}

/// `synthetic_pair` at 16kHz mono
pub fn default_test_pair() -> Result<(AudioBuffer, AudioBuffer)> {
    synthetic_pair(TEST_SAMPLE_RATE, 1)
}
