// GCC-PHAT time delay kernel
//
// Generalized cross-correlation with phase transform over a fixed analysis
// window. Both windows are zero-padded to twice their length so the inverse
// transform yields a linear (not circular) correlation over lags
// [-(window - 1), window - 1].

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};

/// Bins whose cross-power magnitude falls below this are treated as empty
const MIN_CROSS_POWER: f64 = 1e-12;

/// In-band bins weaker than this fraction of the strongest in-band bin are
/// dropped before the phase transform. Tonal input otherwise leaks window
/// sidelobes that PHAT lifts to full weight.
const RELATIVE_POWER_FLOOR: f64 = 1e-3;

/// Which correlation extremum counts as the delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationPeak {
    /// Largest positive correlation: an in-phase copy of the reference
    #[default]
    Positive,
    /// Largest absolute correlation, also matching polarity-inverted copies
    Magnitude,
}

/// Computes the lag of one analysis window relative to another
pub trait ChunkDelay {
    /// Delay of `capture` relative to `reference` in milliseconds
    ///
    /// Positive values mean the capture lags the reference.
    fn chunk_delay_ms(&mut self, reference: &[f64], capture: &[f64], sample_rate: u32) -> f64;
}

/// Band-limited GCC-PHAT estimator with pre-planned FFTs and scratch buffers
pub struct GccPhat {
    window: usize,
    fft_size: usize,
    min_freq_hz: f64,
    max_freq_hz: f64,
    peak: CorrelationPeak,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    reference_spectrum: Vec<Complex<f64>>,
    capture_spectrum: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl GccPhat {
    pub fn new(window: usize, min_freq_hz: f64, max_freq_hz: f64) -> Self {
        let fft_size = window * 2;
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        Self {
            window,
            fft_size,
            min_freq_hz,
            max_freq_hz,
            peak: CorrelationPeak::default(),
            forward,
            inverse,
            reference_spectrum: vec![Complex::new(0.0, 0.0); fft_size],
            capture_spectrum: vec![Complex::new(0.0, 0.0); fft_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        }
    }

    pub fn with_peak(mut self, peak: CorrelationPeak) -> Self {
        self.peak = peak;
        self
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Lag in samples with the strongest phase-transformed correlation
    pub fn lag_samples(&mut self, reference: &[f64], capture: &[f64], sample_rate: u32) -> i64 {
        load_window(&mut self.reference_spectrum, reference, self.window);
        load_window(&mut self.capture_spectrum, capture, self.window);

        self.forward
            .process_with_scratch(&mut self.reference_spectrum, &mut self.scratch);
        self.forward
            .process_with_scratch(&mut self.capture_spectrum, &mut self.scratch);

        // Cross spectrum in place, tracking the strongest in-band bin
        let bin_hz = sample_rate as f64 / self.fft_size as f64;
        let mut strongest = 0.0f64;
        for k in 0..self.fft_size {
            let cross = self.capture_spectrum[k] * self.reference_spectrum[k].conj();
            self.capture_spectrum[k] = cross;
            if self.in_band(k, bin_hz) {
                strongest = strongest.max(cross.norm());
            }
        }

        // Phase transform: unit weight for every bin that carries signal
        let floor = (strongest * RELATIVE_POWER_FLOOR).max(MIN_CROSS_POWER);
        for k in 0..self.fft_size {
            let cross = self.capture_spectrum[k];
            let magnitude = cross.norm();
            self.capture_spectrum[k] = if self.in_band(k, bin_hz) && magnitude > floor {
                cross / magnitude
            } else {
                Complex::new(0.0, 0.0)
            };
        }

        self.inverse
            .process_with_scratch(&mut self.capture_spectrum, &mut self.scratch);

        self.peak_lag()
    }

    fn in_band(&self, k: usize, bin_hz: f64) -> bool {
        let freq = k.min(self.fft_size - k) as f64 * bin_hz;
        freq >= self.min_freq_hz && freq <= self.max_freq_hz
    }

    fn peak_value(&self, index: usize) -> f64 {
        let value = self.capture_spectrum[index].re;
        match self.peak {
            CorrelationPeak::Positive => value,
            CorrelationPeak::Magnitude => value.abs(),
        }
    }

    /// Scan lags outward from zero so ties resolve to the smallest shift
    fn peak_lag(&self) -> i64 {
        let max_shift = self.window as i64 - 1;

        let mut best_lag = 0i64;
        let mut best_value = self.peak_value(0);

        for shift in 1..=max_shift {
            for lag in [shift, -shift] {
                let index = if lag >= 0 {
                    lag as usize
                } else {
                    (self.fft_size as i64 + lag) as usize
                };
                let value = self.peak_value(index);
                if value > best_value {
                    best_value = value;
                    best_lag = lag;
                }
            }
        }

        best_lag
    }
}

impl ChunkDelay for GccPhat {
    fn chunk_delay_ms(&mut self, reference: &[f64], capture: &[f64], sample_rate: u32) -> f64 {
        let lag = self.lag_samples(reference, capture, sample_rate);
        lag as f64 * 1000.0 / sample_rate as f64
    }
}

impl std::fmt::Debug for GccPhat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GccPhat")
            .field("window", &self.window)
            .field("fft_size", &self.fft_size)
            .field("min_freq_hz", &self.min_freq_hz)
            .field("max_freq_hz", &self.max_freq_hz)
            .field("peak", &self.peak)
            .finish()
    }
}

/// Copy up to `window` samples into the FFT buffer, zero-padding the rest
fn load_window(buffer: &mut [Complex<f64>], samples: &[f64], window: usize) {
    buffer.fill(Complex::new(0.0, 0.0));
    for (slot, &sample) in buffer.iter_mut().zip(samples.iter().take(window)) {
        *slot = Complex::new(sample, 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn noise(len: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| rng.gen_range(-8000.0..8000.0)).collect()
    }

    fn sine(frequency: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| 10000.0 * (2.0 * std::f64::consts::PI * frequency * i as f64 / 16000.0).sin())
            .collect()
    }

    /// Reference window and a capture window trailing it by `delay` samples
    fn shifted_windows(source: &[f64], delay: usize) -> (&[f64], &[f64]) {
        (&source[100..2148], &source[100 - delay..2148 - delay])
    }

    #[test]
    fn test_identical_windows_have_zero_lag() {
        let signal = noise(2048, 7);
        let mut gcc = GccPhat::new(2048, 300.0, 3000.0);
        assert_eq!(gcc.lag_samples(&signal, &signal, 16000), 0);
    }

    #[test]
    fn test_positive_lag_when_capture_trails() {
        let source = noise(4096, 11);
        let reference = &source[100..2148];
        let capture = &source[63..2111]; // capture[n] == reference[n - 37]
        let mut gcc = GccPhat::new(2048, 300.0, 3000.0);
        assert_eq!(gcc.lag_samples(reference, capture, 16000), 37);
    }

    #[test]
    fn test_negative_lag_when_capture_leads() {
        let source = noise(4096, 13);
        let reference = &source[100..2148];
        let capture = &source[120..2168]; // capture[n] == reference[n + 20]
        let mut gcc = GccPhat::new(2048, 300.0, 3000.0);
        assert_eq!(gcc.lag_samples(reference, capture, 16000), -20);
    }

    #[test]
    fn test_silence_resolves_to_zero_lag() {
        let silence = vec![0.0; 2048];
        let mut gcc = GccPhat::new(2048, 300.0, 3000.0);
        assert_eq!(gcc.lag_samples(&silence, &silence, 16000), 0);
    }

    #[test]
    fn test_delay_in_milliseconds() {
        let source = noise(4096, 17);
        let reference = &source[200..2248];
        let capture = &source[40..2088]; // 160 samples = 10ms at 16kHz
        let mut gcc = GccPhat::new(2048, 300.0, 3000.0);
        let delay_ms = gcc.chunk_delay_ms(reference, capture, 16000);
        assert!((delay_ms - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_sine_shift_within_half_period() {
        for (frequency, delay) in [(440.0, 10), (1000.0, 5), (700.0, 3), (1000.0, 7), (2500.0, 2)] {
            let source = sine(frequency, 4096);
            let (reference, capture) = shifted_windows(&source, delay);
            let mut gcc = GccPhat::new(2048, 300.0, 3000.0);
            let lag = gcc.lag_samples(reference, capture, 16000);
            assert!(
                (lag - delay as i64).abs() <= 1,
                "{}Hz shifted by {} estimated {}",
                frequency,
                delay,
                lag
            );
        }
    }

    #[test]
    fn test_magnitude_peak_folds_tone_to_half_period() {
        // 1kHz at 16kHz has a 16 sample period
        let source = sine(1000.0, 4096);
        let (reference, capture) = shifted_windows(&source, 6);

        let mut positive = GccPhat::new(2048, 300.0, 3000.0);
        assert_eq!(positive.lag_samples(reference, capture, 16000), 6);

        let mut magnitude =
            GccPhat::new(2048, 300.0, 3000.0).with_peak(CorrelationPeak::Magnitude);
        let folded = magnitude.lag_samples(reference, capture, 16000);
        assert!((folded - (6 - 8)).abs() <= 1, "estimated {}", folded);
    }

    #[test]
    fn test_magnitude_peak_matches_inverted_copy() {
        let source = noise(4096, 11);
        let reference = &source[100..2148];
        let capture: Vec<f64> = source[63..2111].iter().map(|s| -s).collect();
        let mut gcc = GccPhat::new(2048, 300.0, 3000.0).with_peak(CorrelationPeak::Magnitude);
        assert_eq!(gcc.lag_samples(reference, &capture, 16000), 37);
    }
}
