mod common;

use aec_sync_lib::audio::synthetic::{
    default_test_pair, generate_echo_capture, generate_sine_wave, EchoParams,
};
use aec_sync_lib::audio::{
    AudioBuffer, DelayEstimator, DelayEstimatorConfig, DelayMode, DownmixMode, Pipeline,
    PipelineConfig, ProcessorConfig,
};
use common::{noise, ScriptedFactory};

#[cfg(test)]
mod delay_estimation_tests {
    use super::*;

    const SAMPLE_RATE: u32 = 16000;

    /// Window large enough to see a 250ms lag at 16kHz
    fn long_window_config() -> DelayEstimatorConfig {
        DelayEstimatorConfig {
            chunk_len: 16384,
            analysis_window: 8192,
            chunk_stride: 1,
            ..Default::default()
        }
    }

    fn echo_scenario(delay_samples: usize) -> (AudioBuffer, AudioBuffer) {
        let reference =
            AudioBuffer::new(noise(3 * SAMPLE_RATE as usize, 12000, 42), SAMPLE_RATE, 1).unwrap();
        let capture = generate_echo_capture(
            &reference,
            &EchoParams {
                delay_samples,
                echo_gain: 0.7,
                noise_amplitude: i16::MAX as f64 * 0.2,
                include_direct: false,
                seed: 42,
            },
        )
        .unwrap();
        (reference, capture)
    }

    /// A 250ms, 70% echo with background noise is recovered within a few percent
    #[test]
    fn test_recovers_250ms_echo() {
        let (reference, capture) = echo_scenario(4000);
        let mut estimator = DelayEstimator::new(long_window_config()).unwrap();

        let report = estimator.estimate_buffers(&reference, &capture).unwrap();

        let delay = report.delay_samples.expect("echo should be detected");
        assert!(
            (delay - 4000).abs() <= 80,
            "estimated {} samples, expected about 4000",
            delay
        );
        assert_eq!(report.analyzed_chunks, 2);
        assert_eq!(report.accepted_chunks, 2);
    }

    /// The default window cannot see lags beyond its length, so every chunk
    /// of the 250ms scenario lands inside the window and nowhere near 4000
    #[test]
    fn test_default_window_bounds_detectable_lag() {
        let (reference, capture) = echo_scenario(4000);
        let mut estimator = DelayEstimator::new(DelayEstimatorConfig::default()).unwrap();

        let report = estimator.estimate_buffers(&reference, &capture).unwrap();

        // 48000 samples hold 11 chunks; stride 2 analyzes 0, 2, .., 10
        assert_eq!(report.analyzed_chunks, 6);
        assert_eq!(report.accepted_chunks, 6);
        let delay = report.delay_samples.expect("in-window lags are always accepted");
        assert!(delay.abs() <= 2047, "estimated {}", delay);
        assert!((delay - 4000).abs() > 1000, "estimated {}", delay);
    }

    /// A pure tone shifted by less than half its period is recovered
    #[test]
    fn test_recovers_sine_shift() {
        for (frequency, delay) in [(440.0, 10), (1000.0, 5), (700.0, 3)] {
            let reference = generate_sine_wave(SAMPLE_RATE, 1, frequency, 1.0, 10000.0).unwrap();
            let capture = generate_echo_capture(
                &reference,
                &EchoParams {
                    delay_samples: delay,
                    echo_gain: 1.0,
                    noise_amplitude: 0.0,
                    include_direct: false,
                    seed: 0,
                },
            )
            .unwrap();

            let mut estimator = DelayEstimator::new(DelayEstimatorConfig::default()).unwrap();
            let report = estimator.estimate_buffers(&reference, &capture).unwrap();

            let estimated = report.delay_samples.expect("tone should be detected");
            assert!(
                (estimated - delay as i32).abs() <= 1,
                "{}Hz shifted by {} estimated {}",
                frequency,
                delay,
                estimated
            );
        }
    }

    /// Identical signals estimate to zero
    #[test]
    fn test_identical_signals() {
        let signal = noise(8192, 8000, 9);
        let mut estimator = DelayEstimator::new(DelayEstimatorConfig::default()).unwrap();

        let report = estimator.estimate(&signal, &signal, SAMPLE_RATE, 1);
        assert_eq!(report.delay_samples, Some(0));
    }

    /// Stereo signals delayed in both channels are downmixed before analysis
    #[test]
    fn test_stereo_shift_with_first_channel_downmix() {
        let left = noise(8192, 9000, 1);
        let right = noise(8192, 9000, 2);
        let reference = AudioBuffer::from_channels(&[left, right], 48000).unwrap();
        let capture = generate_echo_capture(
            &reference,
            &EchoParams {
                delay_samples: 120,
                echo_gain: 1.0,
                noise_amplitude: 0.0,
                include_direct: false,
                seed: 0,
            },
        )
        .unwrap();

        let mut estimator = DelayEstimator::new(DelayEstimatorConfig {
            downmix: DownmixMode::FirstChannel,
            ..Default::default()
        })
        .unwrap();
        let report = estimator.estimate_buffers(&reference, &capture).unwrap();
        assert_eq!(report.delay_samples, Some(120));
    }

    /// `update_delay` keeps the previous value when nothing can be estimated
    #[test]
    fn test_update_delay_keeps_fallback() {
        let mut estimator = DelayEstimator::new(DelayEstimatorConfig::default()).unwrap();
        let mut delay = 55;

        let short = noise(1000, 8000, 4);
        assert!(!estimator.update_delay(&short, &short, SAMPLE_RATE, 1, &mut delay));
        assert_eq!(delay, 55);

        let signal = noise(4096, 8000, 4);
        assert!(estimator.update_delay(&signal, &signal, SAMPLE_RATE, 1, &mut delay));
        assert_eq!(delay, 0);
    }

    /// Auto mode estimates once and hands the result to every frame
    #[test]
    fn test_pipeline_auto_delay_scenario() {
        let (reference, capture) = echo_scenario(4000);
        let factory = ScriptedFactory::default();
        let pipeline = Pipeline::new(PipelineConfig {
            processor: ProcessorConfig {
                sample_rate: SAMPLE_RATE,
                channels: 1,
                export_linear: true,
            },
            delay: DelayMode::Auto { fallback: 0 },
            estimator: long_window_config(),
        })
        .unwrap();

        let output = pipeline.run(&reference, &capture, &factory).unwrap();

        assert!((output.delay_samples - 4000).abs() <= 80);
        assert_eq!(output.audio.frames_processed, 300);
        let delays = factory.delays.borrow();
        assert_eq!(delays.len(), 300);
        assert!(delays.iter().all(|&d| d == output.delay_samples));
        assert_eq!(factory.dropped(), 1);
    }

    /// The demo pair runs end to end with the default settings
    #[test]
    fn test_default_test_pair_runs() {
        let (reference, capture) = default_test_pair().unwrap();
        let factory = ScriptedFactory::default();
        let pipeline = Pipeline::new(PipelineConfig {
            processor: ProcessorConfig {
                sample_rate: SAMPLE_RATE,
                channels: 1,
                export_linear: true,
            },
            delay: DelayMode::Auto { fallback: 0 },
            estimator: DelayEstimatorConfig::default(),
        })
        .unwrap();

        let output = pipeline.run(&reference, &capture, &factory).unwrap();
        assert_eq!(output.audio.output, capture);
        assert_eq!(output.audio.linear_output.unwrap().len(), 300 * 160);
        assert!(output.estimation.is_some());
    }
}
