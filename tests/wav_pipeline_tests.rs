mod common;

use std::path::Path;

use aec_sync_lib::audio::wav::{read_pcm16, read_pcm16_pair, write_pcm16};
use aec_sync_lib::audio::{AudioBuffer, NativeAec3Library, LINEAR_OUTPUT_SAMPLE_RATE};
use aec_sync_lib::{AecConfig, AecError, Pipeline};
use common::{noise, ScriptedFactory};
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

#[cfg(test)]
mod wav_pipeline_tests {
    use super::*;

    /// Files on disk flow through the configured pipeline and back to disk
    #[test]
    fn test_files_through_pipeline() {
        let temp_dir = TempDir::new().unwrap();
        let ref_path = temp_dir.path().join("ref.wav");
        let rec_path = temp_dir.path().join("rec.wav");
        let out_path = temp_dir.path().join("out.wav");
        let linear_path = temp_dir.path().join("linear.wav");

        let reference = AudioBuffer::new(noise(9600, 10000, 5), 48000, 2).unwrap();
        let capture = AudioBuffer::new(noise(9600, 10000, 6), 48000, 2).unwrap();
        write_pcm16(&ref_path, &reference).unwrap();
        write_pcm16(&rec_path, &capture).unwrap();

        let (reference, capture) = read_pcm16_pair(&ref_path, &rec_path).unwrap();
        let config = AecConfig {
            delay_samples: 12,
            ..Default::default()
        }
        .with_format(reference.sample_rate(), reference.channels());
        config.validate().unwrap();

        let factory = ScriptedFactory::default();
        let output = Pipeline::new(config.pipeline_config())
            .unwrap()
            .run(&reference, &capture, &factory)
            .unwrap();
        assert_eq!(output.delay_samples, 12);

        write_pcm16(&out_path, &output.audio.output).unwrap();
        let linear = output.audio.linear_output.as_ref().unwrap();
        write_pcm16(&linear_path, linear).unwrap();

        let written = read_pcm16(&out_path).unwrap();
        assert_eq!(written, capture);

        let written_linear = read_pcm16(&linear_path).unwrap();
        assert_eq!(written_linear.sample_rate(), LINEAR_OUTPUT_SAMPLE_RATE);
        assert_eq!(written_linear.channels(), 2);
        // 100ms of input is ten frames of 160 samples per channel
        assert_eq!(written_linear.frames(), 10 * 160);
    }

    /// Mismatched inputs are reported with both formats
    #[test]
    fn test_mismatched_channels_are_reported() {
        let temp_dir = TempDir::new().unwrap();
        let ref_path = temp_dir.path().join("ref.wav");
        let rec_path = temp_dir.path().join("rec.wav");
        write_pcm16(&ref_path, &AudioBuffer::silence(320, 16000, 1).unwrap()).unwrap();
        write_pcm16(&rec_path, &AudioBuffer::silence(320, 16000, 2).unwrap()).unwrap();

        match read_pcm16_pair(&ref_path, &rec_path) {
            Err(AecError::SourceFormatMismatch { reference, capture }) => {
                assert_eq!(reference.channels, 1);
                assert_eq!(capture.channels, 2);
            }
            other => panic!("expected SourceFormatMismatch, got {:?}", other),
        }
    }

    /// Garbage input is a decode error, not a panic
    #[test]
    fn test_garbage_file_is_decode_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"definitely not a riff file").unwrap();

        let result = read_pcm16(file.path());
        assert!(matches!(result, Err(AecError::Decode(_))));
    }

    /// A missing native library surfaces as a library error
    #[test]
    fn test_missing_native_library() {
        let result = NativeAec3Library::load(Some(Path::new("/nonexistent/libaec3.so")));
        assert!(matches!(result, Err(AecError::Library(_))));
    }
}
