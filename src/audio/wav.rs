// PCM16 WAV source and sink
//
// Reading goes through symphonia so any well-formed RIFF/WAVE PCM file is
// accepted; writing emits the canonical 44-byte header followed by
// little-endian samples.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info};

use super::types::{AecError, AudioBuffer, AudioFormat, Result, BITS_PER_SAMPLE};

const WAV_HEADER_LEN: usize = 44;

fn decode_error(context: &str, error: SymphoniaError) -> AecError {
    AecError::Decode(format!("{}: {}", context, error))
}

/// Load a 16-bit PCM WAV file into an interleaved buffer
pub fn read_pcm16(path: &Path) -> Result<AudioBuffer> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .map_err(|e| decode_error("unsupported format", e))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AecError::Decode("no supported audio tracks".to_string()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| AecError::Decode("missing sample rate".to_string()))?;
    let channels = params
        .channels
        .map(|c| c.count() as u16)
        .ok_or_else(|| AecError::Decode("missing channel layout".to_string()))?;
    if let Some(bits) = params.bits_per_sample {
        if bits != BITS_PER_SAMPLE as u32 {
            return Err(AecError::Decode(format!(
                "{} is {}-bit, only 16-bit PCM is supported",
                path.display(),
                bits
            )));
        }
    }

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| decode_error("unsupported codec", e))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(decode_error("failed to read packet", e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| decode_error("failed to decode packet", e))?;
        let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    let buffer = AudioBuffer::new(samples, sample_rate, channels)?;
    info!(
        "Loaded {}: {}, {} samples per channel",
        path.display(),
        buffer.format(),
        buffer.frames()
    );
    Ok(buffer)
}

/// Load a reference/capture pair, requiring identical formats
pub fn read_pcm16_pair(reference: &Path, capture: &Path) -> Result<(AudioBuffer, AudioBuffer)> {
    let reference = read_pcm16(reference)?;
    let capture = read_pcm16(capture)?;
    if reference.format() != capture.format() {
        return Err(AecError::SourceFormatMismatch {
            reference: reference.format(),
            capture: capture.format(),
        });
    }
    Ok((reference, capture))
}

/// Canonical RIFF/WAVE header for `data_len` bytes of PCM16
fn wav_header(format: &AudioFormat, data_len: u32) -> Vec<u8> {
    let channels = format.channels;
    let bit_depth = format.bits_per_sample;
    let byte_rate = format.sample_rate * channels as u32 * (bit_depth as u32 / 8);
    let block_align = channels * (bit_depth / 8);

    let mut header = Vec::with_capacity(WAV_HEADER_LEN);

    // RIFF header
    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&(36 + data_len).to_le_bytes());
    header.extend_from_slice(b"WAVE");

    // fmt chunk
    header.extend_from_slice(b"fmt ");
    header.extend_from_slice(&16u32.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    header.extend_from_slice(&channels.to_le_bytes());
    header.extend_from_slice(&format.sample_rate.to_le_bytes());
    header.extend_from_slice(&byte_rate.to_le_bytes());
    header.extend_from_slice(&block_align.to_le_bytes());
    header.extend_from_slice(&bit_depth.to_le_bytes());

    // data chunk
    header.extend_from_slice(b"data");
    header.extend_from_slice(&data_len.to_le_bytes());

    header
}

/// Serialize a buffer as a complete WAV file image
pub fn encode_pcm16(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    let data_len = buffer
        .len()
        .checked_mul(2)
        .and_then(|len| u32::try_from(len).ok())
        .filter(|len| *len <= u32::MAX - 36)
        .ok_or_else(|| {
            AecError::ShapeMismatch(format!(
                "{} samples do not fit in a WAV file",
                buffer.len()
            ))
        })?;

    let mut bytes = wav_header(&buffer.format(), data_len);
    bytes.reserve(data_len as usize);
    for sample in buffer.samples() {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    Ok(bytes)
}

/// Write a buffer to `path` as 16-bit PCM WAV
pub fn write_pcm16(path: &Path, buffer: &AudioBuffer) -> Result<()> {
    let bytes = encode_pcm16(buffer)?;
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&bytes)?;
    writer.flush()?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}
