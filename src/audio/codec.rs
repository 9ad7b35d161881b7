// Channel interleaving and downmix utilities
//
// Pure transforms between interleaved PCM and per-channel sequences, plus the
// mono downmix used ahead of delay analysis.

use serde::{Deserialize, Serialize};

use super::types::{AecError, Result};

/// How multi-channel audio is reduced to mono before delay analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownmixMode {
    /// Take only the first channel of each frame (stride sub-sampling)
    FirstChannel,
    /// Average all channels of each frame
    #[default]
    Average,
}

/// Interleave equal-length channel sequences into one buffer
pub fn interleave(channels: &[Vec<i16>]) -> Result<Vec<i16>> {
    let Some(first) = channels.first() else {
        return Err(AecError::ShapeMismatch(
            "cannot interleave an empty channel set".to_string(),
        ));
    };
    let frames = first.len();
    if let Some((index, channel)) = channels
        .iter()
        .enumerate()
        .find(|(_, channel)| channel.len() != frames)
    {
        return Err(AecError::ShapeMismatch(format!(
            "channel {} has {} samples, expected {}",
            index,
            channel.len(),
            frames
        )));
    }

    let mut interleaved = Vec::with_capacity(frames * channels.len());
    for frame in 0..frames {
        for channel in channels {
            interleaved.push(channel[frame]);
        }
    }
    Ok(interleaved)
}

/// Split an interleaved buffer into `channel_count` sequences
pub fn deinterleave(samples: &[i16], channel_count: usize) -> Result<Vec<Vec<i16>>> {
    if channel_count == 0 {
        return Err(AecError::ShapeMismatch(
            "channel count must be at least 1".to_string(),
        ));
    }
    if samples.len() % channel_count != 0 {
        return Err(AecError::ShapeMismatch(format!(
            "{} samples is not a multiple of {} channels",
            samples.len(),
            channel_count
        )));
    }

    let frames = samples.len() / channel_count;
    let mut channels = vec![Vec::with_capacity(frames); channel_count];
    for frame in samples.chunks_exact(channel_count) {
        for (channel, &sample) in channels.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }
    Ok(channels)
}

/// Reduce interleaved samples to a mono f64 sequence
///
/// Mono input passes through unchanged. A trailing partial frame is ignored.
pub fn downmix_to_mono(samples: &[i16], channel_count: usize, mode: DownmixMode) -> Vec<f64> {
    if channel_count <= 1 {
        return samples.iter().map(|&s| s as f64).collect();
    }

    samples
        .chunks_exact(channel_count)
        .map(|frame| match mode {
            DownmixMode::FirstChannel => frame[0] as f64,
            DownmixMode::Average => {
                frame.iter().map(|&s| s as f64).sum::<f64>() / channel_count as f64
            }
        })
        .collect()
}
