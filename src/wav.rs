//! 16-bit PCM WAV encoding of rendered buffers.

use crate::renderer::AudioBuffer;

const HEADER_LEN: usize = 44;
const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: usize = 2;

/// Float sample to signed 16-bit: clamp to [-1, 1], scale negatives by
/// 32768 and the rest by 32767, truncating toward zero. NaN becomes 0.
pub fn sample_to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Encode the first `frames` frames of `buffer` as a RIFF/WAVE file with a
/// 44-byte header and interleaved little-endian samples. Frames past the end
/// of a channel are written as silence.
///
/// The format caps the header fields: channel counts past 65535 and data
/// past 4 GiB saturate there, so such files are not readable as WAV.
pub fn encode_wav(buffer: &AudioBuffer, frames: usize) -> Vec<u8> {
    let data_len = frames.saturating_mul(buffer.num_channels().saturating_mul(BYTES_PER_SAMPLE));
    let mut buf = Vec::with_capacity(HEADER_LEN.saturating_add(data_len));
    write_header(&mut buf, buffer.num_channels(), buffer.sample_rate(), frames);

    for frame in 0..frames {
        for channel in buffer.channels() {
            let sample = channel.get(frame).copied().unwrap_or(0.0);
            buf.extend_from_slice(&sample_to_i16(sample).to_le_bytes());
        }
    }

    buf
}

fn write_header(buf: &mut Vec<u8>, channels: usize, sample_rate: u32, frames: usize) {
    let block_align = channels.saturating_mul(BYTES_PER_SAMPLE);
    let data_size = frames.saturating_mul(block_align);
    let saturate = |n: usize| u32::try_from(n).unwrap_or(u32::MAX);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&saturate(data_size).saturating_add(36).to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&u16::try_from(channels).unwrap_or(u16::MAX).to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&sample_rate.saturating_mul(saturate(block_align)).to_le_bytes());
    buf.extend_from_slice(&u16::try_from(block_align).unwrap_or(u16::MAX).to_le_bytes());
    buf.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&saturate(data_size).to_le_bytes());
}
