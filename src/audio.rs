//! PCM audio helpers: base64 decoding and RIFF/WAVE container encoding.
//!
//! Gemini TTS returns raw 16-bit little-endian PCM (24kHz, mono) as base64.
//! These helpers turn that payload into a self-describing WAV buffer.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Sample format produced by the Gemini TTS models.
pub const TTS_SAMPLE_RATE: u32 = 24000;
pub const TTS_CHANNELS: u16 = 1;
pub const TTS_BITS_PER_SAMPLE: u16 = 16;

/// Size of the canonical PCM header written by [`encode_wav`].
pub const WAV_HEADER_LEN: usize = 44;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error(
        "invalid format parameters: sample_rate={sample_rate}, channels={channels}, bits_per_sample={bits_per_sample}"
    )]
    InvalidFormatParameters {
        sample_rate: u32,
        channels: u16,
        bits_per_sample: u16,
    },
    #[error("sample payload too large for a WAV container: {0} bytes")]
    PayloadTooLarge(usize),
    #[error("malformed base64 audio: {0}")]
    MalformedEncoding(#[from] base64::DecodeError),
    #[error("unreadable WAV container: {0}")]
    Container(#[from] hound::Error),
}

/// Decode standard (padded) base64 into raw bytes.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, AudioError> {
    Ok(STANDARD.decode(text.trim())?)
}

/// Wrap raw PCM bytes in a 44-byte RIFF/WAVE header.
///
/// The samples are copied verbatim after the header; nothing is resampled
/// or reinterpreted. Output length is always `44 + samples.len()`.
pub fn encode_wav(
    samples: &[u8],
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
) -> Result<Vec<u8>, AudioError> {
    let invalid = || AudioError::InvalidFormatParameters {
        sample_rate,
        channels,
        bits_per_sample,
    };

    if sample_rate == 0 || channels == 0 || bits_per_sample == 0 || bits_per_sample % 8 != 0 {
        return Err(invalid());
    }

    let block_align = u16::try_from(u32::from(channels) * u32::from(bits_per_sample) / 8)
        .map_err(|_| invalid())?;
    let byte_rate = sample_rate
        .checked_mul(u32::from(block_align))
        .ok_or_else(invalid)?;

    let data_len = u32::try_from(samples.len())
        .ok()
        .filter(|len| len.checked_add(36).is_some())
        .ok_or(AudioError::PayloadTooLarge(samples.len()))?;

    let mut out = Vec::with_capacity(WAV_HEADER_LEN + samples.len());

    // RIFF header
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    // fmt chunk (PCM)
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(samples);

    Ok(out)
}

/// Format parameters recovered from an encoded container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    /// Number of frames (samples per channel).
    pub frames: u32,
}

impl WavInfo {
    pub fn parse(bytes: &[u8]) -> Result<Self, AudioError> {
        let reader = hound::WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();
        Ok(Self {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
            frames: reader.duration(),
        })
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }
}
