//! Conversions between raw f32 samples and the wire formats used at the
//! service boundary.
//!
//! Three layers, all pure:
//!
//! 1. PCM16 — samples are clamped to [-1, 1], scaled to i16, little-endian
//!    packed. This is what the realtime channel and the TTS service exchange.
//! 2. Transport — PCM16 byte payloads are base64-framed on the wire.
//! 3. WAV — finished call clips are wrapped in a RIFF container (hound)
//!    before the transcription upload, which wants a self-describing blob.
//!
//! Inbound payloads may arrive at any rate; `decode_pcm` resamples to the
//! playback rate with linear interpolation (one-shot buffers, unlike the
//! streaming capture path which goes through `RateConverter`).

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::buffering::frame::AudioFrame;
use crate::error::{Result, SentinelError};

/// Pack f32 samples into little-endian signed 16-bit PCM.
///
/// Out-of-range samples are clamped. Empty input yields empty output.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * 32767.0) as i16;
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Interpret little-endian 16-bit PCM bytes as a playable frame at
/// `target_rate`, resampling from `source_rate` when the rates differ.
///
/// # Errors
/// Returns `SentinelError::Decode` when the byte length is not a multiple
/// of 2.
pub fn decode_pcm(bytes: &[u8], source_rate: u32, target_rate: u32) -> Result<AudioFrame> {
    if bytes.len() % 2 != 0 {
        return Err(SentinelError::Decode(format!(
            "pcm16 payload length {} is not sample-aligned",
            bytes.len()
        )));
    }

    let samples: Vec<f32> = bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect();

    if source_rate == target_rate {
        return Ok(AudioFrame::new(samples, target_rate));
    }

    Ok(AudioFrame::new(
        resample_linear(&samples, source_rate, target_rate),
        target_rate,
    ))
}

/// One-shot linear resampler for complete inbound buffers.
///
/// Output length is `round(len * target/source)`, so total duration is
/// preserved within one sample period.
fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let ratio = source_rate as f64 / target_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let idx = pos as usize;
        let frac = (pos - idx as f64) as f32;
        let a = samples[idx.min(samples.len() - 1)];
        let b = samples[(idx + 1).min(samples.len() - 1)];
        out.push(a + (b - a) * frac);
    }

    out
}

/// Frame binary audio for the network boundary.
pub fn encode_transport(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Unframe a base64 transport payload.
///
/// # Errors
/// Returns `SentinelError::Decode` on malformed base64.
pub fn decode_transport(payload: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(payload)
        .map_err(|e| SentinelError::Decode(format!("base64: {e}")))
}

/// Wrap f32 samples in an in-memory mono 16-bit WAV container.
///
/// The transcription service takes a self-describing clip plus a mime type;
/// this produces the `audio/wav` blob for it.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| SentinelError::Decode(format!("wav header: {e}")))?;
        for &s in samples {
            let v = (s.clamp(-1.0, 1.0) * 32767.0) as i16;
            writer
                .write_sample(v)
                .map_err(|e| SentinelError::Decode(format!("wav sample: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| SentinelError::Decode(format!("wav finalize: {e}")))?;
    }

    Ok(cursor.into_inner())
}
