//! Streaming sample-rate conversion for the capture uplink.
//!
//! Microphones capture at the device's native rate (commonly 48 kHz); the
//! remote understanding service wants 16 kHz mono f32. `RateConverter`
//! bridges that gap on the uplink thread with a rubato `FastFixedIn`
//! session, accumulating partial chunks between calls.
//!
//! When capture rate == target rate the converter is a passthrough and no
//! rubato session is created at all. One-shot inbound buffers take the
//! lighter path in [`crate::audio::codec::decode_pcm`] instead.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::error;

use crate::error::{Result, SentinelError};

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when capture rate == target rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Holds partial input chunks between calls.
    input_buf: Vec<f32>,
    /// Input samples rubato expects per process call.
    chunk_size: usize,
    /// Pre-allocated output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// Create a converter from `capture_rate` to `target_rate` with a fixed
    /// input `chunk_size`.
    ///
    /// # Errors
    /// Returns `SentinelError::AudioDevice` if rubato fails to initialise.
    pub fn new(capture_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        if capture_rate == target_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = target_rate as f64 / capture_rate as f64;

        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio — no dynamic adjustment
            PolynomialDegree::Cubic,
            chunk_size,
            1, // mono
        )
        .map_err(|e| SentinelError::AudioDevice(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        let output_buf = vec![vec![0f32; max_out]; 1];

        tracing::info!(capture_rate, target_rate, chunk_size, "uplink resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::new(),
            chunk_size,
            output_buf,
        })
    }

    /// Feed captured samples, returning any resampled output (may be empty
    /// while a partial chunk accumulates). Passthrough mode returns the
    /// input directly.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.input_buf.extend_from_slice(samples);

        let mut result = Vec::new();

        while self.input_buf.len() >= self.chunk_size {
            let input_slice = &self.input_buf[..self.chunk_size];

            match resampler.process_into_buffer(&[input_slice], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => {
                    error!("resampler process error: {e}");
                }
            }

            self.input_buf.drain(..self.chunk_size);
        }

        result
    }

    /// Returns `true` when no rate conversion occurs.
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}
