//! Typed audio frame passed between the codec, transport, and scheduler.

/// A contiguous block of mono PCM samples at a known sample rate.
///
/// Ownership is transient: frames are produced by the codec or capture path
/// and consumed exactly once by the scheduler or the transport uplink.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (16000 for capture, 24000 for playback).
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Returns the duration of this frame in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Returns true if the frame contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
