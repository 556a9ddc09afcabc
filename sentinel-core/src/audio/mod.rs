//! Audio capture via the cpal backend, plus codec / playback / resampling.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not** allocate, block on a mutex, or perform I/O. The callback
//! therefore writes straight into an SPSC ring buffer producer whose
//! `push_slice` is lock-free and allocation-free.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` must be created and dropped on the same thread;
//! the live session does this by opening it on a dedicated capture thread
//! that parks for the session lifetime.

pub mod codec;
pub mod playback;
pub mod resample;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    BuildStreamError, SampleFormat, SampleRate, Stream, StreamConfig,
};

use crate::{
    buffering::{AudioProducer, Producer},
    error::{Result, SentinelError},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Sample rate pushed to the remote understanding service.
pub const CAPTURE_RATE: u32 = 16_000;

/// Sample rate of synthesized audio coming back.
pub const PLAYBACK_RATE: u32 = 24_000;

/// Handle to an active microphone capture stream.
///
/// **Not `Send`** — `cpal::Stream` is bound to its creation thread on
/// Windows/macOS. Create and drop this type on the same OS thread.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Shared flag — set to `false` to signal the callback to no-op.
    running: Arc<AtomicBool>,
    /// Actual capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
}

impl AudioCapture {
    /// Open the system default microphone and push mono f32 frames into
    /// `producer`. Multi-channel devices are downmixed by averaging.
    ///
    /// Must be called from the thread that will also drop this value —
    /// in practice, inside `tokio::task::spawn_blocking`.
    ///
    /// # Errors
    /// - `SentinelError::NoInputDevice` when no microphone exists.
    /// - `SentinelError::PermissionDenied` when the OS refuses access.
    /// - `SentinelError::AudioStream` for other cpal failures.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default(mut producer: AudioProducer, running: Arc<AtomicBool>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(SentinelError::NoInputDevice)?;

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| SentinelError::AudioDevice(e.to_string()))?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();

        info!(sample_rate, channels, "capture config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let cb_running = Arc::clone(&running);
        let ch = channels as usize;

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _info| {
                        if !cb_running.load(Ordering::Relaxed) {
                            return;
                        }
                        if ch == 1 {
                            let written = producer.push_slice(data);
                            if written < data.len() {
                                warn!("capture ring full: dropped {} frames", data.len() - written);
                            }
                            return;
                        }
                        let frames = data.len() / ch;
                        mix_buf.resize(frames, 0.0);
                        for f in 0..frames {
                            let base = f * ch;
                            mix_buf[f] = data[base..base + ch].iter().sum::<f32>() / ch as f32;
                        }
                        let written = producer.push_slice(&mix_buf);
                        if written < mix_buf.len() {
                            warn!("capture ring full: dropped {} frames", mix_buf.len() - written);
                        }
                    },
                    |err| error!("input stream error: {err}"),
                    None,
                )
            }

            SampleFormat::I16 => {
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _info| {
                        if !cb_running.load(Ordering::Relaxed) {
                            return;
                        }
                        let frames = data.len() / ch;
                        mix_buf.resize(frames, 0.0);
                        for f in 0..frames {
                            let base = f * ch;
                            let mut sum = 0f32;
                            for c in 0..ch {
                                sum += data[base + c] as f32 / 32768.0;
                            }
                            mix_buf[f] = sum / ch as f32;
                        }
                        let written = producer.push_slice(&mix_buf);
                        if written < mix_buf.len() {
                            warn!("capture ring full: dropped {} frames", mix_buf.len() - written);
                        }
                    },
                    |err| error!("input stream error: {err}"),
                    None,
                )
            }

            fmt => {
                return Err(SentinelError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| match e {
            BuildStreamError::DeviceNotAvailable => {
                SentinelError::PermissionDenied("input device refused or unplugged".into())
            }
            other => SentinelError::AudioStream(other.to_string()),
        })?;

        stream
            .play()
            .map_err(|e| SentinelError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Stop: signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_default(_producer: AudioProducer, _running: Arc<AtomicBool>) -> Result<Self> {
        Err(SentinelError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}
