//! Gapless playback scheduling.
//!
//! ## Design
//!
//! One `PlaybackScheduler` per active session owns a single piece of mutable
//! state: `next_start`, the earliest free slot on the playback clock.
//! `schedule` places each frame at `max(now, next_start)` and advances the
//! slot by the frame's duration, so frames that arrive faster than real time
//! queue back-to-back with no gap or overlap, and frames that arrive late
//! simply start late (no silence is synthesized to fill the hole — the
//! accepted degradation under network jitter).
//!
//! The scheduler mutates through `&mut self`; sessions never share one
//! instance, so the single-writer rule holds by construction.

use std::time::Instant;

use tracing::debug;

use crate::buffering::frame::AudioFrame;
use crate::error::Result;

/// Time source for the playback clock, in seconds.
///
/// Injectable so tests can freeze or step time deterministically.
pub trait PlaybackClock: Send {
    fn now(&self) -> f64;
}

/// Wall-clock seconds since construction.
pub struct WallClock {
    epoch: Instant,
}

impl WallClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock for WallClock {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// Destination for scheduled frames (speaker, test collector, …).
pub trait PlaybackSink: Send {
    /// Accept a frame scheduled to begin at `start_at` (clock seconds).
    /// Frames arrive in schedule order.
    fn play(&mut self, frame: AudioFrame, start_at: f64) -> Result<()>;
}

/// Sink that records scheduled frames; used in tests and as a no-device
/// fallback.
#[derive(Default)]
pub struct CollectingSink {
    pub played: Vec<(f64, AudioFrame)>,
}

impl PlaybackSink for CollectingSink {
    fn play(&mut self, frame: AudioFrame, start_at: f64) -> Result<()> {
        self.played.push((start_at, frame));
        Ok(())
    }
}

/// Owns the monotonic "next available slot" for one session.
pub struct PlaybackScheduler {
    clock: Box<dyn PlaybackClock>,
    next_start: f64,
}

impl PlaybackScheduler {
    pub fn new(clock: Box<dyn PlaybackClock>) -> Self {
        let next_start = clock.now();
        Self { clock, next_start }
    }

    /// Reserve the next slot for `frame`, returning its start time.
    ///
    /// Invariant: returned start times are non-decreasing, and each is at
    /// least the previous start plus the previous frame's duration.
    pub fn schedule(&mut self, frame: &AudioFrame) -> f64 {
        let start = self.clock.now().max(self.next_start);
        self.next_start = start + frame.duration_secs();
        debug!(
            start,
            next_start = self.next_start,
            samples = frame.samples.len(),
            "scheduled playback frame"
        );
        start
    }

    /// The earliest free slot on the playback clock.
    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    /// True when everything scheduled so far has finished playing.
    pub fn drained(&self) -> bool {
        self.clock.now() >= self.next_start
    }
}

#[cfg(feature = "audio-cpal")]
pub use player::AudioPlayer;

#[cfg(feature = "audio-cpal")]
mod player {
    //! cpal-backed speaker sink.
    //!
    //! Scheduled frames are appended to an SPSC ring in schedule order; the
    //! output callback drains it and plays zeros on underrun. Ordering and
    //! gaplessness are the scheduler's job — by the time frames reach this
    //! sink they are already back-to-back.
    //!
    //! `cpal::Stream` is `!Send`, so the stream lives on a dedicated thread
    //! that parks until shutdown; the handle returned to the caller holds
    //! only the ring producer and is freely `Send`.

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread::JoinHandle;
    use std::time::Duration;

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleRate, StreamConfig};
    use tracing::{error, info, warn};

    use crate::buffering::frame::AudioFrame;
    use crate::buffering::{create_audio_ring, AudioProducer, Consumer, Producer};
    use crate::error::{Result, SentinelError};

    use super::PlaybackSink;

    /// Speaker output at a fixed sample rate.
    pub struct AudioPlayer {
        producer: AudioProducer,
        running: Arc<AtomicBool>,
        stream_thread: Option<JoinHandle<()>>,
    }

    impl AudioPlayer {
        /// Open the default output device at `sample_rate` Hz mono.
        ///
        /// Blocks until the device is confirmed open (or fails).
        ///
        /// # Errors
        /// Returns `SentinelError::AudioDevice` when no output device exists
        /// or the stream cannot be built.
        pub fn open_default(sample_rate: u32) -> Result<Self> {
            let (producer, mut consumer) = create_audio_ring();
            let running = Arc::new(AtomicBool::new(true));
            let thread_running = Arc::clone(&running);

            // Sync channel: the stream thread reports open success/failure.
            let (open_tx, open_rx) = mpsc::channel::<Result<()>>();

            let stream_thread = std::thread::spawn(move || {
                let host = cpal::default_host();
                let Some(device) = host.default_output_device() else {
                    let _ = open_tx.send(Err(SentinelError::AudioDevice(
                        "no default output device".into(),
                    )));
                    return;
                };

                info!(
                    device = device.name().unwrap_or_default().as_str(),
                    sample_rate, "opening output device"
                );

                let config = StreamConfig {
                    channels: 1,
                    sample_rate: SampleRate(sample_rate),
                    buffer_size: cpal::BufferSize::Default,
                };

                let stream = device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _info| {
                        let filled = consumer.pop_slice(data);
                        // Underrun: late frames start late, the gap plays as silence.
                        data[filled..].fill(0.0);
                    },
                    |err| error!("output stream error: {err}"),
                    None,
                );

                let stream = match stream {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = open_tx.send(Err(SentinelError::AudioStream(e.to_string())));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = open_tx.send(Err(SentinelError::AudioStream(e.to_string())));
                    return;
                }
                let _ = open_tx.send(Ok(()));

                while thread_running.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_millis(50));
                }
                // Stream drops here, releasing the device on its own thread.
                drop(stream);
            });

            match open_rx.recv() {
                Ok(Ok(())) => Ok(Self {
                    producer,
                    running,
                    stream_thread: Some(stream_thread),
                }),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(SentinelError::AudioStream(
                    "output stream thread died during open".into(),
                )),
            }
        }
    }

    impl PlaybackSink for AudioPlayer {
        fn play(&mut self, frame: AudioFrame, _start_at: f64) -> Result<()> {
            let written = self.producer.push_slice(&frame.samples);
            if written < frame.samples.len() {
                warn!(
                    dropped = frame.samples.len() - written,
                    "output ring full: dropped samples"
                );
            }
            Ok(())
        }
    }

    impl Drop for AudioPlayer {
        fn drop(&mut self) {
            self.running.store(false, Ordering::Release);
            if let Some(handle) = self.stream_thread.take() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    /// Clock whose time only moves when the test says so (micros as u64).
    struct ManualClock(Arc<AtomicU64>);

    impl PlaybackClock for ManualClock {
        fn now(&self) -> f64 {
            self.0.load(Ordering::Relaxed) as f64 / 1e6
        }
    }

    fn frame_secs(duration: f64, rate: u32) -> AudioFrame {
        let n = (duration * rate as f64).round() as usize;
        AudioFrame::new(vec![0.0; n], rate)
    }

    #[test]
    fn frozen_clock_schedules_back_to_back() {
        let time = Arc::new(AtomicU64::new(0));
        let mut sched = PlaybackScheduler::new(Box::new(ManualClock(Arc::clone(&time))));

        // 2.0 s then 1.5 s with the clock frozen at 0.
        let first = sched.schedule(&frame_secs(2.0, 24_000));
        let second = sched.schedule(&frame_secs(1.5, 24_000));

        assert_eq!(first, 0.0);
        assert_eq!(second, 2.0);
        assert!((sched.next_start() - 3.5).abs() < 1e-9);
    }

    #[test]
    fn start_times_are_monotone_for_arbitrary_durations() {
        let time = Arc::new(AtomicU64::new(0));
        let mut sched = PlaybackScheduler::new(Box::new(ManualClock(Arc::clone(&time))));

        let durations = [0.3, 0.01, 1.2, 0.0, 0.7, 0.05];
        let mut prev_start = f64::NEG_INFINITY;
        let mut prev_end = 0.0f64;

        for (i, d) in durations.iter().enumerate() {
            // Jitter the clock around, including backwards-looking stalls.
            time.store((i as u64) * 137_000, Ordering::Relaxed);
            let start = sched.schedule(&frame_secs(*d, 24_000));
            assert!(start >= prev_start, "start regressed at frame {i}");
            assert!(
                start + 1e-9 >= prev_end,
                "frame {i} overlaps its predecessor"
            );
            prev_start = start;
            prev_end = start + d;
        }
    }

    #[test]
    fn late_frames_start_at_current_time_leaving_a_gap() {
        let time = Arc::new(AtomicU64::new(0));
        let mut sched = PlaybackScheduler::new(Box::new(ManualClock(Arc::clone(&time))));

        sched.schedule(&frame_secs(0.5, 24_000));
        // Clock advances past the end of the first frame.
        time.store(3_000_000, Ordering::Relaxed);
        let start = sched.schedule(&frame_secs(0.5, 24_000));

        assert_eq!(start, 3.0);
        assert!((sched.next_start() - 3.5).abs() < 1e-9);
    }

    #[test]
    fn next_start_never_decreases() {
        let time = Arc::new(AtomicU64::new(0));
        let mut sched = PlaybackScheduler::new(Box::new(ManualClock(Arc::clone(&time))));

        let mut prev = sched.next_start();
        for i in 0..20 {
            time.store(i * 50_000, Ordering::Relaxed);
            sched.schedule(&frame_secs(0.02, 24_000));
            assert!(sched.next_start() >= prev);
            prev = sched.next_start();
        }
    }

    #[test]
    fn drained_reflects_pending_audio() {
        let time = Arc::new(AtomicU64::new(0));
        let mut sched = PlaybackScheduler::new(Box::new(ManualClock(Arc::clone(&time))));

        assert!(sched.drained());
        sched.schedule(&frame_secs(1.0, 24_000));
        assert!(!sched.drained());
        time.store(1_000_000, Ordering::Relaxed);
        assert!(sched.drained());
    }
}
