//! Duplex session state machine.
//!
//! ## Design
//!
//! ```text
//!  mic ──► SPSC ring ──► uplink worker ──► RealtimeChannel
//!                         (resample 16 kHz,
//!                          fixed chunks,
//!                          pcm16 + base64)
//!
//!  RealtimeChannel ──► downlink worker ──► PlaybackScheduler ──► sink
//!                       (base64 decode,
//!                        24 kHz frames)
//! ```
//!
//! Both workers run on blocking threads (`tokio::task::spawn_blocking`) and
//! observe one shared `running` flag. Capture keeps streaming while the
//! remote speaks — barge-in is allowed; there is no half-duplex gate.
//!
//! States: `Disconnected → Connecting → Listening ⇄ Speaking`, back to
//! `Disconnected` on `disconnect()`, remote close, or channel error. There
//! is no automatic reconnect; the host decides whether to dial again.
//!
//! Teardown order is fixed: stop producing input, then close the channel,
//! then let playback wind down as the downlink worker exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::audio::codec::{decode_pcm, decode_transport, encode_pcm16, encode_transport};
use crate::audio::playback::{PlaybackClock, PlaybackScheduler, PlaybackSink, WallClock};
use crate::audio::resample::RateConverter;
use crate::audio::{CAPTURE_RATE, PLAYBACK_RATE};
use crate::buffering::{AudioConsumer, Consumer};
use crate::error::{Result, SentinelError};
use crate::ipc::events::{SessionState, SessionStatusEvent};
use crate::services::{ChannelEvent, RealtimeChannel};

/// Broadcast capacity for status events.
const STATUS_CAP: usize = 64;

/// Rubato input chunk for the uplink resampler.
const RESAMPLE_CHUNK: usize = 960;

/// How long workers sleep / wait between polls.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Downlink receive timeout; also paces the drained-playback check.
const DOWNLINK_TICK: Duration = Duration::from_millis(50);

/// Tunables for one session.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Sample rate of outbound audio (Hz).
    pub uplink_rate: u32,
    /// Sample rate of inbound synthesized audio (Hz).
    pub playback_rate: u32,
    /// Outbound frame size in samples at `uplink_rate`.
    pub chunk_samples: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            uplink_rate: CAPTURE_RATE,
            playback_rate: PLAYBACK_RATE,
            chunk_samples: 4096,
        }
    }
}

type SharedChannel = Arc<Mutex<Option<Box<dyn RealtimeChannel>>>>;

/// One live conversation with the remote voice agent.
///
/// Handles are cheap to share behind an `Arc`; all methods take `&self`.
pub struct LiveSession {
    config: LiveConfig,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<SessionState>>,
    status_tx: broadcast::Sender<SessionStatusEvent>,
    channel: SharedChannel,
}

impl LiveSession {
    pub fn new(config: LiveConfig) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_CAP);
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(SessionState::Disconnected)),
            status_tx,
            channel: Arc::new(Mutex::new(None)),
        }
    }

    /// Subscribe to session state transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionStatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Connect using the default microphone and speaker.
    ///
    /// Must be called from within a tokio runtime; the capture stream is
    /// opened on a dedicated thread because `cpal::Stream` is `!Send`.
    ///
    /// # Errors
    /// - `SentinelError::AlreadyRunning` when a session is active.
    /// - `SentinelError::PermissionDenied` / `NoInputDevice` when the
    ///   microphone cannot be opened; the session ends `Disconnected`.
    /// - `SentinelError::Transport` when the channel fails to open.
    #[cfg(feature = "audio-cpal")]
    pub fn connect(&self, channel: Box<dyn RealtimeChannel>) -> Result<()> {
        use crate::audio::playback::AudioPlayer;
        use crate::audio::AudioCapture;
        use crate::buffering::create_audio_ring;

        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SentinelError::AlreadyRunning);
        }
        self.set_state(SessionState::Connecting, Some("requesting microphone"));

        let (producer, consumer) = create_audio_ring();
        let cap_running = Arc::clone(&self.running);

        // The capture thread owns the !Send stream for the session lifetime
        // and confirms open success (with the device rate) over a sync
        // channel before connect() proceeds.
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();
        std::thread::spawn(move || {
            let capture =
                match AudioCapture::open_default(producer, Arc::clone(&cap_running)) {
                    Ok(capture) => {
                        let _ = open_tx.send(Ok(capture.sample_rate));
                        capture
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };
            while cap_running.load(Ordering::Relaxed) {
                std::thread::sleep(DOWNLINK_TICK);
            }
            capture.stop();
        });

        let capture_rate = match open_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                self.abort_connect(&format!("microphone unavailable: {e}"));
                return Err(e);
            }
            Err(_) => {
                self.abort_connect("capture thread died during open");
                return Err(SentinelError::AudioStream(
                    "capture thread died during open".into(),
                ));
            }
        };

        let sink = match AudioPlayer::open_default(self.config.playback_rate) {
            Ok(player) => Box::new(player) as Box<dyn PlaybackSink>,
            Err(e) => {
                self.abort_connect(&format!("speaker unavailable: {e}"));
                return Err(e);
            }
        };

        self.start_io(consumer, capture_rate, channel, sink, Box::new(WallClock::new()))
    }

    /// Connect with host-supplied capture and playback endpoints.
    ///
    /// `consumer` is the read side of a ring the host feeds with mono f32
    /// samples at `capture_rate`. Used by tests and headless hosts.
    pub fn connect_with_io(
        &self,
        consumer: AudioConsumer,
        capture_rate: u32,
        channel: Box<dyn RealtimeChannel>,
        sink: Box<dyn PlaybackSink>,
        clock: Box<dyn PlaybackClock>,
    ) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SentinelError::AlreadyRunning);
        }
        self.set_state(SessionState::Connecting, Some("opening realtime channel"));
        self.start_io(consumer, capture_rate, channel, sink, clock)
    }

    /// End the session. Idempotent; safe from any state, including while a
    /// connect is still in flight.
    pub fn disconnect(&self) {
        // Input first: the capture callback and uplink loop observe the flag
        // and stop producing before the channel goes away.
        self.running.store(false, Ordering::SeqCst);
        if let Some(mut channel) = self.channel.lock().take() {
            channel.close();
        }
        self.set_state(SessionState::Disconnected, Some("disconnected"));
        info!("live session disconnected");
    }

    // ── internals ──────────────────────────────────────────────────────

    /// Open the channel and spawn both workers. `running` is already true.
    fn start_io(
        &self,
        consumer: AudioConsumer,
        capture_rate: u32,
        mut channel: Box<dyn RealtimeChannel>,
        sink: Box<dyn PlaybackSink>,
        clock: Box<dyn PlaybackClock>,
    ) -> Result<()> {
        let events = match channel.open() {
            Ok(rx) => rx,
            Err(e) => {
                self.abort_connect(&format!("connection failed: {e}"));
                return Err(e);
            }
        };

        let converter =
            match RateConverter::new(capture_rate, self.config.uplink_rate, RESAMPLE_CHUNK) {
                Ok(converter) => converter,
                Err(e) => {
                    channel.close();
                    self.abort_connect(&format!("resampler init failed: {e}"));
                    return Err(e);
                }
            };

        {
            let mut guard = self.channel.lock();
            *guard = Some(channel);
            // A disconnect may have landed while open() was in flight; its
            // take() saw no channel, so roll back here instead of reviving
            // the session. The lock orders this against disconnect's take().
            if !self.running.load(Ordering::SeqCst) {
                if let Some(mut channel) = guard.take() {
                    channel.close();
                }
                debug!("disconnect raced the connect; rolling back");
                return Err(SentinelError::NotRunning);
            }
        }
        self.set_state(SessionState::Listening, Some("session open"));
        info!(capture_rate, uplink_rate = self.config.uplink_rate, "live session connected");

        let uplink = UplinkWorker {
            consumer,
            converter,
            chunk_samples: self.config.chunk_samples,
            channel: Arc::clone(&self.channel),
            running: Arc::clone(&self.running),
            state: Arc::clone(&self.state),
            status_tx: self.status_tx.clone(),
        };
        tokio::task::spawn_blocking(move || uplink.run());

        let downlink = DownlinkWorker {
            events,
            scheduler: PlaybackScheduler::new(clock),
            sink,
            playback_rate: self.config.playback_rate,
            channel: Arc::clone(&self.channel),
            running: Arc::clone(&self.running),
            state: Arc::clone(&self.state),
            status_tx: self.status_tx.clone(),
        };
        tokio::task::spawn_blocking(move || downlink.run());

        Ok(())
    }

    /// Roll back a half-open connect.
    fn abort_connect(&self, detail: &str) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(mut channel) = self.channel.lock().take() {
            channel.close();
        }
        warn!(detail, "live session connect aborted");
        self.set_state(SessionState::Disconnected, Some(detail));
    }

    fn set_state(&self, next: SessionState, detail: Option<&str>) {
        transition(&self.state, &self.status_tx, next, detail);
    }
}

impl Default for LiveSession {
    fn default() -> Self {
        Self::new(LiveConfig::default())
    }
}

/// Emit a status event iff the state actually changes.
fn transition(
    state: &Mutex<SessionState>,
    status_tx: &broadcast::Sender<SessionStatusEvent>,
    next: SessionState,
    detail: Option<&str>,
) {
    {
        let mut current = state.lock();
        if *current == next {
            return;
        }
        *current = next;
    }
    debug!(state = ?next, detail, "session state");
    let _ = status_tx.send(SessionStatusEvent {
        state: next,
        detail: detail.map(str::to_string),
    });
}

/// Ring → resample → fixed chunks → base64 → channel.
struct UplinkWorker {
    consumer: AudioConsumer,
    converter: RateConverter,
    chunk_samples: usize,
    channel: SharedChannel,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<SessionState>>,
    status_tx: broadcast::Sender<SessionStatusEvent>,
}

impl UplinkWorker {
    fn run(mut self) {
        let mut scratch = vec![0.0f32; self.chunk_samples];
        let mut pending: Vec<f32> = Vec::new();

        while self.running.load(Ordering::Relaxed) {
            let popped = self.consumer.pop_slice(&mut scratch);
            if popped == 0 {
                std::thread::sleep(POLL_INTERVAL);
                continue;
            }

            pending.extend(self.converter.process(&scratch[..popped]));

            while pending.len() >= self.chunk_samples {
                let chunk: Vec<f32> = pending.drain(..self.chunk_samples).collect();
                let payload = encode_transport(&encode_pcm16(&chunk));

                let mut guard = self.channel.lock();
                let Some(channel) = guard.as_mut() else {
                    return; // disconnect raced us; nothing left to send to
                };
                if let Err(e) = channel.send_audio(&payload) {
                    drop(guard);
                    warn!("uplink send failed: {e}");
                    self.running.store(false, Ordering::SeqCst);
                    if let Some(mut channel) = self.channel.lock().take() {
                        channel.close();
                    }
                    transition(
                        &self.state,
                        &self.status_tx,
                        SessionState::Disconnected,
                        Some("transport failure"),
                    );
                    return;
                }
            }
        }
        debug!("uplink worker exiting");
    }
}

/// Channel events → decoded 24 kHz frames → scheduler → sink.
struct DownlinkWorker {
    events: Receiver<ChannelEvent>,
    scheduler: PlaybackScheduler,
    sink: Box<dyn PlaybackSink>,
    playback_rate: u32,
    channel: SharedChannel,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<SessionState>>,
    status_tx: broadcast::Sender<SessionStatusEvent>,
}

impl DownlinkWorker {
    fn run(mut self) {
        let detail = loop {
            if !self.running.load(Ordering::Relaxed) {
                break None;
            }
            match self.events.recv_timeout(DOWNLINK_TICK) {
                Ok(ChannelEvent::Opened) => debug!("channel confirmed open"),
                Ok(ChannelEvent::Audio(payload)) => self.on_audio(&payload),
                Ok(ChannelEvent::TurnComplete) => debug!("remote turn complete"),
                Ok(ChannelEvent::Closed) => break Some("remote closed".to_string()),
                Ok(ChannelEvent::Error(msg)) => {
                    warn!("channel error: {msg}");
                    break Some(format!("channel error: {msg}"));
                }
                Err(RecvTimeoutError::Timeout) => {
                    // Flip back to Listening once scheduled audio plays out.
                    if *self.state.lock() == SessionState::Speaking && self.scheduler.drained() {
                        transition(
                            &self.state,
                            &self.status_tx,
                            SessionState::Listening,
                            Some("response played out"),
                        );
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break None,
            }
        };

        // Same teardown order as disconnect(): input stops (flag), channel
        // closes, playback drops with the worker.
        self.running.store(false, Ordering::SeqCst);
        if let Some(mut channel) = self.channel.lock().take() {
            channel.close();
        }
        if let Some(detail) = detail {
            transition(
                &self.state,
                &self.status_tx,
                SessionState::Disconnected,
                Some(&detail),
            );
        }
        debug!("downlink worker exiting");
    }

    fn on_audio(&mut self, payload: &str) {
        let frame = decode_transport(payload)
            .and_then(|bytes| decode_pcm(&bytes, self.playback_rate, self.playback_rate));
        match frame {
            Ok(frame) if !frame.is_empty() => {
                let start = self.scheduler.schedule(&frame);
                if let Err(e) = self.sink.play(frame, start) {
                    warn!("playback sink rejected frame: {e}");
                }
                transition(
                    &self.state,
                    &self.status_tx,
                    SessionState::Speaking,
                    Some("playing response audio"),
                );
            }
            Ok(_) => {}
            // An undecodable payload is skipped; the session stays up.
            Err(e) => warn!("dropping undecodable audio payload: {e}"),
        }
    }
}
