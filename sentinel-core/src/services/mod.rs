//! Remote-service abstractions.
//!
//! Speech-to-text, understanding, and synthesis are external services; the
//! traits here pin down only their input/output contracts. `&mut self`
//! intentionally expresses that backends may be stateful (HTTP sessions,
//! stream handles); callers serialise access by owning the boxes.
//!
//! All traits are synchronous and invoked from blocking worker threads
//! (`tokio::task::spawn_blocking`), keeping the async executor free.

pub mod stub;

#[cfg(feature = "gemini")]
pub mod gemini;

#[cfg(feature = "gemini")]
pub use gemini::GeminiClient;

use crossbeam_channel::Receiver;

use crate::error::Result;
use crate::incident::AnalysisResult;

/// Speech-to-text boundary.
pub trait Transcriber: Send + 'static {
    /// Transcribe a self-describing audio clip.
    ///
    /// An empty or whitespace-only string means "no speech detected" —
    /// callers must treat it as a soft condition, not an error.
    fn transcribe(&mut self, audio: &[u8], mime: &str) -> Result<String>;
}

/// Understanding/analysis boundary.
pub trait IncidentAnalyzer: Send + 'static {
    /// Extract a structured result from the full ordered turn history.
    ///
    /// `Ok(None)` means the service answered but its output was not
    /// parseable against the schema — a soft failure prompting a retry
    /// utterance, never a crash.
    fn analyze(&mut self, history: &str) -> Result<Option<AnalysisResult>>;
}

/// Text-to-speech boundary.
pub trait SpeechSynthesizer: Send + 'static {
    /// Synthesize `text` as little-endian PCM16 at 24 kHz.
    ///
    /// An empty payload is a silent no-op, not an error.
    fn synthesize(&mut self, text: &str) -> Result<Vec<u8>>;
}

/// Inbound control events on the realtime duplex channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Channel is open; streaming may begin.
    Opened,
    /// A synthesized audio payload (base64 PCM16 @ 24 kHz).
    Audio(String),
    /// The remote finished one response turn.
    TurnComplete,
    /// The remote closed the channel.
    Closed,
    /// The channel failed; the session must treat this as fatal.
    Error(String),
}

/// Bidirectional streaming channel to the realtime understanding service.
pub trait RealtimeChannel: Send + 'static {
    /// Open the channel; inbound events arrive on the returned receiver.
    fn open(&mut self) -> Result<Receiver<ChannelEvent>>;

    /// Push one outbound audio payload (base64 PCM16 @ 16 kHz).
    /// Frames are sent as produced; this layer applies no back-pressure.
    fn send_audio(&mut self, payload: &str) -> Result<()>;

    /// Close the channel. Must be idempotent.
    fn close(&mut self);
}
