//! # sentinel-core
//!
//! Emergency-dispatch console core: realtime voice intake, structured
//! triage, and deterministic team dispatch.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC RingBuffer → LiveSession uplink ─┐
//!                                                                   │
//!                                                    RealtimeChannel (duplex)
//!                                                                   │
//!          PlaybackScheduler ← LiveSession downlink ←───────────────┘
//!
//! Recorded clip → CallPipeline → Transcriber → IncidentAnalyzer
//!                                                    │
//!                                        DispatchStore::add_incident
//!                                                    │
//!                                        select_team → assignment
//! ```
//!
//! The audio callback is zero-alloc. All heap work happens on blocking
//! worker threads; hosts observe everything through broadcast events.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod call;
pub mod dispatch;
pub mod error;
pub mod incident;
pub mod ipc;
pub mod live;
pub mod services;
pub mod store;

// Convenience re-exports for downstream crates
pub use call::pipeline::{CallPipeline, PipelineConfig, TurnOutcome};
pub use dispatch::select_team;
pub use error::SentinelError;
pub use incident::{Incident, Team};
pub use ipc::events::{
    CallPhase, CallStatusEvent, SessionState, SessionStatusEvent, StoreEvent,
};
pub use live::{LiveConfig, LiveSession};
pub use store::DispatchStore;

#[cfg(feature = "gemini")]
pub use services::GeminiClient;
