//! Call-turn pipeline: one caller utterance in, one triaged incident out.
//!
//! ## State machine
//!
//! ```text
//! Idle ──start_call──► Active ──begin_recording──► Recording
//!                        ▲                             │
//!                        │                     finish_recording
//!                        │                             ▼
//!                        └──◄── Responded ◄── Analyzing
//! ```
//!
//! `finish_recording` runs the whole turn: validate clip → transcribe →
//! append caller turn → analyze full history → build incident → store →
//! speak confirmation. Every failure path lands back in `Active`; the
//! machine can never wedge in `Analyzing`.
//!
//! Service calls are blocking; drive this from a worker thread
//! (`tokio::task::spawn_blocking`), not from the async executor.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::audio::codec;
use crate::audio::playback::{PlaybackScheduler, PlaybackSink};
use crate::audio::PLAYBACK_RATE;
use crate::call::{Transcript, TurnRole};
use crate::error::Result;
use crate::incident::geo::GeoFallback;
use crate::incident::{
    AnalysisResult, CallerInfo, Incident, IncidentLocation, IncidentStatus, RecommendedResponse,
};
use crate::ipc::events::{CallPhase, CallStatusEvent};
use crate::services::{IncidentAnalyzer, SpeechSynthesizer, Transcriber};
use crate::store::DispatchStore;

const OPENING_PROMPT: &str =
    "911 Emergency. What is your location and the nature of your emergency?";
const NO_SPEECH_PROMPT: &str = "I didn't catch that. Could you say it again?";
const RETRY_PROMPT: &str = "I couldn't hear you clearly. Please repeat.";
const FAULT_PROMPT: &str = "System error. Please state your emergency again.";

/// Broadcast capacity for phase-change events.
const STATUS_CAP: usize = 64;

/// Tunables for one intake console.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Clips smaller than this are treated as noise and discarded silently.
    pub min_clip_bytes: usize,
    /// Geolocation fallback policy for analyses without coordinates.
    pub geo: GeoFallback,
    /// Fixed RNG seed for the geo fallback (tests); `None` uses entropy.
    pub geo_seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_clip_bytes: 1_000,
            geo: GeoFallback::default(),
            geo_seed: None,
        }
    }
}

/// What one finished recording produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Clip under the byte threshold; nothing was sent anywhere.
    ClipTooShort,
    /// Transcription came back empty — no speech detected.
    NoSpeech,
    /// Incident created and stored.
    Logged(String),
    /// Analysis output was unparseable; caller asked to repeat.
    Unparseable,
    /// A service call failed; generic error prompt spoken.
    ServiceFault,
}

/// Per-call orchestrator. Owns the transcript, the service boxes, and the
/// agent's voice output; shares only the store.
pub struct CallPipeline {
    phase: CallPhase,
    transcript: Transcript,
    transcriber: Box<dyn Transcriber>,
    analyzer: Box<dyn IncidentAnalyzer>,
    synthesizer: Box<dyn SpeechSynthesizer>,
    scheduler: PlaybackScheduler,
    sink: Box<dyn PlaybackSink>,
    store: Arc<DispatchStore>,
    config: PipelineConfig,
    geo_rng: StdRng,
    status_tx: broadcast::Sender<CallStatusEvent>,
    incident_seq: AtomicU64,
}

impl CallPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transcriber: Box<dyn Transcriber>,
        analyzer: Box<dyn IncidentAnalyzer>,
        synthesizer: Box<dyn SpeechSynthesizer>,
        scheduler: PlaybackScheduler,
        sink: Box<dyn PlaybackSink>,
        store: Arc<DispatchStore>,
        config: PipelineConfig,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_CAP);
        let geo_rng = match config.geo_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            phase: CallPhase::Idle,
            transcript: Transcript::new(),
            transcriber,
            analyzer,
            synthesizer,
            scheduler,
            sink,
            store,
            config,
            geo_rng,
            status_tx,
            incident_seq: AtomicU64::new(1),
        }
    }

    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Subscribe to phase-change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<CallStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Open the line: speak the opening prompt and start listening.
    pub fn start_call(&mut self) {
        self.transcript.clear();
        self.agent_speak(OPENING_PROMPT);
        self.set_phase(CallPhase::Active, None);
        info!("call started");
    }

    /// Caller-controlled capture start.
    pub fn begin_recording(&mut self) {
        if self.phase == CallPhase::Active {
            self.set_phase(CallPhase::Recording, None);
        }
    }

    /// Caller-controlled capture stop; runs the turn end-to-end.
    ///
    /// Never returns a service error — faults are absorbed into
    /// [`TurnOutcome::ServiceFault`] and the line stays open.
    pub fn finish_recording(&mut self, clip: &[u8], mime: &str) -> TurnOutcome {
        if clip.len() < self.config.min_clip_bytes {
            // Noise, not speech. Discard without touching any service.
            info!(bytes = clip.len(), "clip under threshold — discarded");
            self.set_phase(CallPhase::Active, None);
            return TurnOutcome::ClipTooShort;
        }

        self.set_phase(CallPhase::Analyzing, None);

        match self.run_turn(clip, mime) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "service fault during call turn");
                self.agent_speak(FAULT_PROMPT);
                self.set_phase(CallPhase::Active, Some(e.to_string()));
                TurnOutcome::ServiceFault
            }
        }
    }

    /// Hang up. Terminal: the transcript is kept for inspection but the
    /// machine returns to `Idle`.
    pub fn end_call(&mut self) {
        self.set_phase(CallPhase::Idle, None);
        info!("call ended");
    }

    // ── Turn internals ───────────────────────────────────────────────────

    fn run_turn(&mut self, clip: &[u8], mime: &str) -> Result<TurnOutcome> {
        let text = self.transcriber.transcribe(clip, mime)?;
        if text.trim().is_empty() {
            info!("transcription empty — no speech detected");
            self.agent_speak(NO_SPEECH_PROMPT);
            self.set_phase(CallPhase::Active, None);
            return Ok(TurnOutcome::NoSpeech);
        }

        self.transcript.push(TurnRole::Caller, text);
        let history = self.transcript.render_history();

        let Some(analysis) = self.analyzer.analyze(&history)? else {
            self.agent_speak(RETRY_PROMPT);
            self.set_phase(CallPhase::Active, None);
            return Ok(TurnOutcome::Unparseable);
        };

        let incident = self.build_incident(analysis, history);
        let incident_id = incident.id.clone();
        let confirmation = Self::confirmation_text(&incident);
        self.store.add_incident(incident);

        self.agent_speak(&confirmation);
        self.set_phase(CallPhase::Responded, None);
        self.set_phase(CallPhase::Active, None);

        Ok(TurnOutcome::Logged(incident_id))
    }

    fn build_incident(&mut self, analysis: AnalysisResult, history: String) -> Incident {
        let (lat, lng) = match (analysis.location.lat, analysis.location.lng) {
            (Some(lat), Some(lng)) => (lat, lng),
            // Documented degradation: jitter the reference center.
            _ => self.config.geo.sample(&mut self.geo_rng),
        };

        let now = Utc::now();
        let seq = self.incident_seq.fetch_add(1, Ordering::Relaxed);
        let id = format!("INC-{}-{seq:04}", now.format("%Y%m%d"));

        Incident {
            id,
            created_at: now.timestamp_millis(),
            location: IncidentLocation {
                lat,
                lng,
                address: analysis.location.address,
                confidence: analysis.location.confidence,
            },
            priority: analysis.priority,
            incident_type: analysis.incident_type,
            description: analysis.description,
            estimated_victims: analysis.estimated_victims,
            keywords: analysis.keywords,
            caller_info: CallerInfo::default(),
            sentiment: analysis.sentiment_analysis,
            status: IncidentStatus::New,
            special_flags: analysis.special_flags,
            recommended_response: RecommendedResponse {
                team_types: analysis.recommended_response.team_types,
                quantity: analysis.recommended_response.quantity,
                equipment: analysis.recommended_response.equipment,
            },
            assigned_team_id: None,
            transcript: Some(history),
        }
    }

    fn confirmation_text(incident: &Incident) -> String {
        if incident.location.address.is_empty() {
            "I've logged the details. Dispatching units now.".to_string()
        } else {
            format!(
                "I have logged the {} at {}. Units are being dispatched. Stay on the line.",
                match incident.incident_type {
                    crate::incident::IncidentType::Medical => "medical emergency",
                    crate::incident::IncidentType::Fire => "fire",
                    crate::incident::IncidentType::Accident => "accident",
                    crate::incident::IncidentType::Disaster => "disaster",
                    crate::incident::IncidentType::Security => "security incident",
                },
                incident.location.address
            )
        }
    }

    /// Append an agent turn and play its synthesized audio through the
    /// gapless scheduler. TTS faults are soft: the text still lands in the
    /// transcript and the call continues.
    fn agent_speak(&mut self, text: &str) {
        self.transcript.push(TurnRole::Agent, text);

        let pcm = match self.synthesizer.synthesize(text) {
            Ok(pcm) => pcm,
            Err(e) => {
                warn!(error = %e, "speech synthesis failed");
                return;
            }
        };
        if pcm.is_empty() {
            return; // silent no-op
        }

        match codec::decode_pcm(&pcm, PLAYBACK_RATE, PLAYBACK_RATE) {
            Ok(frame) => {
                let start_at = self.scheduler.schedule(&frame);
                if let Err(e) = self.sink.play(frame, start_at) {
                    warn!(error = %e, "playback sink rejected frame");
                }
            }
            Err(e) => {
                // Malformed payload: drop the frame, keep the call alive.
                warn!(error = %e, "dropping undecodable TTS payload");
            }
        }
    }

    fn set_phase(&mut self, phase: CallPhase, detail: Option<String>) {
        self.phase = phase;
        let _ = self.status_tx.send(CallStatusEvent { phase, detail });
    }
}
