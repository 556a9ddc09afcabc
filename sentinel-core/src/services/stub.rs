//! Deterministic stub backends.
//!
//! Used by the console demo and as scripted fakes in tests, so the full
//! intake → triage → dispatch path can be exercised without network access
//! or API keys.

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::debug;

use crate::audio::codec;
use crate::error::Result;
use crate::incident::{
    AnalysisLocation, AnalysisResponse, AnalysisResult, IncidentType, Priority, SentimentAnalysis,
    TeamType,
};
use crate::services::{
    ChannelEvent, IncidentAnalyzer, RealtimeChannel, SpeechSynthesizer, Transcriber,
};

/// Transcriber that replays a scripted sequence of utterances.
pub struct ScriptedTranscriber {
    lines: Vec<String>,
    next: usize,
}

impl ScriptedTranscriber {
    pub fn new<S: Into<String>>(lines: Vec<S>) -> Self {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            next: 0,
        }
    }
}

impl Transcriber for ScriptedTranscriber {
    fn transcribe(&mut self, audio: &[u8], mime: &str) -> Result<String> {
        debug!(bytes = audio.len(), mime, "stub transcription");
        let line = self.lines.get(self.next).cloned().unwrap_or_default();
        self.next += 1;
        Ok(line)
    }
}

/// Keyword triage: classifies the latest history text against a small rule
/// table. Good enough to drive the demo end-to-end.
#[derive(Default)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    fn classify(history: &str) -> (IncidentType, Priority, Vec<TeamType>) {
        let lower = history.to_lowercase();
        if lower.contains("breathing") || lower.contains("chest") || lower.contains("collapsed") {
            (
                IncidentType::Medical,
                Priority::P0,
                vec![TeamType::Medical],
            )
        } else if lower.contains("fire") || lower.contains("smoke") {
            (
                IncidentType::Fire,
                Priority::P1,
                vec![TeamType::Fire, TeamType::Medical],
            )
        } else if lower.contains("crash") || lower.contains("accident") {
            (
                IncidentType::Accident,
                Priority::P1,
                vec![TeamType::Rescue, TeamType::Medical],
            )
        } else if lower.contains("water") || lower.contains("flood") {
            (
                IncidentType::Disaster,
                Priority::P1,
                vec![TeamType::Rescue],
            )
        } else {
            (
                IncidentType::Security,
                Priority::P3,
                vec![TeamType::Police],
            )
        }
    }
}

impl IncidentAnalyzer for KeywordAnalyzer {
    fn analyze(&mut self, history: &str) -> Result<Option<AnalysisResult>> {
        if history.trim().is_empty() {
            return Ok(None);
        }

        let (incident_type, priority, team_types) = Self::classify(history);

        Ok(Some(AnalysisResult {
            location: AnalysisLocation {
                address: String::new(),
                lat: None,
                lng: None,
                confidence: 0.3,
            },
            incident_type,
            priority,
            description: history
                .lines()
                .last()
                .unwrap_or_default()
                .chars()
                .take(120)
                .collect(),
            estimated_victims: 1,
            keywords: Vec::new(),
            sentiment_analysis: SentimentAnalysis {
                panic_level: if priority == Priority::P0 { 9 } else { 5 },
                urgency_score: match priority {
                    Priority::P0 => 95,
                    Priority::P1 => 80,
                    _ => 40,
                },
                emotional_state: "worried".into(),
            },
            safety_instructions_given: Vec::new(),
            requires_immediate_action: priority <= Priority::P1,
            special_flags: Vec::new(),
            recommended_response: AnalysisResponse {
                team_types,
                quantity: 1,
                equipment: Vec::new(),
            },
        }))
    }
}

/// Synthesizer that renders a short tone per request — enough audio for the
/// scheduler path to be real without a TTS backend.
pub struct ToneSynthesizer {
    pub sample_rate: u32,
}

impl Default for ToneSynthesizer {
    fn default() -> Self {
        Self {
            sample_rate: crate::audio::PLAYBACK_RATE,
        }
    }
}

impl SpeechSynthesizer for ToneSynthesizer {
    fn synthesize(&mut self, text: &str) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        // ~40 ms of 440 Hz per 10 characters, capped at 2 s.
        let secs = (text.len() as f64 * 0.004).min(2.0);
        let n = (secs * self.sample_rate as f64) as usize;
        let samples: Vec<f32> = (0..n)
            .map(|i| {
                let t = i as f32 / self.sample_rate as f32;
                (t * 440.0 * std::f32::consts::TAU).sin() * 0.2
            })
            .collect();
        Ok(codec::encode_pcm16(&samples))
    }
}

/// Loopback realtime channel: echoes every inbound audio payload back as a
/// synthesized response after a turn, and exposes the sender side so tests
/// can inject arbitrary control events.
pub struct LoopbackChannel {
    event_tx: Sender<ChannelEvent>,
    event_rx: Option<Receiver<ChannelEvent>>,
    echo: bool,
    open: bool,
}

impl LoopbackChannel {
    pub fn new(echo: bool) -> Self {
        let (event_tx, event_rx) = bounded(64);
        Self {
            event_tx,
            event_rx: Some(event_rx),
            echo,
            open: false,
        }
    }

    /// Sender half for injecting events from a test or demo driver.
    pub fn event_sender(&self) -> Sender<ChannelEvent> {
        self.event_tx.clone()
    }
}

impl RealtimeChannel for LoopbackChannel {
    fn open(&mut self) -> Result<Receiver<ChannelEvent>> {
        self.open = true;
        let _ = self.event_tx.send(ChannelEvent::Opened);
        Ok(self
            .event_rx
            .take()
            .expect("loopback channel opened twice"))
    }

    fn send_audio(&mut self, payload: &str) -> Result<()> {
        if self.echo && self.open {
            let _ = self.event_tx.send(ChannelEvent::Audio(payload.to_string()));
            let _ = self.event_tx.send(ChannelEvent::TurnComplete);
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            let _ = self.event_tx.send(ChannelEvent::Closed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_analyzer_flags_cardiac_as_p0_medical() {
        let mut analyzer = KeywordAnalyzer;
        let result = analyzer
            .analyze("CALLER: my father collapsed and he's not breathing")
            .unwrap()
            .expect("parseable result");
        assert_eq!(result.priority, Priority::P0);
        assert_eq!(result.incident_type, IncidentType::Medical);
        assert_eq!(result.recommended_response.team_types[0], TeamType::Medical);
    }

    #[test]
    fn keyword_analyzer_returns_none_for_blank_history() {
        let mut analyzer = KeywordAnalyzer;
        assert!(analyzer.analyze("   ").unwrap().is_none());
    }

    #[test]
    fn tone_synthesizer_is_silent_for_blank_text() {
        let mut synth = ToneSynthesizer::default();
        assert!(synth.synthesize("  ").unwrap().is_empty());
        assert!(!synth.synthesize("Units are being dispatched.").unwrap().is_empty());
    }

    #[test]
    fn scripted_transcriber_replays_then_goes_quiet() {
        let mut stt = ScriptedTranscriber::new(vec!["help"]);
        assert_eq!(stt.transcribe(&[0; 4], "audio/wav").unwrap(), "help");
        assert_eq!(stt.transcribe(&[0; 4], "audio/wav").unwrap(), "");
    }

    #[test]
    fn loopback_channel_echoes_audio_and_completes_the_turn() {
        let mut ch = LoopbackChannel::new(true);
        let rx = ch.open().unwrap();
        assert_eq!(rx.recv().unwrap(), ChannelEvent::Opened);

        ch.send_audio("AAAA").unwrap();
        assert_eq!(rx.recv().unwrap(), ChannelEvent::Audio("AAAA".into()));
        assert_eq!(rx.recv().unwrap(), ChannelEvent::TurnComplete);

        ch.close();
        assert_eq!(rx.recv().unwrap(), ChannelEvent::Closed);
        // close is idempotent
        ch.close();
        assert!(rx.try_recv().is_err());
    }
}
