//! Gemini REST backends for the three service boundaries.
//!
//! One blocking `reqwest` client serves all three calls; the pipeline
//! already runs on a worker thread, so blocking I/O is fine here.
//!
//! The analysis call pins the output schema through a fixed instruction set
//! and `responseMimeType: application/json`; anything that fails to parse
//! against [`AnalysisResult`] is reported as `Ok(None)` (soft failure).

use reqwest::blocking::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{Result, SentinelError};
use crate::incident::AnalysisResult;
use crate::services::{IncidentAnalyzer, SpeechSynthesizer, Transcriber};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const ANALYSIS_MODEL: &str = "gemini-3-flash-preview";
const TRANSCRIBE_MODEL: &str = "gemini-3-flash-preview";
const TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";
const TTS_VOICE: &str = "Puck";

/// Instruction set describing the required analysis output schema.
const SYSTEM_PROMPT: &str = r#"You are an emergency response AI voice agent. Your role is to:

1. Stay calm and reassuring no matter how panicked the caller is
2. Quickly extract critical information: location, type of emergency, number of people affected
3. Ask clarifying questions if information is unclear
4. Provide immediate safety instructions while help is dispatched
5. Assign priority based on severity analysis

PRIORITY ASSIGNMENT RULES:
- P0 (Critical): Multiple casualties, active life threat, ongoing disaster, cardiac arrest, severe bleeding, building collapse
- P1 (High): Single casualty with life threat, severe injury, trapped person, difficulty breathing, chest pain
- P2 (Medium): Injuries needing urgent care, stable but serious, fire contained, moderate accident
- P3 (Low): Minor injuries, stable situation, property damage only
- P4 (Non-Emergency): Information request, non-urgent assistance

EXTRACT AND RETURN THIS JSON:
{
  "location": {"address": "", "lat": null, "lng": null, "confidence": 0-1},
  "incidentType": "medical|fire|accident|disaster|security",
  "priority": "P0|P1|P2|P3|P4",
  "description": "brief summary",
  "estimatedVictims": number,
  "keywords": ["keyword1", "keyword2"],
  "sentimentAnalysis": {
    "panicLevel": 1-10,
    "urgencyScore": 0-100,
    "emotionalState": "calm|worried|panicked|distressed"
  },
  "safetyInstructionsGiven": ["instruction1", "instruction2"],
  "requiresImmediateAction": boolean,
  "specialFlags": ["language_barrier", "caller_injured", "call_dropped"],
  "recommendedResponse": {
    "teamType": ["medical", "fire", "police", "rescue"],
    "teamQuantity": number,
    "specialEquipment": []
  }
}
Respond with ONLY the JSON object."#;

/// Shared client for the Gemini speech/understanding endpoints.
pub struct GeminiClient {
    http: Client,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: Client::new(),
            api_key,
        }
    }

    /// Build a client from the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| SentinelError::Transport("GEMINI_API_KEY not set".into()))?;
        Ok(Self::new(api_key))
    }

    fn generate(&self, model: &str, body: Value) -> Result<Value> {
        let url = format!("{BASE_URL}/{model}:generateContent?key={}", self.api_key);
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| SentinelError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SentinelError::Transport(format!(
                "{model} returned {}",
                response.status()
            )));
        }

        response
            .json::<Value>()
            .map_err(|e| SentinelError::Transport(format!("response body: {e}")))
    }

    /// First candidate text part, if any.
    fn first_text(value: &Value) -> Option<&str> {
        value["candidates"][0]["content"]["parts"][0]["text"].as_str()
    }

    /// First candidate inline-data payload (base64), if any.
    fn first_inline_data(value: &Value) -> Option<&str> {
        value["candidates"][0]["content"]["parts"][0]["inlineData"]["data"].as_str()
    }
}

impl Transcriber for GeminiClient {
    fn transcribe(&mut self, audio: &[u8], mime: &str) -> Result<String> {
        let body = json!({
            "contents": {
                "parts": [
                    {"inlineData": {"mimeType": mime, "data": crate::audio::codec::encode_transport(audio)}},
                    {"text": "Transcribe this audio exactly as spoken."}
                ]
            }
        });

        let value = self.generate(TRANSCRIBE_MODEL, body)?;
        Ok(Self::first_text(&value).unwrap_or_default().to_string())
    }
}

impl IncidentAnalyzer for GeminiClient {
    fn analyze(&mut self, history: &str) -> Result<Option<AnalysisResult>> {
        let body = json!({
            "contents": [{"parts": [{"text": history}]}],
            "systemInstruction": {"parts": [{"text": SYSTEM_PROMPT}]},
            "generationConfig": {"responseMimeType": "application/json"}
        });

        let value = self.generate(ANALYSIS_MODEL, body)?;
        let Some(text) = Self::first_text(&value) else {
            return Ok(None);
        };

        match serde_json::from_str::<AnalysisResult>(text) {
            Ok(result) => Ok(Some(result)),
            Err(e) => {
                warn!(error = %e, "analysis output did not match schema");
                Ok(None)
            }
        }
    }
}

impl SpeechSynthesizer for GeminiClient {
    fn synthesize(&mut self, text: &str) -> Result<Vec<u8>> {
        let body = json!({
            "contents": {"parts": [{"text": text}]},
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {"prebuiltVoiceConfig": {"voiceName": TTS_VOICE}}
                }
            }
        });

        let value = self.generate(TTS_MODEL, body)?;
        let Some(payload) = Self::first_inline_data(&value) else {
            debug!("TTS returned no audio payload");
            return Ok(Vec::new());
        };

        crate::audio::codec::decode_transport(payload)
    }
}
