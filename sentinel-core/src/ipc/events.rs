//! Events emitted over the broadcast channels the presentation layer
//! subscribes to.
//!
//! | Event | Source |
//! |-------|--------|
//! | `CallStatusEvent` | call-turn pipeline |
//! | `SessionStatusEvent` | live duplex session |
//! | `StoreEvent` | incident/team store |

use serde::{Deserialize, Serialize};

use crate::incident::Incident;

// ---------------------------------------------------------------------------
// Call-turn pipeline
// ---------------------------------------------------------------------------

/// State of the call-turn pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallPhase {
    /// No call in progress.
    Idle,
    /// Line open, awaiting caller speech.
    Active,
    /// Capturing a caller clip.
    Recording,
    /// Transcribing / analyzing the finished clip.
    Analyzing,
    /// Incident logged, confirmation spoken.
    Responded,
}

/// Emitted whenever the pipeline changes phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStatusEvent {
    pub phase: CallPhase,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

// ---------------------------------------------------------------------------
// Live duplex session
// ---------------------------------------------------------------------------

/// State of the live duplex session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Disconnected,
    Connecting,
    /// Channel open; outbound capture streaming.
    Listening,
    /// Inbound synthesized audio currently playing (capture continues).
    Speaking,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusEvent {
    pub state: SessionState,
    pub detail: Option<String>,
}

// ---------------------------------------------------------------------------
// Store notifications
// ---------------------------------------------------------------------------

/// Synchronous change notification from the incident/team store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StoreEvent {
    #[serde(rename_all = "camelCase")]
    IncidentAdded { incident: Incident },
    #[serde(rename_all = "camelCase")]
    TeamAssigned {
        incident_id: String,
        team_id: String,
    },
    #[serde(rename_all = "camelCase")]
    IncidentResolved { incident_id: String },
}
