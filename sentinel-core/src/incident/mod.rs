//! Incident and team records shared between the call pipeline, the dispatch
//! matcher, and the presentation consumer.
//!
//! All types serialize with camelCase field names — the contract the
//! dashboard reads. Records are append-only: an incident is created exactly
//! once per analyzed call turn and afterwards only transitions status.

pub mod geo;

use serde::{Deserialize, Serialize};

/// Severity ladder. P0 is critical (active life threat), P4 non-emergency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
    P4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentType {
    Medical,
    Fire,
    Accident,
    Disaster,
    Security,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamType {
    Medical,
    Fire,
    Police,
    Rescue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TeamStatus {
    Available,
    Assigned,
    EnRoute,
    OnScene,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    New,
    Assigned,
    Resolved,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentLocation {
    pub lat: f64,
    pub lng: f64,
    pub address: String,
    /// Geocoding confidence in [0, 1].
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentAnalysis {
    /// 1–10.
    pub panic_level: u8,
    /// 0–100.
    pub urgency_score: u8,
    pub emotional_state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedResponse {
    /// Ranked best-first; the matcher uses the head as the preferred type.
    pub team_types: Vec<TeamType>,
    pub quantity: u32,
    pub equipment: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerInfo {
    pub phone: String,
    pub language: String,
    pub on_line: bool,
}

impl Default for CallerInfo {
    fn default() -> Self {
        Self {
            phone: "Unknown".into(),
            language: "English".into(),
            on_line: true,
        }
    }
}

/// One triaged emergency. Created by the call pipeline, assigned by the
/// dispatch transaction, resolved manually. Never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    pub location: IncidentLocation,
    pub priority: Priority,
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    pub description: String,
    pub estimated_victims: u32,
    pub keywords: Vec<String>,
    pub caller_info: CallerInfo,
    pub sentiment: SentimentAnalysis,
    pub status: IncidentStatus,
    pub special_flags: Vec<String>,
    pub recommended_response: RecommendedResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_team_id: Option<String>,
    /// Full turn history the analysis was derived from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

/// A responder unit. Status and assignment mutate only through the store's
/// assignment transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    #[serde(rename = "type")]
    pub team_type: TeamType,
    pub status: TeamStatus,
    pub location: IncidentLocation,
    pub capacity: u32,
    pub equipment: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_incident_id: Option<String>,
}

impl Team {
    /// Convenience constructor for rosters; position/equipment filled in later.
    pub fn available(id: &str, team_type: TeamType, address: &str) -> Self {
        Self {
            id: id.into(),
            team_type,
            status: TeamStatus::Available,
            location: IncidentLocation {
                lat: 0.0,
                lng: 0.0,
                address: address.into(),
                confidence: 1.0,
            },
            capacity: 2,
            equipment: Vec::new(),
            assigned_incident_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Analysis wire schema
// ---------------------------------------------------------------------------

/// Structured result the understanding service returns for a transcript.
///
/// Mirrors the JSON schema in the service instruction set; coordinates may
/// be absent, in which case [`geo::GeoFallback`] fills them in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub location: AnalysisLocation,
    pub incident_type: IncidentType,
    pub priority: Priority,
    pub description: String,
    pub estimated_victims: u32,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub sentiment_analysis: SentimentAnalysis,
    #[serde(default)]
    pub safety_instructions_given: Vec<String>,
    #[serde(default)]
    pub requires_immediate_action: bool,
    #[serde(default)]
    pub special_flags: Vec<String>,
    pub recommended_response: AnalysisResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisLocation {
    #[serde(default)]
    pub address: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    #[serde(rename = "teamType", default)]
    pub team_types: Vec<TeamType>,
    #[serde(rename = "teamQuantity", default)]
    pub quantity: u32,
    #[serde(rename = "specialEquipment", default)]
    pub equipment: Vec<String>,
}
