//! Call transcript primitives.

pub mod pipeline;

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    Caller,
    Agent,
}

/// One utterance in a call. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTurn {
    pub role: TurnRole,
    pub text: String,
    /// Unix epoch milliseconds. Strictly increasing within one call.
    pub at_ms: i64,
}

/// Append-only, strictly timestamp-increasing turn sequence for one call.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    turns: Vec<CallTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn. Timestamps are clamped forward so the sequence stays
    /// strictly increasing even when the wall clock stalls.
    pub fn push(&mut self, role: TurnRole, text: impl Into<String>) {
        let now = Utc::now().timestamp_millis();
        let at_ms = match self.turns.last() {
            Some(last) if now <= last.at_ms => last.at_ms + 1,
            _ => now,
        };
        self.turns.push(CallTurn {
            role,
            text: text.into(),
            at_ms,
        });
    }

    pub fn turns(&self) -> &[CallTurn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Render the full ordered history the way the understanding service
    /// expects it: `ROLE (HH:MM:SS): text`, one turn per line.
    pub fn render_history(&self) -> String {
        self.turns
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    TurnRole::Caller => "CALLER",
                    TurnRole::Agent => "AGENT",
                };
                let when = Utc
                    .timestamp_millis_opt(turn.at_ms)
                    .single()
                    .map(|t| t.format("%H:%M:%S").to_string())
                    .unwrap_or_default();
                format!("{role} ({when}): {}", turn.text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_timestamps_are_strictly_increasing() {
        let mut transcript = Transcript::new();
        for i in 0..50 {
            transcript.push(TurnRole::Caller, format!("turn {i}"));
        }
        let turns = transcript.turns();
        for pair in turns.windows(2) {
            assert!(pair[1].at_ms > pair[0].at_ms, "timestamps must increase");
        }
    }

    #[test]
    fn history_renders_roles_and_text_in_order() {
        let mut transcript = Transcript::new();
        transcript.push(TurnRole::Agent, "911 Emergency. What is your location?");
        transcript.push(TurnRole::Caller, "There's a fire at 12 Oak Street");

        let history = transcript.render_history();
        let lines: Vec<_> = history.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("AGENT ("));
        assert!(lines[0].ends_with("911 Emergency. What is your location?"));
        assert!(lines[1].starts_with("CALLER ("));
        assert!(lines[1].contains("12 Oak Street"));
    }
}
