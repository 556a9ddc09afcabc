//! Deterministic team matching.
//!
//! ## Ranking policy
//!
//! 1. Preferred type = first entry of the incident's recommended team types
//!    (an empty recommendation means no type filter).
//! 2. Candidates: available teams of the preferred type.
//! 3. Fallback: any available team, regardless of type.
//! 4. Ties break by roster order — stable and repeatable. No distance or
//!    capacity weighting is applied at this layer.
//!
//! The matcher is pure: it reads the roster and picks, it never mutates.
//! The store's assignment transaction applies the result atomically.

use tracing::debug;

use crate::incident::{Incident, Team, TeamStatus};

/// Pick the best team for `incident` from `roster`, or `None` when no team
/// of any type is available.
pub fn select_team<'a>(incident: &Incident, roster: &'a [Team]) -> Option<&'a Team> {
    let preferred = incident.recommended_response.team_types.first().copied();

    let typed_match = preferred.and_then(|wanted| {
        roster
            .iter()
            .find(|t| t.status == TeamStatus::Available && t.team_type == wanted)
    });

    let selected = typed_match.or_else(|| {
        roster
            .iter()
            .find(|t| t.status == TeamStatus::Available)
    });

    match selected {
        Some(team) => {
            debug!(
                incident = incident.id.as_str(),
                team = team.id.as_str(),
                type_matched = typed_match.is_some(),
                "matched team"
            );
            Some(team)
        }
        None => {
            debug!(incident = incident.id.as_str(), "no available team");
            None
        }
    }
}
