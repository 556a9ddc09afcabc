//! Shared incident/team registry.
//!
//! One `DispatchStore` instance is threaded by handle (`Arc`) through the
//! call pipeline and the dispatch surface — there is no ambient global.
//! All mutation happens under a single `parking_lot::Mutex`, which is what
//! makes the assignment transaction atomic: both sides of an assignment
//! update under one lock acquisition or not at all.
//!
//! Observers subscribe to a broadcast channel and are notified synchronously
//! after each mutation, one event per change, no batching.

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::dispatch::select_team;
use crate::error::{Result, SentinelError};
use crate::incident::{Incident, IncidentStatus, Team, TeamStatus};
use crate::ipc::events::StoreEvent;

/// Broadcast capacity: enough for a burst of assignments with a slow UI.
const EVENT_CAP: usize = 256;

#[derive(Default)]
struct StoreInner {
    /// Newest first — the ordering contract the dashboard consumes.
    incidents: Vec<Incident>,
    /// Roster order is the dispatch tie-break order.
    teams: Vec<Team>,
}

/// Explicitly owned state container for incidents and responder teams.
pub struct DispatchStore {
    inner: Mutex<StoreInner>,
    events: broadcast::Sender<StoreEvent>,
}

impl DispatchStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAP);
        Self {
            inner: Mutex::new(StoreInner::default()),
            events,
        }
    }

    /// Create a store seeded with a responder roster.
    pub fn with_roster(teams: Vec<Team>) -> Self {
        let store = Self::new();
        store.inner.lock().teams = teams;
        store
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Prepend a new incident (newest-first contract).
    pub fn add_incident(&self, incident: Incident) {
        {
            let mut inner = self.inner.lock();
            inner.incidents.insert(0, incident.clone());
        }
        info!(
            incident = incident.id.as_str(),
            priority = ?incident.priority,
            "incident added"
        );
        let _ = self.events.send(StoreEvent::IncidentAdded { incident });
    }

    /// Snapshot of all incidents, newest first.
    pub fn incidents(&self) -> Vec<Incident> {
        self.inner.lock().incidents.clone()
    }

    /// Snapshot of the roster in tie-break order.
    pub fn teams(&self) -> Vec<Team> {
        self.inner.lock().teams.clone()
    }

    pub fn incident(&self, id: &str) -> Option<Incident> {
        self.inner.lock().incidents.iter().find(|i| i.id == id).cloned()
    }

    /// Match and assign the best available team for `incident_id` in one
    /// transaction. The store is left untouched when no team is eligible.
    ///
    /// # Errors
    /// - `SentinelError::UnknownIncident` if the incident does not exist.
    /// - `SentinelError::AlreadyAssigned` if it is not a new, unassigned
    ///   incident.
    /// - `SentinelError::NoMatch` if no team of any type is available.
    pub fn dispatch(&self, incident_id: &str) -> Result<String> {
        let mut inner = self.inner.lock();

        let incident = inner
            .incidents
            .iter()
            .find(|i| i.id == incident_id)
            .cloned()
            .ok_or_else(|| SentinelError::UnknownIncident(incident_id.into()))?;
        if incident.status != IncidentStatus::New || incident.assigned_team_id.is_some() {
            return Err(SentinelError::AlreadyAssigned(incident_id.into()));
        }

        let team_id = match select_team(&incident, &inner.teams) {
            Some(team) => team.id.clone(),
            None => {
                warn!(incident = incident_id, "dispatch found no available team");
                return Err(SentinelError::NoMatch);
            }
        };

        Self::apply_assignment(&mut inner, incident_id, &team_id)?;
        drop(inner);

        let _ = self.events.send(StoreEvent::TeamAssigned {
            incident_id: incident_id.into(),
            team_id: team_id.clone(),
        });
        Ok(team_id)
    }

    /// Apply an externally decided assignment directly (no re-matching).
    ///
    /// # Errors
    /// `UnknownIncident` / `UnknownTeam` when either side is missing; in
    /// that case nothing is mutated.
    pub fn assign(&self, incident_id: &str, team_id: &str) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            Self::apply_assignment(&mut inner, incident_id, team_id)?;
        }
        let _ = self.events.send(StoreEvent::TeamAssigned {
            incident_id: incident_id.into(),
            team_id: team_id.into(),
        });
        Ok(())
    }

    /// Manual resolution: the incident transitions to resolved and its
    /// assigned team (if any) returns to the available pool.
    pub fn resolve(&self, incident_id: &str) -> Result<()> {
        {
            let mut inner = self.inner.lock();

            let incident = inner
                .incidents
                .iter_mut()
                .find(|i| i.id == incident_id)
                .ok_or_else(|| SentinelError::UnknownIncident(incident_id.into()))?;
            incident.status = IncidentStatus::Resolved;
            let released = incident.assigned_team_id.take();

            if let Some(team_id) = released {
                if let Some(team) = inner.teams.iter_mut().find(|t| t.id == team_id) {
                    team.status = TeamStatus::Available;
                    team.assigned_incident_id = None;
                }
            }
        }
        info!(incident = incident_id, "incident resolved");
        let _ = self.events.send(StoreEvent::IncidentResolved {
            incident_id: incident_id.into(),
        });
        Ok(())
    }

    /// Both sides of the assignment update under the caller's lock, or
    /// neither does. Validation happens before any write: the incident must
    /// be new and unassigned, the team available and unencumbered.
    fn apply_assignment(inner: &mut StoreInner, incident_id: &str, team_id: &str) -> Result<()> {
        let incident_idx = inner
            .incidents
            .iter()
            .position(|i| i.id == incident_id)
            .ok_or_else(|| SentinelError::UnknownIncident(incident_id.into()))?;
        let team_idx = inner
            .teams
            .iter()
            .position(|t| t.id == team_id)
            .ok_or_else(|| SentinelError::UnknownTeam(team_id.into()))?;

        let incident = &inner.incidents[incident_idx];
        if incident.status != IncidentStatus::New || incident.assigned_team_id.is_some() {
            return Err(SentinelError::AlreadyAssigned(incident_id.into()));
        }
        let team = &inner.teams[team_idx];
        if team.status != TeamStatus::Available || team.assigned_incident_id.is_some() {
            return Err(SentinelError::TeamUnavailable(team_id.into()));
        }

        let team = &mut inner.teams[team_idx];
        team.status = TeamStatus::Assigned;
        team.assigned_incident_id = Some(incident_id.into());

        let incident = &mut inner.incidents[incident_idx];
        incident.status = IncidentStatus::Assigned;
        incident.assigned_team_id = Some(team_id.into());

        info!(incident = incident_id, team = team_id, "team assigned");
        Ok(())
    }
}

impl Default for DispatchStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::{
        CallerInfo, IncidentLocation, IncidentType, Priority, RecommendedResponse,
        SentimentAnalysis, TeamType,
    };

    fn test_incident(id: &str, team_types: Vec<TeamType>) -> Incident {
        Incident {
            id: id.into(),
            created_at: 0,
            location: IncidentLocation {
                lat: 40.71,
                lng: -74.0,
                address: "123 Broadway".into(),
                confidence: 0.9,
            },
            priority: Priority::P0,
            incident_type: IncidentType::Medical,
            description: "test".into(),
            estimated_victims: 1,
            keywords: vec![],
            caller_info: CallerInfo::default(),
            sentiment: SentimentAnalysis {
                panic_level: 8,
                urgency_score: 90,
                emotional_state: "panicked".into(),
            },
            status: IncidentStatus::New,
            special_flags: vec![],
            recommended_response: RecommendedResponse {
                team_types,
                quantity: 1,
                equipment: vec![],
            },
            assigned_team_id: None,
            transcript: None,
        }
    }

    fn roster() -> Vec<Team> {
        vec![
            Team::available("MED-01", TeamType::Medical, "Central Station"),
            Team::available("FIRE-01", TeamType::Fire, "Station 4"),
        ]
    }

    /// Invariant: assignedTeamId set iff exactly one team points back, and
    /// that team is not available.
    fn assert_assignment_invariant(store: &DispatchStore) {
        let incidents = store.incidents();
        let teams = store.teams();
        for incident in &incidents {
            let holders: Vec<_> = teams
                .iter()
                .filter(|t| t.assigned_incident_id.as_deref() == Some(incident.id.as_str()))
                .collect();
            match &incident.assigned_team_id {
                Some(team_id) => {
                    assert_eq!(holders.len(), 1, "exactly one team must hold {}", incident.id);
                    assert_eq!(&holders[0].id, team_id);
                    assert_ne!(holders[0].status, TeamStatus::Available);
                }
                None => assert!(holders.is_empty(), "no team may hold {}", incident.id),
            }
        }
    }

    #[test]
    fn incidents_are_newest_first() {
        let store = DispatchStore::new();
        store.add_incident(test_incident("INC-1", vec![]));
        store.add_incident(test_incident("INC-2", vec![]));
        let ids: Vec<_> = store.incidents().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["INC-2", "INC-1"]);
    }

    #[test]
    fn dispatch_assigns_preferred_type_atomically() {
        let store = DispatchStore::with_roster(roster());
        store.add_incident(test_incident("INC-1", vec![TeamType::Medical]));

        let team_id = store.dispatch("INC-1").expect("dispatch");
        assert_eq!(team_id, "MED-01");

        let incident = store.incident("INC-1").unwrap();
        assert_eq!(incident.status, IncidentStatus::Assigned);
        assert_eq!(incident.assigned_team_id.as_deref(), Some("MED-01"));
        assert_assignment_invariant(&store);
    }

    #[test]
    fn no_match_leaves_store_unchanged() {
        let mut teams = roster();
        for t in &mut teams {
            t.status = TeamStatus::OnScene;
        }
        let store = DispatchStore::with_roster(teams);
        store.add_incident(test_incident("INC-1", vec![TeamType::Medical]));

        let before_incidents = store.incidents();
        let before_teams = store.teams();

        let err = store.dispatch("INC-1").unwrap_err();
        assert!(matches!(err, SentinelError::NoMatch));

        assert_eq!(store.incidents(), before_incidents);
        assert_eq!(store.teams(), before_teams);
    }

    #[test]
    fn unknown_team_on_direct_assign_mutates_nothing() {
        let store = DispatchStore::with_roster(roster());
        store.add_incident(test_incident("INC-1", vec![]));

        let err = store.assign("INC-1", "GHOST-99").unwrap_err();
        assert!(matches!(err, SentinelError::UnknownTeam(_)));
        assert_eq!(store.incident("INC-1").unwrap().status, IncidentStatus::New);
        assert_assignment_invariant(&store);
    }

    #[test]
    fn redispatching_an_assigned_incident_is_rejected() {
        let store = DispatchStore::with_roster(vec![
            Team::available("MED-01", TeamType::Medical, "Central"),
            Team::available("MED-02", TeamType::Medical, "North"),
        ]);
        store.add_incident(test_incident("INC-1", vec![TeamType::Medical]));

        assert_eq!(store.dispatch("INC-1").unwrap(), "MED-01");
        let before_teams = store.teams();

        let err = store.dispatch("INC-1").unwrap_err();
        assert!(matches!(err, SentinelError::AlreadyAssigned(_)));

        // MED-01 still the only holder; MED-02 untouched.
        assert_eq!(store.teams(), before_teams);
        assert_eq!(
            store.incident("INC-1").unwrap().assigned_team_id.as_deref(),
            Some("MED-01")
        );
        assert_assignment_invariant(&store);
    }

    #[test]
    fn second_team_cannot_be_assigned_to_one_incident() {
        let store = DispatchStore::with_roster(roster());
        store.add_incident(test_incident("INC-1", vec![TeamType::Medical]));

        store.assign("INC-1", "MED-01").unwrap();
        let err = store.assign("INC-1", "FIRE-01").unwrap_err();
        assert!(matches!(err, SentinelError::AlreadyAssigned(_)));

        let fire = store.teams().into_iter().find(|t| t.id == "FIRE-01").unwrap();
        assert_eq!(fire.status, TeamStatus::Available);
        assert!(fire.assigned_incident_id.is_none());
        assert_assignment_invariant(&store);
    }

    #[test]
    fn busy_team_cannot_take_a_second_incident() {
        let store = DispatchStore::with_roster(roster());
        store.add_incident(test_incident("INC-1", vec![TeamType::Medical]));
        store.add_incident(test_incident("INC-2", vec![TeamType::Medical]));

        store.assign("INC-1", "MED-01").unwrap();
        let err = store.assign("INC-2", "MED-01").unwrap_err();
        assert!(matches!(err, SentinelError::TeamUnavailable(_)));

        // The first assignment is intact, the second incident untouched.
        assert_eq!(
            store.incident("INC-1").unwrap().assigned_team_id.as_deref(),
            Some("MED-01")
        );
        let second = store.incident("INC-2").unwrap();
        assert_eq!(second.status, IncidentStatus::New);
        assert!(second.assigned_team_id.is_none());
        assert_assignment_invariant(&store);
    }

    #[test]
    fn resolved_incident_cannot_be_dispatched_again() {
        let store = DispatchStore::with_roster(roster());
        store.add_incident(test_incident("INC-1", vec![TeamType::Medical]));
        store.dispatch("INC-1").unwrap();
        store.resolve("INC-1").unwrap();

        let err = store.dispatch("INC-1").unwrap_err();
        assert!(matches!(err, SentinelError::AlreadyAssigned(_)));
        assert_assignment_invariant(&store);
    }

    #[test]
    fn resolve_releases_the_assigned_team() {
        let store = DispatchStore::with_roster(roster());
        store.add_incident(test_incident("INC-1", vec![TeamType::Medical]));
        store.dispatch("INC-1").unwrap();

        store.resolve("INC-1").unwrap();

        let incident = store.incident("INC-1").unwrap();
        assert_eq!(incident.status, IncidentStatus::Resolved);
        assert!(incident.assigned_team_id.is_none());
        let med = store.teams().into_iter().find(|t| t.id == "MED-01").unwrap();
        assert_eq!(med.status, TeamStatus::Available);
        assert!(med.assigned_incident_id.is_none());
        assert_assignment_invariant(&store);
    }

    #[test]
    fn observers_are_notified_per_mutation() {
        let store = DispatchStore::with_roster(roster());
        let mut rx = store.subscribe();

        store.add_incident(test_incident("INC-1", vec![TeamType::Medical]));
        store.dispatch("INC-1").unwrap();

        match rx.try_recv().unwrap() {
            StoreEvent::IncidentAdded { incident } => assert_eq!(incident.id, "INC-1"),
            other => panic!("unexpected first event: {other:?}"),
        }
        match rx.try_recv().unwrap() {
            StoreEvent::TeamAssigned {
                incident_id,
                team_id,
            } => {
                assert_eq!(incident_id, "INC-1");
                assert_eq!(team_id, "MED-01");
            }
            other => panic!("unexpected second event: {other:?}"),
        }
    }

    #[test]
    fn matcher_scenario_from_dispatch_policy() {
        // P0 medical incident, medical + fire available → MED-01.
        let store = DispatchStore::with_roster(roster());
        store.add_incident(test_incident("INC-1", vec![TeamType::Medical]));
        assert_eq!(store.dispatch("INC-1").unwrap(), "MED-01");
    }
}
