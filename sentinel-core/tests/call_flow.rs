use std::sync::Arc;

use sentinel_core::audio::codec;
use sentinel_core::audio::playback::{CollectingSink, PlaybackClock, PlaybackScheduler};
use sentinel_core::incident::{IncidentStatus, Priority, TeamStatus, TeamType};
use sentinel_core::services::stub::{KeywordAnalyzer, ScriptedTranscriber, ToneSynthesizer};
use sentinel_core::{
    CallPipeline, DispatchStore, PipelineConfig, SentinelError, StoreEvent, Team, TurnOutcome,
};

struct ZeroClock;

impl PlaybackClock for ZeroClock {
    fn now(&self) -> f64 {
        0.0
    }
}

fn pipeline_for(lines: Vec<&str>, store: Arc<DispatchStore>) -> CallPipeline {
    CallPipeline::new(
        Box::new(ScriptedTranscriber::new(lines)),
        Box::new(KeywordAnalyzer),
        Box::new(ToneSynthesizer::default()),
        PlaybackScheduler::new(Box::new(ZeroClock)),
        Box::new(CollectingSink::default()),
        store,
        PipelineConfig {
            geo_seed: Some(42),
            ..PipelineConfig::default()
        },
    )
}

fn roster() -> Vec<Team> {
    vec![
        Team::available("MED-01", TeamType::Medical, "Central Station"),
        Team::available("FIRE-01", TeamType::Fire, "Station 4"),
        Team::available("POL-01", TeamType::Police, "Precinct 9"),
    ]
}

/// One second of tone, WAV-wrapped like a real recorded clip.
fn clip() -> Vec<u8> {
    let samples: Vec<f32> = (0..16_000).map(|i| (i as f32 * 0.05).sin() * 0.1).collect();
    codec::encode_wav(&samples, 16_000).expect("wav encoding")
}

/// Every incident's assignment pointer must be mirrored by exactly one team,
/// and that team must not still be in the available pool.
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
                assert_eq!(holders.len(), 1, "exactly one holder for {}", incident.id);
                assert_eq!(&holders[0].id, team_id);
                assert_ne!(holders[0].status, TeamStatus::Available);
            }
            None => assert!(holders.is_empty(), "stray holder for {}", incident.id),
        }
    }
}

fn run_call(pipeline: &mut CallPipeline) -> String {
    pipeline.start_call();
    pipeline.begin_recording();
    let outcome = pipeline.finish_recording(&clip(), "audio/wav");
    pipeline.end_call();
    match outcome {
        TurnOutcome::Logged(id) => id,
        other => panic!("expected a logged incident, got {other:?}"),
    }
}

#[test]
fn intake_triage_dispatch_resolve_end_to_end() {
    let store = Arc::new(DispatchStore::with_roster(roster()));

    let mut pipeline = pipeline_for(
        vec![
            "My father collapsed and he's not breathing",
            "Thick smoke is pouring out of the kitchen",
        ],
        Arc::clone(&store),
    );

    let medical_id = run_call(&mut pipeline);
    let fire_id = run_call(&mut pipeline);

    // Newest first: the fire call sits on top of the board.
    let ids: Vec<_> = store.incidents().into_iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![fire_id.clone(), medical_id.clone()]);

    let medical = store.incident(&medical_id).expect("medical incident");
    assert_eq!(medical.priority, Priority::P0);

    assert_eq!(store.dispatch(&medical_id).expect("dispatch medical"), "MED-01");
    assert_eq!(store.dispatch(&fire_id).expect("dispatch fire"), "FIRE-01");
    assert_assignment_invariant(&store);

    store.resolve(&medical_id).expect("resolve");
    let resolved = store.incident(&medical_id).expect("resolved incident");
    assert_eq!(resolved.status, IncidentStatus::Resolved);
    let med = store
        .teams()
        .into_iter()
        .find(|t| t.id == "MED-01")
        .expect("MED-01 in roster");
    assert_eq!(med.status, TeamStatus::Available);
    assert_assignment_invariant(&store);
}

#[test]
fn exhausted_roster_reports_no_match_and_leaves_the_board_intact() {
    let store = Arc::new(DispatchStore::with_roster(vec![Team::available(
        "MED-01",
        TeamType::Medical,
        "Central Station",
    )]));

    let mut pipeline = pipeline_for(
        vec![
            "He's having chest pains and can't breathe",
            "Another caller, someone collapsed at the mall",
        ],
        Arc::clone(&store),
    );

    let first = run_call(&mut pipeline);
    let second = run_call(&mut pipeline);

    assert_eq!(store.dispatch(&first).expect("first dispatch"), "MED-01");

    let before_incidents = store.incidents();
    let before_teams = store.teams();
    let err = store.dispatch(&second).expect_err("roster exhausted");
    assert!(matches!(err, SentinelError::NoMatch));
    assert_eq!(store.incidents(), before_incidents);
    assert_eq!(store.teams(), before_teams);
    assert_assignment_invariant(&store);
}

#[test]
fn store_events_fire_in_mutation_order_across_the_flow() {
    let store = Arc::new(DispatchStore::with_roster(roster()));
    let mut rx = store.subscribe();

    let mut pipeline = pipeline_for(
        vec!["There's a fire spreading on the second floor"],
        Arc::clone(&store),
    );
    let id = run_call(&mut pipeline);
    store.dispatch(&id).expect("dispatch");
    store.resolve(&id).expect("resolve");

    match rx.try_recv().expect("added event") {
        StoreEvent::IncidentAdded { incident } => {
            assert_eq!(incident.id, id);
            assert!(incident.transcript.is_some());
        }
        other => panic!("unexpected first event: {other:?}"),
    }
    match rx.try_recv().expect("assigned event") {
        StoreEvent::TeamAssigned {
            incident_id,
            team_id,
        } => {
            assert_eq!(incident_id, id);
            assert_eq!(team_id, "FIRE-01");
        }
        other => panic!("unexpected second event: {other:?}"),
    }
    match rx.try_recv().expect("resolved event") {
        StoreEvent::IncidentResolved { incident_id } => assert_eq!(incident_id, id),
        other => panic!("unexpected third event: {other:?}"),
    }
}
