//! sentinel-console — scripted end-to-end demo.
//!
//! Drives the full intake → triage → dispatch path with the deterministic
//! stub backends, so the whole flow runs without a microphone, an API key,
//! or network access. Store events are printed as they fire; the final
//! dispatch board is dumped at the end.
//!
//! ```text
//! RUST_LOG=sentinel_core=debug cargo run --bin sentinel-console
//! ```

use std::sync::Arc;

use sentinel_core::audio::playback::{CollectingSink, PlaybackScheduler, WallClock};
use sentinel_core::incident::TeamType;
use sentinel_core::services::stub::{KeywordAnalyzer, ScriptedTranscriber, ToneSynthesizer};
use sentinel_core::{
    CallPipeline, DispatchStore, PipelineConfig, SentinelError, StoreEvent, Team, TurnOutcome,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentinel_core=info,sentinel_console=info".parse().expect("static filter")),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("console demo failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let store = Arc::new(DispatchStore::with_roster(vec![
        Team::available("MED-01", TeamType::Medical, "Central Station"),
        Team::available("FIRE-01", TeamType::Fire, "Station 4"),
        Team::available("POL-01", TeamType::Police, "Precinct 9"),
        Team::available("RES-01", TeamType::Rescue, "East Side Depot"),
    ]));

    // Print store notifications as the calls land.
    let mut events = store.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => println!("event: {json}"),
                Err(e) => eprintln!("event serialization failed: {e}"),
            }
            if matches!(event, StoreEvent::IncidentResolved { .. }) {
                break;
            }
        }
    });

    let calls = [
        "My father collapsed and he's not breathing, 12 Oak Street",
        "There's smoke coming from the apartment below mine",
        "Someone just crashed into the bus stop on 5th",
    ];

    // 2 s of quiet tone, wrapped the way a real recorded clip would be.
    let samples: Vec<f32> = (0..2 * sentinel_core::audio::CAPTURE_RATE)
        .map(|i| (i as f32 * 0.05).sin() * 0.1)
        .collect();
    let clip = sentinel_core::audio::codec::encode_wav(&samples, sentinel_core::audio::CAPTURE_RATE)?;

    let worker_store = Arc::clone(&store);
    let logged: Vec<String> = tokio::task::spawn_blocking(move || {
        let mut pipeline = CallPipeline::new(
            Box::new(ScriptedTranscriber::new(calls.to_vec())),
            Box::new(KeywordAnalyzer),
            Box::new(ToneSynthesizer::default()),
            PlaybackScheduler::new(Box::new(WallClock::new())),
            Box::new(CollectingSink::default()),
            Arc::clone(&worker_store),
            PipelineConfig::default(),
        );

        let mut logged = Vec::new();
        for _ in &calls {
            pipeline.start_call();
            pipeline.begin_recording();
            match pipeline.finish_recording(&clip, "audio/wav") {
                TurnOutcome::Logged(id) => logged.push(id),
                other => println!("turn produced no incident: {other:?}"),
            }
            pipeline.end_call();
        }
        logged
    })
    .await?;

    for id in &logged {
        match store.dispatch(id) {
            Ok(team_id) => println!("dispatched {team_id} to {id}"),
            Err(SentinelError::NoMatch) => println!("no team available for {id}"),
            Err(e) => return Err(e.into()),
        }
    }

    // Resolve the first incident to show the team returning to the pool.
    if let Some(id) = logged.first() {
        store.resolve(id)?;
    }
    let _ = printer.await;

    println!("\n── dispatch board ──");
    for incident in store.incidents() {
        println!(
            "{}  {:?}  {:?}  {}  → {}",
            incident.id,
            incident.priority,
            incident.incident_type,
            incident.location.address,
            incident.assigned_team_id.as_deref().unwrap_or("-"),
        );
    }
    for team in store.teams() {
        println!(
            "{}  {:?}  {:?}  → {}",
            team.id,
            team.team_type,
            team.status,
            team.assigned_incident_id.as_deref().unwrap_or("-"),
        );
    }

    Ok(())
}
