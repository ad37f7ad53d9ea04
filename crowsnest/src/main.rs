use ractor::Actor;
use std::collections::HashMap;
use std::sync::Arc;

use crowsnest::actors::event_bus::{publish_event, BusEvent, EventBusActor, TOPIC_CUE_DIRECTIONAL};
use crowsnest::actors::{CueRelayActor, CueRelayArguments, PlannerActor, PlannerArguments};
use crowsnest::config::PlannerConfig;
use crowsnest::modality::{ModalityAdapter, SimRadarAdapter, SimVisionAdapter};
use crowsnest::pattern::PatternRegistry;
use shared_types::ModalityKind;

fn load_env_file() {
    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!(error = %e, "Could not determine current directory for .env lookup");
            return;
        }
    };

    let mut current = cwd.clone();
    loop {
        let candidate = current.join(".env");
        if candidate.exists() {
            match dotenvy::from_path(&candidate) {
                Ok(_) => {
                    tracing::info!(path = %candidate.display(), "Loaded environment from .env");
                }
                Err(e) => {
                    tracing::warn!(
                        path = %candidate.display(),
                        error = %e,
                        "Failed to load .env file"
                    );
                }
            }
            return;
        }

        if !current.pop() {
            break;
        }
    }

    tracing::info!(
        cwd = %cwd.display(),
        "No .env file found in current directory or ancestors; using process environment only"
    );
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    // Load .env values early so config overrides are visible everywhere.
    load_env_file();

    tracing::info!("Starting crowsnest search planner");

    let config = PlannerConfig::load().expect("Failed to load planner config");
    tracing::info!(
        time_budget_ms = config.budgets.time_budget_ms,
        max_tiles = config.budgets.max_tiles,
        pattern = %config.pattern.default_pattern,
        "Planner config loaded"
    );

    let (event_bus, _bus_handle) = Actor::spawn(None, EventBusActor, ())
        .await
        .expect("Failed to spawn EventBusActor");

    // Sim adapters stand in until real sensor drivers register themselves.
    let artifact_dir = config.artifacts.artifact_dir.clone();
    let mut adapters: HashMap<ModalityKind, Arc<dyn ModalityAdapter>> = HashMap::new();
    adapters.insert(
        ModalityKind::Vision,
        Arc::new(SimVisionAdapter::new(
            config.capability_profile(ModalityKind::Vision),
            artifact_dir.clone(),
        )),
    );
    adapters.insert(
        ModalityKind::Radar,
        Arc::new(SimRadarAdapter::new(
            config.capability_profile(ModalityKind::Radar),
            artifact_dir,
        )),
    );

    let (planner, _planner_handle) = Actor::spawn(
        None,
        PlannerActor,
        PlannerArguments {
            config,
            registry: Arc::new(PatternRegistry::with_builtins()),
            adapters,
            event_bus: Some(event_bus.clone()),
        },
    )
    .await
    .expect("Failed to spawn PlannerActor");

    let (_relay, _relay_handle) = Actor::spawn(
        None,
        CueRelayActor,
        CueRelayArguments {
            event_bus: event_bus.clone(),
            planner: planner.clone(),
        },
    )
    .await
    .expect("Failed to spawn CueRelayActor");

    tracing::info!("Planner online; awaiting directional cues");

    // Bench runs can seed a cue from the environment instead of a detector.
    if let Some(bearing) = std::env::var("CROWSNEST_DEMO_BEARING")
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
    {
        let source_type = std::env::var("CROWSNEST_DEMO_SOURCE")
            .unwrap_or_else(|_| "vision".to_string());
        let payload = serde_json::json!({
            "payload": {
                "object_id": "demo",
                "bearing_deg_true": bearing,
                "bearing_error_deg": 5.0,
                "confidence": 80,
                "source_type": source_type,
            }
        });
        let event = BusEvent::new(TOPIC_CUE_DIRECTIONAL, payload, "demo")
            .expect("Failed to build demo cue");
        publish_event(&event_bus, event).expect("Failed to publish demo cue");
        tracing::info!(bearing_deg = bearing, "Demo cue published");
    }

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");
    tracing::info!("Shutdown signal received; stopping actors");
    planner.stop(None);
    event_bus.stop(None);
}
