//! Analyzer SLA timeouts: counted, logged, recoverable under a threshold,
//! and never a deadlock.

use chrono::Utc;
use ractor::{call, Actor, ActorRef};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crowsnest::actors::{PlannerActor, PlannerArguments, PlannerMsg};
use crowsnest::config::PlannerConfig;
use crowsnest::modality::{ModalityAdapter, SimStep, SimVisionAdapter};
use crowsnest::pattern::PatternRegistry;
use shared_types::{Cue, FailureReason, ModalityKind, SearchResult, SearchState};

fn test_cue() -> Cue {
    Cue {
        object_id: "contact-timeout".to_string(),
        bearing_deg: 0.0,
        bearing_error_deg: 5.0,
        modality: ModalityKind::Vision,
        confidence: 80,
        priority: 0,
        received_at: Utc::now(),
        context: serde_json::Value::Null,
    }
}

async fn spawn_planner(
    config: PlannerConfig,
    vision: Arc<SimVisionAdapter>,
) -> (ActorRef<PlannerMsg>, tokio::task::JoinHandle<()>) {
    let adapters: HashMap<ModalityKind, Arc<dyn ModalityAdapter>> =
        HashMap::from([(ModalityKind::Vision, vision as Arc<dyn ModalityAdapter>)]);
    Actor::spawn(
        None,
        PlannerActor,
        PlannerArguments {
            config,
            registry: Arc::new(PatternRegistry::with_builtins()),
            adapters,
            event_bus: None,
        },
    )
    .await
    .expect("spawn planner")
}

async fn wait_for_result(planner: &ActorRef<PlannerMsg>, limit: Duration) -> SearchResult {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if let Some(result) =
            call!(planner, |reply| PlannerMsg::GetLastResult { reply }).expect("planner rpc")
        {
            return result;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "no search result before deadline"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn hanging_analyzer_times_out_and_fails_fast() {
    let artifacts = tempfile::tempdir().unwrap();
    let mut config = PlannerConfig::default();
    config.timing.settle_ms = 5;
    config.timing.dwell_ms = 150;
    config.timing.analyzer_sla_ms = 650; // per-tile wait ~800ms
    config.budgets.max_consecutive_timeouts = 1;

    let vision = Arc::new(
        SimVisionAdapter::new(
            config.capability_profile(ModalityKind::Vision),
            artifacts.path().to_path_buf(),
        )
        .with_script(vec![SimStep::Hang]),
    );
    let (planner, _handle) = spawn_planner(config, vision).await;

    let started = tokio::time::Instant::now();
    planner.send_message(PlannerMsg::Cue(test_cue())).unwrap();

    // the planner stays responsive while the dispatch hangs
    tokio::time::sleep(Duration::from_millis(100)).await;
    let status = call!(planner, |reply| PlannerMsg::GetStatus { reply }).unwrap();
    assert_ne!(status.state, SearchState::Idle.to_string());

    let result = wait_for_result(&planner, Duration::from_secs(5)).await;
    let elapsed = started.elapsed();

    assert!(!result.found);
    assert_eq!(result.failure, Some(FailureReason::AnalyzerTimeout));
    assert_eq!(result.timeouts, 1);
    // the timeout fired around the per-tile SLA, not at the task budget
    assert!(elapsed >= Duration::from_millis(700), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(2500), "elapsed {elapsed:?}");

    planner.stop(None);
}

#[tokio::test]
async fn timeout_under_threshold_replans_and_recovers() {
    let artifacts = tempfile::tempdir().unwrap();
    let mut config = PlannerConfig::default();
    config.timing.settle_ms = 5;
    config.timing.dwell_ms = 10;
    config.timing.analyzer_sla_ms = 90;
    config.budgets.max_consecutive_timeouts = 2;
    config.budgets.time_budget_ms = 10_000;

    // first dwell hangs; after that the default rule confirms on the
    // second counted dwell
    let vision = Arc::new(
        SimVisionAdapter::new(
            config.capability_profile(ModalityKind::Vision),
            artifacts.path().to_path_buf(),
        )
        .with_script(vec![SimStep::Hang]),
    );
    let (planner, _handle) = spawn_planner(config, vision).await;

    planner.send_message(PlannerMsg::Cue(test_cue())).unwrap();

    let result = wait_for_result(&planner, Duration::from_secs(5)).await;
    assert!(result.found, "search recovers past a single timeout");
    assert_eq!(result.timeouts, 1);
    // log keeps both the timed-out tile and the confirming one
    assert_eq!(result.executed.len(), 2);
    assert!(result.executed[0].decision.is_none());
    assert!(result.executed[1]
        .decision
        .as_ref()
        .is_some_and(|d| d.confirmed));

    planner.stop(None);
}

#[tokio::test]
async fn consecutive_timeouts_escalate_at_the_threshold() {
    let artifacts = tempfile::tempdir().unwrap();
    let mut config = PlannerConfig::default();
    config.timing.settle_ms = 5;
    config.timing.dwell_ms = 10;
    config.timing.analyzer_sla_ms = 90;
    config.budgets.max_consecutive_timeouts = 2;
    config.budgets.time_budget_ms = 10_000;

    let vision = Arc::new(
        SimVisionAdapter::new(
            config.capability_profile(ModalityKind::Vision),
            artifacts.path().to_path_buf(),
        )
        .with_script(vec![SimStep::Hang, SimStep::Hang]),
    );
    let (planner, _handle) = spawn_planner(config, vision).await;

    planner.send_message(PlannerMsg::Cue(test_cue())).unwrap();

    let result = wait_for_result(&planner, Duration::from_secs(5)).await;
    assert!(!result.found);
    assert_eq!(result.failure, Some(FailureReason::AnalyzerTimeout));
    assert_eq!(result.timeouts, 2);

    planner.stop(None);
}

#[tokio::test]
async fn adapter_fault_fails_the_task_immediately() {
    let artifacts = tempfile::tempdir().unwrap();
    let mut config = PlannerConfig::default();
    config.timing.settle_ms = 5;
    config.timing.dwell_ms = 10;
    config.timing.analyzer_sla_ms = 200;

    let vision = Arc::new(
        SimVisionAdapter::new(
            config.capability_profile(ModalityKind::Vision),
            artifacts.path().to_path_buf(),
        )
        .with_script(vec![SimStep::Fatal("gimbal fault".to_string())]),
    );
    let (planner, _handle) = spawn_planner(config, vision).await;

    planner.send_message(PlannerMsg::Cue(test_cue())).unwrap();

    let result = wait_for_result(&planner, Duration::from_secs(5)).await;
    assert!(!result.found);
    assert!(matches!(
        result.failure,
        Some(FailureReason::AdapterFatal(ref msg)) if msg.contains("gimbal")
    ));
    // no retry after a fatal fault
    assert_eq!(result.executed.len(), 1);

    planner.stop(None);
}
