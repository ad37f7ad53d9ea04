//! Preemption: a fresh cue cancels the in-flight task, publishes nothing
//! for it, and plans the new cue immediately.

use async_trait::async_trait;
use chrono::Utc;
use ractor::{call, Actor, ActorProcessingErr, ActorRef};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crowsnest::actors::event_bus::{subscribe, BusEvent, EventBusActor, TOPIC_SIGHTING_RELATIVE};
use crowsnest::actors::{PlannerActor, PlannerArguments, PlannerMsg};
use crowsnest::config::{PlannerConfig, PreemptionPolicy};
use crowsnest::modality::{ModalityAdapter, SimRadarAdapter, SimVisionAdapter};
use crowsnest::pattern::PatternRegistry;
use shared_types::{Cue, ModalityKind, SearchResult};

#[derive(Debug, Default)]
struct CollectorActor;

#[async_trait]
impl Actor for CollectorActor {
    type Msg = BusEvent;
    type State = mpsc::UnboundedSender<BusEvent>;
    type Arguments = mpsc::UnboundedSender<BusEvent>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        Ok(args)
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let _ = state.send(message);
        Ok(())
    }
}

fn cue(object_id: &str, modality: ModalityKind, priority: u8) -> Cue {
    Cue {
        object_id: object_id.to_string(),
        bearing_deg: 30.0,
        bearing_error_deg: 5.0,
        modality,
        confidence: 80,
        priority,
        received_at: Utc::now(),
        context: serde_json::Value::Null,
    }
}

fn slow_config() -> PlannerConfig {
    let mut config = PlannerConfig::default();
    config.timing.settle_ms = 20;
    config.timing.dwell_ms = 50;
    config.timing.analyzer_sla_ms = 300;
    config.budgets.time_budget_ms = 10_000;
    config
}

async fn wait_for_result(planner: &ActorRef<PlannerMsg>) -> SearchResult {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
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
async fn fresh_cue_preempts_in_flight_task_with_no_publish_for_it() {
    let artifacts = tempfile::tempdir().unwrap();
    let config = slow_config();

    let (bus, _bus_handle) = Actor::spawn(None, EventBusActor, ()).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (collector, _collector_handle) = Actor::spawn(None, CollectorActor, tx).await.unwrap();
    subscribe(&bus, TOPIC_SIGHTING_RELATIVE, collector.clone()).unwrap();
    subscribe(&bus, "planner.task.cancelled", collector.clone()).unwrap();

    let radar: Arc<dyn ModalityAdapter> = Arc::new(
        SimRadarAdapter::new(
            config.capability_profile(ModalityKind::Radar),
            artifacts.path().to_path_buf(),
        )
        .never_confirms(),
    );
    let vision: Arc<dyn ModalityAdapter> = Arc::new(
        SimVisionAdapter::new(
            config.capability_profile(ModalityKind::Vision),
            artifacts.path().to_path_buf(),
        )
        .confirm_on(1),
    );

    let (planner, _planner_handle) = Actor::spawn(
        None,
        PlannerActor,
        PlannerArguments {
            config,
            registry: Arc::new(PatternRegistry::with_builtins()),
            adapters: HashMap::from([
                (ModalityKind::Radar, radar),
                (ModalityKind::Vision, vision),
            ]),
            event_bus: Some(bus.clone()),
        },
    )
    .await
    .unwrap();

    // task A: radar search that would grind through the whole ladder
    planner
        .send_message(PlannerMsg::Cue(cue("contact-a", ModalityKind::Radar, 0)))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    let status = call!(planner, |reply| PlannerMsg::GetStatus { reply }).unwrap();
    let task_a = status.task_id.expect("task A active");

    // task B preempts mid-dwell
    planner
        .send_message(PlannerMsg::Cue(cue("contact-b", ModalityKind::Vision, 1)))
        .unwrap();

    let result = wait_for_result(&planner).await;
    assert!(result.found, "task B runs to confirmation");
    assert_ne!(result.task_id, task_a);

    // drain bus traffic: exactly one sighting (task B), one cancellation (task A)
    tokio::time::sleep(Duration::from_millis(200)).await;
    let mut sightings = Vec::new();
    let mut cancellations = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event.topic.as_str() {
            TOPIC_SIGHTING_RELATIVE => sightings.push(event),
            "planner.task.cancelled" => cancellations.push(event),
            _ => {}
        }
    }
    assert_eq!(sightings.len(), 1, "preempted task must not publish");
    assert_eq!(
        sightings[0].payload["payload"]["object_id"],
        serde_json::json!("contact-b")
    );
    assert_eq!(cancellations.len(), 1);
    assert_eq!(
        cancellations[0].payload["task_id"],
        serde_json::json!(task_a)
    );

    planner.stop(None);
    collector.stop(None);
    bus.stop(None);
}

#[tokio::test]
async fn priority_policy_drops_lower_ranked_cue() {
    let artifacts = tempfile::tempdir().unwrap();
    let mut config = slow_config();
    config.preemption.policy = PreemptionPolicy::Priority;

    let radar: Arc<dyn ModalityAdapter> = Arc::new(
        SimRadarAdapter::new(
            config.capability_profile(ModalityKind::Radar),
            artifacts.path().to_path_buf(),
        )
        .never_confirms(),
    );
    let vision: Arc<dyn ModalityAdapter> = Arc::new(SimVisionAdapter::new(
        config.capability_profile(ModalityKind::Vision),
        artifacts.path().to_path_buf(),
    ));

    let (planner, _planner_handle) = Actor::spawn(
        None,
        PlannerActor,
        PlannerArguments {
            config,
            registry: Arc::new(PatternRegistry::with_builtins()),
            adapters: HashMap::from([
                (ModalityKind::Radar, radar),
                (ModalityKind::Vision, vision),
            ]),
            event_bus: None,
        },
    )
    .await
    .unwrap();

    planner
        .send_message(PlannerMsg::Cue(cue("contact-high", ModalityKind::Radar, 5)))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let status = call!(planner, |reply| PlannerMsg::GetStatus { reply }).unwrap();
    let incumbent = status.task_id.expect("incumbent task active");

    // equal rank does not preempt either; the incumbent keeps the sensor
    for priority in [3, 5] {
        planner
            .send_message(PlannerMsg::Cue(cue("contact-low", ModalityKind::Vision, priority)))
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = call!(planner, |reply| PlannerMsg::GetStatus { reply }).unwrap();
    assert_eq!(status.task_id, Some(incumbent));

    planner.stop(None);
}
