//! Planner event emission
//!
//! Typed emit functions for task lifecycle telemetry plus the sighting
//! publisher. All payloads go to the event bus as JSON; emission failures
//! are logged and never fail the task.

use chrono::{SecondsFormat, Utc};
use ractor::ActorRef;

use shared_types::{Cue, Decision, SearchResult, SightingReport, Tile};

use crate::actors::event_bus::{BusEvent, EventBusMsg, TOPIC_SIGHTING_RELATIVE};

pub const TOPIC_TASK_STARTED: &str = "planner.task.started";
pub const TOPIC_TASK_TILE_DISPATCHED: &str = "planner.task.tile_dispatched";
pub const TOPIC_TASK_TILE_DECISION: &str = "planner.task.tile_decision";
pub const TOPIC_TASK_TILE_TIMEOUT: &str = "planner.task.tile_timeout";
pub const TOPIC_TASK_SHADOW_ADVICE: &str = "planner.task.shadow_advice";
pub const TOPIC_TASK_CANCELLED: &str = "planner.task.cancelled";
pub const TOPIC_TASK_COMPLETED: &str = "planner.task.completed";
pub const TOPIC_TASK_FAILED: &str = "planner.task.failed";

fn emit(
    event_bus: &Option<ActorRef<EventBusMsg>>,
    topic: &str,
    task_id: &str,
    payload: serde_json::Value,
) {
    let Some(bus) = event_bus else {
        return;
    };
    match BusEvent::new(topic, payload, format!("planner:{task_id}")) {
        Ok(event) => {
            if let Err(e) = bus.send_message(EventBusMsg::Publish { event }) {
                tracing::warn!(topic = %topic, error = %e, "Telemetry publish failed");
            }
        }
        Err(e) => tracing::warn!(topic = %topic, error = %e, "Telemetry payload build failed"),
    }
}

pub fn emit_task_started(event_bus: &Option<ActorRef<EventBusMsg>>, task_id: &str, cue: &Cue) {
    emit(
        event_bus,
        TOPIC_TASK_STARTED,
        task_id,
        serde_json::json!({
            "task_id": task_id,
            "object_id": cue.object_id,
            "bearing_deg": cue.bearing_deg,
            "modality": cue.modality.to_string(),
            "priority": cue.priority,
        }),
    );
}

pub fn emit_tile_dispatched(
    event_bus: &Option<ActorRef<EventBusMsg>>,
    task_id: &str,
    tile_seq: u64,
    tile: &Tile,
) {
    emit(
        event_bus,
        TOPIC_TASK_TILE_DISPATCHED,
        task_id,
        serde_json::json!({
            "task_id": task_id,
            "tile_seq": tile_seq,
            "tile": tile,
        }),
    );
}

pub fn emit_tile_decision(
    event_bus: &Option<ActorRef<EventBusMsg>>,
    task_id: &str,
    tile: &Tile,
    decision: &Decision,
    belief: serde_json::Value,
) {
    emit(
        event_bus,
        TOPIC_TASK_TILE_DECISION,
        task_id,
        serde_json::json!({
            "task_id": task_id,
            "tile_id": tile.tile_id,
            "az_deg": tile.az_deg,
            "el_deg": tile.el_deg,
            "confirmed": decision.confirmed,
            "score": decision.score,
            "belief": belief,
        }),
    );
}

pub fn emit_tile_timeout(
    event_bus: &Option<ActorRef<EventBusMsg>>,
    task_id: &str,
    tile: &Tile,
    elapsed_ms: u64,
) {
    emit(
        event_bus,
        TOPIC_TASK_TILE_TIMEOUT,
        task_id,
        serde_json::json!({
            "task_id": task_id,
            "tile_id": tile.tile_id,
            "elapsed_ms": elapsed_ms,
        }),
    );
}

pub fn emit_shadow_advice(
    event_bus: &Option<ActorRef<EventBusMsg>>,
    task_id: &str,
    advice: serde_json::Value,
) {
    emit(
        event_bus,
        TOPIC_TASK_SHADOW_ADVICE,
        task_id,
        serde_json::json!({
            "task_id": task_id,
            "advice": advice,
        }),
    );
}

pub fn emit_task_cancelled(
    event_bus: &Option<ActorRef<EventBusMsg>>,
    task_id: &str,
    preempted_by: &str,
) {
    emit(
        event_bus,
        TOPIC_TASK_CANCELLED,
        task_id,
        serde_json::json!({
            "task_id": task_id,
            "reason": "preempted",
            "preempted_by": preempted_by,
        }),
    );
}

pub fn emit_task_completed(event_bus: &Option<ActorRef<EventBusMsg>>, result: &SearchResult) {
    emit(
        event_bus,
        TOPIC_TASK_COMPLETED,
        &result.task_id,
        serde_json::json!({
            "task_id": result.task_id,
            "executed_tiles": result.executed.len(),
            "time_to_first_true_ms": result.time_to_first_true_ms,
            "timeouts": result.timeouts,
        }),
    );
}

pub fn emit_task_failed(event_bus: &Option<ActorRef<EventBusMsg>>, result: &SearchResult) {
    let reason = result
        .failure
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    emit(
        event_bus,
        TOPIC_TASK_FAILED,
        &result.task_id,
        serde_json::json!({
            "task_id": result.task_id,
            "reason": reason,
            "executed_tiles": result.executed.len(),
            "timeouts": result.timeouts,
        }),
    );
}

/// Build the normalized sighting payload for a confirmed search. Range is
/// synthetic until a ranging modality feeds the planner, and is marked as
/// such for downstream consumers.
pub fn build_sighting_report(
    cue: &Cue,
    winning_tile: &Tile,
    artifact_path: Option<String>,
) -> SightingReport {
    SightingReport {
        object_id: cue.object_id.clone(),
        time_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        distance_m: 600.0,
        distance_error_m: 200.0,
        bearing_deg_true: winning_tile.az_deg,
        bearing_error_deg: cue.bearing_error_deg.max(5.0),
        altitude_m: 0.0,
        altitude_error_m: 20.0,
        confidence: cue.confidence,
        range_is_synthetic: true,
        range_method: "rf_strength_v1".to_string(),
        artifact_path,
    }
}

/// Publish the sighting for a confirmed search. The caller holds the
/// once-per-task guard; this function just ships the payload.
pub fn publish_sighting(
    event_bus: &Option<ActorRef<EventBusMsg>>,
    task_id: &str,
    report: &SightingReport,
) {
    emit(
        event_bus,
        TOPIC_SIGHTING_RELATIVE,
        task_id,
        serde_json::json!({ "payload": report }),
    );
    tracing::info!(
        task_id = %task_id,
        object_id = %report.object_id,
        bearing_deg_true = report.bearing_deg_true,
        "Sighting published"
    );
}
