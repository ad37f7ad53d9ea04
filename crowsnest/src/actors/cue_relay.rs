//! CueRelayActor - bridges directional cues from the bus to the planner.
//!
//! Detector plugins publish loosely shaped payloads on
//! `object.sighting.directional`; this actor normalizes them into typed
//! cues and forwards them. Malformed payloads are logged and dropped, so a
//! misbehaving detector can never crash the planner.

use async_trait::async_trait;
use chrono::Utc;
use ractor::{cast, Actor, ActorProcessingErr, ActorRef};

use shared_types::{Cue, ModalityKind};

use crate::actors::event_bus::{BusEvent, EventBusMsg, TOPIC_CUE_DIRECTIONAL};
use crate::actors::planner::PlannerMsg;

#[derive(Debug, Clone)]
pub struct CueRelayArguments {
    pub event_bus: ActorRef<EventBusMsg>,
    pub planner: ActorRef<PlannerMsg>,
}

pub struct CueRelayState {
    planner: ActorRef<PlannerMsg>,
}

#[derive(Debug, Default)]
pub struct CueRelayActor;

/// Normalize a detector payload into a cue.
///
/// Detectors disagree on field names; accept the known aliases
/// (`bearing_deg_true` before `bearing_deg`, `bearing_error_deg` before
/// `sigma_deg`) and fall back to deployment defaults for the rest.
pub fn parse_cue(payload: &serde_json::Value) -> Result<Cue, String> {
    let bearing_deg = payload
        .get("bearing_deg_true")
        .or_else(|| payload.get("bearing_deg"))
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| "cue payload missing bearing".to_string())?;

    let bearing_error_deg = payload
        .get("bearing_error_deg")
        .or_else(|| payload.get("sigma_deg"))
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(5.0);

    let modality = payload
        .get("source_type")
        .and_then(serde_json::Value::as_str)
        .map(ModalityKind::from_source_tag)
        .unwrap_or(ModalityKind::Vision);

    let confidence = payload
        .get("confidence")
        .and_then(serde_json::Value::as_u64)
        .map(|v| v.min(100) as u8)
        .unwrap_or(80);

    let priority = payload
        .get("priority")
        .and_then(serde_json::Value::as_u64)
        .map(|v| v.min(u8::MAX as u64) as u8)
        .unwrap_or(0);

    let object_id = payload
        .get("object_id")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    let context = payload
        .get("context")
        .cloned()
        .unwrap_or(serde_json::Value::Null);

    Ok(Cue {
        object_id,
        bearing_deg,
        bearing_error_deg,
        modality,
        confidence,
        priority,
        received_at: Utc::now(),
        context,
    })
}

#[async_trait]
impl Actor for CueRelayActor {
    type Msg = BusEvent;
    type State = CueRelayState;
    type Arguments = CueRelayArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        cast!(
            args.event_bus,
            EventBusMsg::Subscribe {
                topic: TOPIC_CUE_DIRECTIONAL.to_string(),
                subscriber: myself.clone(),
            }
        )
        .map_err(|e| ActorProcessingErr::from(format!("cue subscription failed: {e}")))?;

        tracing::info!(
            actor_id = %myself.get_id(),
            topic = TOPIC_CUE_DIRECTIONAL,
            "CueRelayActor subscribed"
        );
        Ok(CueRelayState {
            planner: args.planner,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        event: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        // Detectors wrap the cue under "payload"; tolerate bare payloads too.
        let payload = event.payload.get("payload").unwrap_or(&event.payload);
        match parse_cue(payload) {
            Ok(cue) => {
                tracing::debug!(
                    object_id = %cue.object_id,
                    bearing_deg = cue.bearing_deg,
                    modality = %cue.modality,
                    "Cue relayed to planner"
                );
                if let Err(e) = state.planner.send_message(PlannerMsg::Cue(cue)) {
                    tracing::warn!(error = %e, "Planner unreachable; cue dropped");
                }
            }
            Err(reason) => {
                tracing::warn!(
                    event_id = %event.id,
                    source = %event.source,
                    reason = %reason,
                    "Malformed cue payload dropped"
                );
            }
        }
        Ok(())
    }
}
