//! PlannerActor - the search scheduler state machine
//!
//! ```text
//!   [IDLE] -> [PLANNING] -> [EXECUTING_TILE] -> [AWAITING_ANALYSIS]
//!                 ^                |                    |
//!                 |                | (budget/fatal)     | (verdict)
//!                 |                v                    v
//!               [FAILED] <--- [REPLAN] <-- (negative) [DONE]
//!
//!   Preemption (anytime): fresh cue -> PLANNING (new task)
//! ```
//!
//! The actor owns at most one active task. Tiles run strictly one at a
//! time: a dispatch is spawned, its outcome comes back as a message, and
//! only then is the next tile considered. The verdict for tile N is fully
//! processed before tile N+1 leaves the queue.

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use shared_types::{
    Cue, FailureReason, ModalityKind, PlannerStatus, SearchResult, SearchState,
};

use crate::actors::event_bus::EventBusMsg;
use crate::capability::gate_tile;
use crate::config::{PlannerConfig, PreemptionPolicy};
use crate::modality::ModalityAdapter;
use crate::pattern::PatternRegistry;

use super::belief::ShadowAdvisor;
use super::dispatch::{spawn_dispatch, DispatchContext};
use super::events;
use super::protocol::{DispatchOutcome, PlannerError, PlannerMsg};
use super::state::{BudgetCheck, SearchTask};

#[derive(Debug, Default)]
pub struct PlannerActor;

pub struct PlannerArguments {
    pub config: PlannerConfig,
    pub registry: Arc<PatternRegistry>,
    pub adapters: HashMap<ModalityKind, Arc<dyn ModalityAdapter>>,
    pub event_bus: Option<ActorRef<EventBusMsg>>,
}

pub struct PlannerState {
    config: PlannerConfig,
    registry: Arc<PatternRegistry>,
    adapters: HashMap<ModalityKind, Arc<dyn ModalityAdapter>>,
    event_bus: Option<ActorRef<EventBusMsg>>,
    advisor: ShadowAdvisor,
    active: Option<ActiveTask>,
    last_result: Option<SearchResult>,
}

struct ActiveTask {
    task: SearchTask,
    cancel: CancellationToken,
}

/// Does a fresh cue outrank the one driving the active task?
///
/// Ties never preempt under the priority policy: equal ranks are ordered
/// by arrival, so the incumbent (earlier) cue keeps the sensor. That keeps
/// the ordering total without thrash between equal detectors.
fn cue_preempts(fresh: &Cue, active: &Cue, policy: PreemptionPolicy) -> bool {
    match policy {
        PreemptionPolicy::NewerWins => true,
        PreemptionPolicy::Priority => fresh.priority > active.priority,
    }
}

#[async_trait]
impl Actor for PlannerActor {
    type Msg = PlannerMsg;
    type State = PlannerState;
    type Arguments = PlannerArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            actor_id = %myself.get_id(),
            adapters = args.adapters.len(),
            "PlannerActor starting"
        );
        Ok(PlannerState {
            config: args.config,
            registry: args.registry,
            adapters: args.adapters,
            event_bus: args.event_bus,
            advisor: ShadowAdvisor,
            active: None,
            last_result: None,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            PlannerMsg::Cue(cue) => self.handle_cue(&myself, state, cue),
            PlannerMsg::TileDispatched { task_id, tile_seq } => {
                self.handle_tile_dispatched(state, task_id, tile_seq)
            }
            PlannerMsg::TileOutcome {
                task_id,
                tile_seq,
                outcome,
            } => self.handle_tile_outcome(&myself, state, task_id, tile_seq, outcome),
            PlannerMsg::GetStatus { reply } => {
                let _ = reply.send(Self::status(state));
            }
            PlannerMsg::GetLastResult { reply } => {
                let _ = reply.send(state.last_result.clone());
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        // Abort any in-flight dispatch so the adapter is left idle.
        if let Some(active) = state.active.take() {
            active.cancel.cancel();
        }
        tracing::info!(actor_id = %myself.get_id(), "PlannerActor stopped");
        Ok(())
    }
}

impl PlannerActor {
    fn handle_cue(&self, myself: &ActorRef<PlannerMsg>, state: &mut PlannerState, cue: Cue) {
        if let Some(active) = &state.active {
            if !cue_preempts(&cue, &active.task.cue, state.config.preemption.policy) {
                tracing::warn!(
                    object_id = %cue.object_id,
                    priority = cue.priority,
                    active_task = %active.task.task_id,
                    active_priority = active.task.cue.priority,
                    "Cue dropped: active task outranks it"
                );
                return;
            }
            // Preemption: cancel the in-flight dispatch, publish nothing
            // for the old task, and plan the fresh cue immediately.
            let active = state.active.take().expect("checked above");
            active.cancel.cancel();
            events::emit_task_cancelled(&state.event_bus, &active.task.task_id, &cue.object_id);
            tracing::info!(
                task_id = %active.task.task_id,
                preempted_by = %cue.object_id,
                "Task preempted by fresh cue"
            );
        }
        self.start_task(myself, state, cue);
    }

    fn start_task(&self, myself: &ActorRef<PlannerMsg>, state: &mut PlannerState, cue: Cue) {
        let mut task = SearchTask::new(cue, &state.config.budgets);
        tracing::info!(
            task_id = %task.task_id,
            object_id = %task.cue.object_id,
            bearing_deg = task.cue.bearing_deg,
            modality = %task.cue.modality,
            "Search task planning"
        );
        events::emit_task_started(&state.event_bus, &task.task_id, &task.cue);

        match Self::plan_task(state, &mut task) {
            Ok(()) => {
                let advice = state.advisor.recommend(&task.cue, &task.plan);
                events::emit_shadow_advice(&state.event_bus, &task.task_id, advice);
                state.active = Some(ActiveTask {
                    task,
                    cancel: CancellationToken::new(),
                });
                self.dispatch_next(myself, state);
            }
            Err(err) => {
                tracing::warn!(task_id = %task.task_id, error = %err, "Planning failed");
                self.finish_failed(state, task, err.into());
            }
        }
    }

    /// Expand the cue into a tile plan. No adapter calls are made here;
    /// any error fails the task before the first dispatch.
    fn plan_task(state: &PlannerState, task: &mut SearchTask) -> Result<(), PlannerError> {
        task.cue.validate().map_err(PlannerError::InvalidCue)?;
        if !state.adapters.contains_key(&task.cue.modality) {
            return Err(PlannerError::NoAdapter(task.cue.modality));
        }
        let params = state.config.pattern_params();
        let plan = state.registry.expand(
            &state.config.pattern.default_pattern,
            &task.cue,
            &params,
        )?;
        if plan.is_empty() {
            return Err(PlannerError::EmptyPlan);
        }
        task.plan = plan;
        Ok(())
    }

    /// Budget-gate and dispatch the next tile, or terminate the task.
    fn dispatch_next(&self, myself: &ActorRef<PlannerMsg>, state: &mut PlannerState) {
        let Some(active) = state.active.as_mut() else {
            return;
        };

        let check = active.task.budget_check(Instant::now());
        let next_index = active.task.next_tile_index();
        if check != BudgetCheck::Ok || next_index.is_none() {
            let active = state.active.take().expect("borrowed above");
            let reason = active.task.exhaustion_reason();
            tracing::info!(
                task_id = %active.task.task_id,
                executed_tiles = active.task.executed_tiles,
                budget = ?check,
                "Search budget exhausted"
            );
            self.finish_failed(state, active.task, reason);
            return;
        }
        let index = next_index.expect("checked above");

        let adapter = state.adapters[&active.task.cue.modality].clone();
        let profile = adapter.capabilities();
        let presets = state.config.presets_for(active.task.cue.modality);
        let (gated, notes) = gate_tile(&active.task.plan[index], presets, &profile);
        for note in &notes {
            tracing::warn!(
                task_id = %active.task.task_id,
                knob = %note.knob,
                proposed = note.proposed,
                applied = note.applied,
                "Knob value clamped to capability bounds"
            );
        }

        let tile_seq = active.task.begin_dispatch(index, gated.clone(), notes);
        tracing::info!(
            task_id = %active.task.task_id,
            tile_seq,
            az_deg = gated.az_deg,
            el_deg = gated.el_deg,
            "Dispatching tile"
        );
        spawn_dispatch(DispatchContext {
            task_id: active.task.task_id.clone(),
            tile_seq,
            tile: gated,
            settle: state.config.settle(),
            sla: state.config.tile_sla(),
            adapter,
            cancel: active.cancel.clone(),
            planner: myself.clone(),
        });
    }

    fn handle_tile_dispatched(&self, state: &mut PlannerState, task_id: String, tile_seq: u64) {
        let Some(active) = state.active.as_mut() else {
            return;
        };
        if active.task.task_id != task_id || active.task.tile_seq != tile_seq {
            return;
        }
        if active.task.state == SearchState::ExecutingTile {
            active.task.transition(SearchState::AwaitingAnalysis);
            let tile = active.task.last_tile.clone();
            if let Some(tile) = tile {
                events::emit_tile_dispatched(&state.event_bus, &task_id, tile_seq, &tile);
            }
        }
    }

    fn handle_tile_outcome(
        &self,
        myself: &ActorRef<PlannerMsg>,
        state: &mut PlannerState,
        task_id: String,
        tile_seq: u64,
        outcome: DispatchOutcome,
    ) {
        {
            let Some(active) = state.active.as_ref() else {
                tracing::debug!(task_id = %task_id, "Stale tile outcome discarded: no active task");
                return;
            };
            if active.task.task_id != task_id || active.task.tile_seq != tile_seq {
                tracing::debug!(
                    task_id = %task_id,
                    tile_seq,
                    "Stale tile outcome discarded"
                );
                return;
            }
        }

        match outcome {
            DispatchOutcome::Cancelled => {
                // Cancellation with the task still active only happens on
                // shutdown; the post_stop hook already tore everything down.
                tracing::debug!(task_id = %task_id, "Cancelled dispatch outcome ignored");
            }
            DispatchOutcome::Decided {
                observation,
                decision,
                elapsed_ms,
            } => {
                let confirmed = decision.confirmed;
                {
                    let active = state.active.as_mut().expect("validated above");
                    let tile = active.task.last_tile.clone();
                    active.task.record_decision(&observation, decision.clone(), elapsed_ms);
                    if let Some(tile) = tile {
                        events::emit_tile_decision(
                            &state.event_bus,
                            &task_id,
                            &tile,
                            &decision,
                            active.task.belief.snapshot(),
                        );
                    }
                }
                if confirmed {
                    let active = state.active.take().expect("validated above");
                    self.finish_done(state, active.task);
                } else {
                    let active = state.active.as_mut().expect("validated above");
                    active.task.transition(SearchState::Replan);
                    self.dispatch_next(myself, state);
                }
            }
            DispatchOutcome::TimedOut { elapsed_ms } => {
                let escalate = {
                    let active = state.active.as_mut().expect("validated above");
                    active.task.record_timeout(elapsed_ms);
                    let tile = active.task.last_tile.clone();
                    if let Some(tile) = tile {
                        events::emit_tile_timeout(&state.event_bus, &task_id, &tile, elapsed_ms);
                    }
                    tracing::warn!(
                        task_id = %task_id,
                        tile_seq,
                        elapsed_ms,
                        consecutive = active.task.consecutive_timeouts,
                        "Analyzer SLA exceeded"
                    );
                    active.task.consecutive_timeouts
                        >= state.config.budgets.max_consecutive_timeouts
                };
                if escalate {
                    let active = state.active.take().expect("validated above");
                    self.finish_failed(state, active.task, FailureReason::AnalyzerTimeout);
                } else {
                    let active = state.active.as_mut().expect("validated above");
                    active.task.transition(SearchState::Replan);
                    self.dispatch_next(myself, state);
                }
            }
            DispatchOutcome::Fatal { message } => {
                let mut active = state.active.take().expect("validated above");
                active.task.record_fatal(0);
                tracing::error!(task_id = %task_id, error = %message, "Adapter fault");
                self.finish_failed(state, active.task, FailureReason::AdapterFatal(message));
            }
        }
    }

    fn finish_done(&self, state: &mut PlannerState, mut task: SearchTask) {
        task.transition(SearchState::Done);
        let Some(winning) = task.executed.last().cloned() else {
            tracing::warn!(task_id = %task.task_id, "Done with empty executed log");
            return;
        };
        let result = task.success_result(winning.clone());
        if task.claim_sighting_publish() {
            let report = events::build_sighting_report(
                &task.cue,
                &winning.tile,
                result.artifact.as_ref().map(|a| a.path.clone()),
            );
            events::publish_sighting(&state.event_bus, &task.task_id, &report);
        }
        events::emit_task_completed(&state.event_bus, &result);
        tracing::info!(
            task_id = %task.task_id,
            time_to_first_true_ms = ?result.time_to_first_true_ms,
            executed_tiles = result.executed.len(),
            "Search confirmed"
        );
        task.transition(SearchState::Idle);
        state.last_result = Some(result);
    }

    fn finish_failed(&self, state: &mut PlannerState, mut task: SearchTask, reason: FailureReason) {
        task.transition(SearchState::Failed);
        let result = task.failure_result(reason.clone());
        events::emit_task_failed(&state.event_bus, &result);
        tracing::warn!(task_id = %task.task_id, reason = %reason, "Search task failed");
        task.transition(SearchState::Idle);
        state.last_result = Some(result);
    }

    fn status(state: &PlannerState) -> PlannerStatus {
        match &state.active {
            Some(active) => {
                let mut status = active.task.status(Instant::now());
                status.last_result_found = state.last_result.as_ref().map(|r| r.found);
                status
            }
            None => {
                let mut status = PlannerStatus::default();
                if let Some(result) = &state.last_result {
                    status.last_result_found = Some(result.found);
                    status.executed_tiles = result
                        .executed
                        .iter()
                        .filter(|r| r.decision.is_some())
                        .count() as u32;
                    status.timeouts = result.timeouts;
                    status.last_tile = result.executed.last().map(|r| r.tile.clone());
                    status.artifact = result.artifact.clone();
                }
                status
            }
        }
    }
}
