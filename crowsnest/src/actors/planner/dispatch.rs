//! Tile dispatch - the planner's single suspension point.
//!
//! One dispatch runs on its own tokio task: settle the sensor, hand the
//! tile to the adapter, and wait for the verdict bounded by the per-tile
//! SLA. The task's cancellation token aborts either wait promptly, so
//! preemption is bounded by the select, not by the full SLA. Exactly one
//! `TileOutcome` message goes back to the actor per dispatch.

use ractor::ActorRef;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use shared_types::Tile;

use crate::modality::{AdapterError, ModalityAdapter};

use super::protocol::{DispatchOutcome, PlannerMsg};

pub struct DispatchContext {
    pub task_id: String,
    pub tile_seq: u64,
    pub tile: Tile,
    pub settle: Duration,
    /// Hard deadline for the adapter call (dwell + analyzer SLA)
    pub sla: Duration,
    pub adapter: Arc<dyn ModalityAdapter>,
    pub cancel: CancellationToken,
    pub planner: ActorRef<PlannerMsg>,
}

pub fn spawn_dispatch(ctx: DispatchContext) {
    tokio::spawn(run(ctx));
}

async fn run(ctx: DispatchContext) {
    let started = Instant::now();

    // Let the optics/antenna settle after the slew.
    tokio::select! {
        _ = ctx.cancel.cancelled() => {
            send_outcome(&ctx, DispatchOutcome::Cancelled);
            return;
        }
        _ = tokio::time::sleep(ctx.settle) => {}
    }

    let _ = ctx.planner.send_message(PlannerMsg::TileDispatched {
        task_id: ctx.task_id.clone(),
        tile_seq: ctx.tile_seq,
    });

    let outcome = tokio::select! {
        _ = ctx.cancel.cancelled() => DispatchOutcome::Cancelled,
        result = tokio::time::timeout(ctx.sla, ctx.adapter.execute_tile(&ctx.tile)) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match result {
                Err(_) => DispatchOutcome::TimedOut { elapsed_ms },
                Ok(Ok((observation, decision))) => DispatchOutcome::Decided {
                    observation,
                    decision,
                    elapsed_ms,
                },
                Ok(Err(AdapterError::Fatal(message))) => DispatchOutcome::Fatal { message },
            }
        }
    };

    send_outcome(&ctx, outcome);
}

fn send_outcome(ctx: &DispatchContext, outcome: DispatchOutcome) {
    // The actor may already be gone during shutdown; nothing to do then.
    let _ = ctx.planner.send_message(PlannerMsg::TileOutcome {
        task_id: ctx.task_id.clone(),
        tile_seq: ctx.tile_seq,
        outcome,
    });
}
