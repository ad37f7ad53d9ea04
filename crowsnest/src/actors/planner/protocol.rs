//! PlannerActor message protocol
//!
//! Defines the messages the planner handles and the error types used while
//! planning a task. Planning errors never leave the actor; they are mapped
//! onto the task's failure reason.

use ractor::RpcReplyPort;
use shared_types::{Cue, Decision, ModalityKind, Observation, PlannerStatus, SearchResult};

use crate::pattern::PatternError;

/// Messages handled by PlannerActor
#[derive(Debug)]
pub enum PlannerMsg {
    /// A directional cue arrived; starts or preempts a search task
    Cue(Cue),

    /// The dispatch task finished the settle and handed the tile to the
    /// adapter; moves the state machine into the analysis wait
    TileDispatched { task_id: String, tile_seq: u64 },

    /// Terminal outcome of one dispatched tile
    TileOutcome {
        task_id: String,
        tile_seq: u64,
        outcome: DispatchOutcome,
    },

    /// Read-only status snapshot for operator views
    GetStatus { reply: RpcReplyPort<PlannerStatus> },

    /// Result of the most recently terminated task, if any
    GetLastResult {
        reply: RpcReplyPort<Option<SearchResult>>,
    },
}

/// How one dispatched tile came back from the adapter.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The analyzer produced a definite verdict within the SLA
    Decided {
        observation: Observation,
        decision: Decision,
        elapsed_ms: u64,
    },
    /// The analyzer wait exceeded the per-tile SLA
    TimedOut { elapsed_ms: u64 },
    /// Unrecoverable adapter fault
    Fatal { message: String },
    /// The task was cancelled while the dispatch was in flight
    Cancelled,
}

/// Errors raised while planning a task, before any tile is dispatched.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("invalid cue: {0}")]
    InvalidCue(String),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("no adapter registered for modality {0}")]
    NoAdapter(ModalityKind),
    #[error("pattern produced an empty tile plan")]
    EmptyPlan,
}

impl From<PlannerError> for shared_types::FailureReason {
    fn from(err: PlannerError) -> Self {
        match err {
            PlannerError::InvalidCue(msg) => shared_types::FailureReason::InvalidCue(msg),
            other => shared_types::FailureReason::Planning(other.to_string()),
        }
    }
}
