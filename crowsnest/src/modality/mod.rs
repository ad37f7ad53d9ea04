//! Modality adapters.
//!
//! An adapter owns one steerable sensor (camera, radar) and its paired
//! analyzer. The planner drives it through a narrow interface: read the
//! capability profile, execute one tile, get back an observation and a
//! definite verdict. Cancellation and the analyzer SLA are enforced by the
//! planner around `execute_tile`, so adapters stay free of timer logic.
//!
//! The sim adapters stand in for real hardware drivers during bench runs
//! and integration tests, the same role the scripted analyzers played in
//! field-demo rehearsals.

mod radar;
mod vision;

pub use radar::SimRadarAdapter;
pub use vision::SimVisionAdapter;

use async_trait::async_trait;
use shared_types::{Decision, ModalityKind, Observation, Tile};

use crate::capability::CapabilityProfile;

#[derive(Debug, thiserror::Error, Clone)]
pub enum AdapterError {
    /// Hardware fault or unrecoverable I/O failure. Fails the task
    /// immediately; never retried.
    #[error("adapter fault: {0}")]
    Fatal(String),
}

#[async_trait]
pub trait ModalityAdapter: Send + Sync {
    fn kind(&self) -> ModalityKind;

    /// Synchronous, no side effects.
    fn capabilities(&self) -> CapabilityProfile;

    /// Opaque state snapshot for telemetry.
    fn current_state(&self) -> serde_json::Value;

    /// Point the sensor at the tile, dwell, and return the analyzer's
    /// verdict. Must resolve to a definite decision or an error; the
    /// planner bounds this future with the per-tile SLA and the task's
    /// cancellation token.
    async fn execute_tile(&self, tile: &Tile) -> Result<(Observation, Decision), AdapterError>;
}

/// Scripted behavior for one dwell of a sim adapter. Tests queue these to
/// force a specific dwell sequence; an empty script falls back to the
/// adapter's built-in confirm rule.
#[derive(Debug, Clone)]
pub enum SimStep {
    NotConfirmed,
    Confirmed,
    /// Never resolve; exercises the planner's SLA timeout
    Hang,
    Fatal(String),
}
