//! Shared types between the search planner and its collaborators
//!
//! These types cross the subsystem boundary:
//! - detector plugins publish cues
//! - the planner publishes sighting reports and status snapshots
//! - modality adapters exchange tiles, observations, and decisions
//!
//! Serializable with serde for JSON over the event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Modalities
// ============================================================================

/// Which kind of steerable sensor a cue or adapter refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ModalityKind {
    Vision,
    Radar,
}

impl ModalityKind {
    /// Parse the loose `source_type` tag detectors put on cue payloads.
    /// Anything mentioning "vision" is vision; everything else tasks radar.
    pub fn from_source_tag(tag: &str) -> Self {
        if tag.to_ascii_lowercase().contains("vision") {
            ModalityKind::Vision
        } else {
            ModalityKind::Radar
        }
    }
}

impl std::fmt::Display for ModalityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModalityKind::Vision => write!(f, "vision"),
            ModalityKind::Radar => write!(f, "radar"),
        }
    }
}

// ============================================================================
// Cue
// ============================================================================

/// Directional hint from a detector that seeds one search task.
///
/// Bearings are relative to bow = 0°, in [0, 360). Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cue {
    /// Identifier of the contact this cue refers to
    pub object_id: String,

    /// Bow-relative bearing in degrees, [0, 360)
    pub bearing_deg: f64,

    /// One-sigma bearing uncertainty in degrees, >= 0
    pub bearing_error_deg: f64,

    /// Which sensor family should run the search
    pub modality: ModalityKind,

    /// Detector confidence, 0-100
    pub confidence: u8,

    /// Preemption rank; larger outranks smaller
    pub priority: u8,

    /// When the cue reached the planner
    pub received_at: DateTime<Utc>,

    /// Free-form detector context (day/night, propagation, ...)
    pub context: serde_json::Value,
}

impl Cue {
    /// Reject cues the planner cannot act on. Validation failures are
    /// configuration errors: the task fails at planning time with no
    /// adapter calls made.
    pub fn validate(&self) -> Result<(), String> {
        if !self.bearing_deg.is_finite() || !(0.0..360.0).contains(&self.bearing_deg) {
            return Err(format!("cue bearing out of range: {}", self.bearing_deg));
        }
        if !self.bearing_error_deg.is_finite() || self.bearing_error_deg < 0.0 {
            return Err(format!(
                "cue bearing uncertainty invalid: {}",
                self.bearing_error_deg
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Tiles and dwell results
// ============================================================================

/// One schedulable unit of work: a pointing direction plus a parameter set.
///
/// Azimuth is canonical [-180, 180]; the pattern library wraps before the
/// tile ever reaches an adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tile {
    pub tile_id: String,
    pub az_deg: f64,
    pub el_deg: f64,
    pub dwell_ms: u64,
    /// Knob name -> value; only capability-allowed knobs survive gating
    pub params: BTreeMap<String, f64>,
}

impl Tile {
    pub fn new(az_deg: f64, el_deg: f64, dwell_ms: u64) -> Self {
        Self {
            tile_id: uuid::Uuid::new_v4().to_string(),
            az_deg,
            el_deg,
            dwell_ms,
            params: BTreeMap::new(),
        }
    }
}

/// Reference to a captured artifact (frame grab, rendered scope).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactRef {
    pub path: String,
    pub content_type: String,
}

/// What a modality adapter reports for one dispatched tile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    /// Feature name -> value (signal strength, analyzer score, ...)
    pub features: BTreeMap<String, f64>,
    pub artifact: Option<ArtifactRef>,
}

/// The analyzer's verdict for one observation. Always definite: a dwell
/// that produces no verdict surfaces as a timeout, never as a partial
/// decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub confirmed: bool,
    pub score: f64,
    pub meta: serde_json::Value,
}

/// How one dispatched tile ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DwellOutcome {
    Confirmed,
    NotConfirmed,
    TimedOut,
    Fatal,
}

impl std::fmt::Display for DwellOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DwellOutcome::Confirmed => write!(f, "confirmed"),
            DwellOutcome::NotConfirmed => write!(f, "not_confirmed"),
            DwellOutcome::TimedOut => write!(f, "timed_out"),
            DwellOutcome::Fatal => write!(f, "fatal"),
        }
    }
}

/// Executed-tile log entry kept on the task and surfaced in the result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TileRecord {
    pub tile: Tile,
    /// None for a dwell that timed out or failed before a verdict
    pub decision: Option<Decision>,
    pub outcome: DwellOutcome,
    pub elapsed_ms: u64,
}

// ============================================================================
// Planner state machine
// ============================================================================

/// Search planner states. `Done` and `Failed` are per-task terminal states
/// that transition straight back to `Idle`; the terminal outcome lives on
/// the `SearchResult`, not on the status snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
    Idle,
    Planning,
    ExecutingTile,
    AwaitingAnalysis,
    Replan,
    Done,
    Failed,
}

impl std::fmt::Display for SearchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchState::Idle => write!(f, "idle"),
            SearchState::Planning => write!(f, "planning"),
            SearchState::ExecutingTile => write!(f, "executing_tile"),
            SearchState::AwaitingAnalysis => write!(f, "awaiting_analysis"),
            SearchState::Replan => write!(f, "replan"),
            SearchState::Done => write!(f, "done"),
            SearchState::Failed => write!(f, "failed"),
        }
    }
}

/// Why a task ended without a confirmed sighting.
///
/// `NoDetection` is the normal exhaustion outcome; the rest are error
/// conditions. `ZeroBudget`, `InvalidCue`, and `Planning` mean no adapter
/// call was ever made.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    InvalidCue(String),
    Planning(String),
    ZeroBudget,
    NoDetection,
    AnalyzerTimeout,
    AdapterFatal(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::InvalidCue(msg) => write!(f, "invalid cue: {msg}"),
            FailureReason::Planning(msg) => write!(f, "planning error: {msg}"),
            FailureReason::ZeroBudget => write!(f, "budget exhausted before first dispatch"),
            FailureReason::NoDetection => write!(f, "no detection, budget exhausted"),
            FailureReason::AnalyzerTimeout => write!(f, "aborted: analyzer timeout"),
            FailureReason::AdapterFatal(msg) => write!(f, "aborted: adapter fault: {msg}"),
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// Final externally visible outcome of one search task. Produced exactly
/// once at termination; preempted tasks never produce one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub task_id: String,
    pub found: bool,
    pub time_to_first_true_ms: Option<u64>,
    pub executed: Vec<TileRecord>,
    pub winning_tile: Option<Tile>,
    pub winning_decision: Option<Decision>,
    pub artifact: Option<ArtifactRef>,
    pub failure: Option<FailureReason>,
    pub timeouts: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Normalized sighting record published downstream on a confirmed search.
///
/// Field names are the platform wire vocabulary; downstream owns the
/// actual encoding. Range is synthetic until a ranging modality exists,
/// and is flagged as such.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SightingReport {
    pub object_id: String,
    pub time_utc: String,
    pub distance_m: f64,
    pub distance_error_m: f64,
    pub bearing_deg_true: f64,
    pub bearing_error_deg: f64,
    pub altitude_m: f64,
    pub altitude_error_m: f64,
    pub confidence: u8,
    pub range_is_synthetic: bool,
    pub range_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
}

// ============================================================================
// Observability
// ============================================================================

/// Read-only status snapshot for operator-facing views.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlannerStatus {
    pub state: String,
    pub task_id: Option<String>,
    pub last_tile: Option<Tile>,
    pub executed_tiles: u32,
    pub timeouts: u32,
    pub time_remaining_ms: Option<u64>,
    pub artifact: Option<ArtifactRef>,
    pub last_result_found: Option<bool>,
}

impl Default for PlannerStatus {
    fn default() -> Self {
        Self {
            state: SearchState::Idle.to_string(),
            task_id: None,
            last_tile: None,
            executed_tiles: 0,
            timeouts: 0,
            time_remaining_ms: None,
            artifact: None,
            last_result_found: None,
        }
    }
}
