//! Planner configuration.
//!
//! Defaults mirror the field-demo deployment. All durations are in
//! milliseconds; angles are relative to bow = 0° (positive to starboard,
//! negative to port).
//!
//! Configuration is read from a TOML file named by `CROWSNEST_CONFIG`
//! (falling back to built-in defaults), then individual operational knobs
//! can be overridden from the environment.

use serde::Deserialize;
use shared_types::ModalityKind;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::capability::{CapabilityProfile, KnobBounds};
use crate::pattern::PatternParams;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Time to let optics/antenna settle after a slew
    pub settle_ms: u64,
    /// Dwell/capture time handed to the analyzer
    pub dwell_ms: u64,
    /// Hard timeout waiting for the analyzer verdict, on top of the dwell
    pub analyzer_sla_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_ms: 50,
            dwell_ms: 150,
            analyzer_sla_ms: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Total wall-clock budget for a task
    pub time_budget_ms: u64,
    /// Safety cap on number of tiles executed
    pub max_tiles: u32,
    /// Consecutive analyzer timeouts before the task fails
    pub max_consecutive_timeouts: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            time_budget_ms: 4000,
            max_tiles: 12,
            max_consecutive_timeouts: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub default_pattern: String,
    pub step_az_deg: f64,
    /// Span on each side of the cue bearing
    pub span_az_deg: f64,
    pub ladder_elevations_deg: Vec<f64>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            default_pattern: "horizon_ladder".to_string(),
            step_az_deg: 2.0,
            span_az_deg: 10.0,
            ladder_elevations_deg: vec![0.0, 1.0, 2.5],
        }
    }
}

/// How a fresh cue competes with an active task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreemptionPolicy {
    /// Every fresh cue preempts the active task
    NewerWins,
    /// Only a strictly higher priority rank preempts; ties never do
    Priority,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PreemptionConfig {
    pub policy: PreemptionPolicy,
}

impl Default for PreemptionConfig {
    fn default() -> Self {
        Self {
            policy: PreemptionPolicy::NewerWins,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Where simulators write frames/scope renders for human review
    pub artifact_dir: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("data"),
        }
    }
}

/// Knob values the planner proposes per modality; capability gating still
/// filters and clamps them before dispatch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct KnobPresets {
    pub vision: BTreeMap<String, f64>,
    pub radar: BTreeMap<String, f64>,
}

impl Default for KnobPresets {
    fn default() -> Self {
        Self {
            vision: BTreeMap::from([("zoom".to_string(), 5.0)]),
            radar: BTreeMap::from([
                ("power".to_string(), 0.9),
                ("gain".to_string(), 0.8),
                ("clutter".to_string(), 0.2),
            ]),
        }
    }
}

/// Allowed knobs and clamp bounds per modality. Adapters are constructed
/// from this; the planner only ever sees the resulting profile.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    pub vision: BTreeMap<String, KnobBounds>,
    pub radar: BTreeMap<String, KnobBounds>,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            vision: BTreeMap::from([("zoom".to_string(), KnobBounds { min: 1.0, max: 30.0 })]),
            radar: BTreeMap::from([
                ("power".to_string(), KnobBounds { min: 0.1, max: 1.0 }),
                ("gain".to_string(), KnobBounds { min: 0.1, max: 1.0 }),
                ("clutter".to_string(), KnobBounds { min: 0.0, max: 1.0 }),
            ]),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub timing: TimingConfig,
    pub budgets: BudgetConfig,
    pub pattern: PatternConfig,
    pub preemption: PreemptionConfig,
    pub artifacts: ArtifactConfig,
    pub knobs: KnobPresets,
    pub capabilities: CapabilityConfig,
}

impl PlannerConfig {
    /// Load from `CROWSNEST_CONFIG` if set, else defaults, then apply
    /// environment overrides for the operational knobs.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("CROWSNEST_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse::<u64>("CROWSNEST_TIME_BUDGET_MS") {
            self.budgets.time_budget_ms = v;
        }
        if let Some(v) = env_parse::<u32>("CROWSNEST_MAX_TILES") {
            self.budgets.max_tiles = v;
        }
        if let Some(v) = env_parse::<u64>("CROWSNEST_ANALYZER_SLA_MS") {
            self.timing.analyzer_sla_ms = v;
        }
        if let Ok(v) = std::env::var("CROWSNEST_PREEMPTION_POLICY") {
            match v.as_str() {
                "newer_wins" => self.preemption.policy = PreemptionPolicy::NewerWins,
                "priority" => self.preemption.policy = PreemptionPolicy::Priority,
                other => {
                    tracing::warn!(value = %other, "Unknown preemption policy override ignored")
                }
            }
        }
    }

    /// Hard deadline for one tile's analyzer wait, counted after the settle.
    pub fn tile_sla(&self) -> Duration {
        Duration::from_millis(self.timing.dwell_ms + self.timing.analyzer_sla_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.timing.settle_ms)
    }

    pub fn pattern_params(&self) -> PatternParams {
        PatternParams {
            step_az_deg: self.pattern.step_az_deg,
            span_az_deg: self.pattern.span_az_deg,
            ladder_elevations_deg: self.pattern.ladder_elevations_deg.clone(),
            dwell_ms: self.timing.dwell_ms,
        }
    }

    pub fn presets_for(&self, kind: ModalityKind) -> &BTreeMap<String, f64> {
        match kind {
            ModalityKind::Vision => &self.knobs.vision,
            ModalityKind::Radar => &self.knobs.radar,
        }
    }

    pub fn capability_profile(&self, kind: ModalityKind) -> CapabilityProfile {
        let bounds = match kind {
            ModalityKind::Vision => self.capabilities.vision.clone(),
            ModalityKind::Radar => self.capabilities.radar.clone(),
        };
        CapabilityProfile::from_bounds(bounds)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
