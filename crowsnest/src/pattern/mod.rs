//! Search pattern library.
//!
//! Patterns expand a cue into an ordered, finite tile sequence. Expansion
//! is pure and deterministic: identical inputs always produce the same
//! pointing sequence (tile ids aside), so a plan can be regenerated or
//! replayed in tests.
//!
//! The registry is an explicit object constructed at startup and handed to
//! the planner; tests build their own with whatever patterns they need.

mod az_spiral;
mod horizon_ladder;

pub use az_spiral::AzSpiral;
pub use horizon_ladder::HorizonLadder;

use shared_types::{Cue, Tile};
use std::collections::HashMap;
use std::sync::Arc;

/// Knobs shared by the built-in patterns.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternParams {
    pub step_az_deg: f64,
    /// Span on each side of the cue bearing
    pub span_az_deg: f64,
    /// Elevation bands, low to high; the first band is the horizon
    pub ladder_elevations_deg: Vec<f64>,
    pub dwell_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("unknown pattern: {0}")]
    Unknown(String),
    #[error("invalid pattern parameters: {0}")]
    InvalidParams(String),
}

pub trait SearchPattern: Send + Sync {
    fn name(&self) -> &'static str;

    /// Expand a cue into an ordered tile sequence.
    fn expand(&self, cue: &Cue, params: &PatternParams) -> Result<Vec<Tile>, PatternError>;
}

/// Pattern lookup by name. No global state: each planner (and each test)
/// owns the registry it was constructed with.
pub struct PatternRegistry {
    patterns: HashMap<String, Arc<dyn SearchPattern>>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self {
            patterns: HashMap::new(),
        }
    }

    /// Registry with the built-in patterns.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(HorizonLadder));
        registry.register(Arc::new(AzSpiral));
        registry
    }

    pub fn register(&mut self, pattern: Arc<dyn SearchPattern>) {
        self.patterns.insert(pattern.name().to_string(), pattern);
    }

    pub fn expand(
        &self,
        name: &str,
        cue: &Cue,
        params: &PatternParams,
    ) -> Result<Vec<Tile>, PatternError> {
        let pattern = self
            .patterns
            .get(name)
            .ok_or_else(|| PatternError::Unknown(name.to_string()))?;
        pattern.expand(cue, params)
    }

    pub fn names(&self) -> Vec<&str> {
        self.patterns.keys().map(String::as_str).collect()
    }
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Wrap an angle to the canonical [-180, 180] range; -180 normalizes
/// to +180 so the boundary has a single representation.
pub fn wrap_deg_180(deg: f64) -> f64 {
    let wrapped = (deg + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 {
        180.0
    } else {
        wrapped
    }
}

pub(crate) fn validate_params(params: &PatternParams) -> Result<(), PatternError> {
    if !params.step_az_deg.is_finite() || params.step_az_deg <= 0.0 {
        return Err(PatternError::InvalidParams(format!(
            "azimuth step must be positive, got {}",
            params.step_az_deg
        )));
    }
    if !params.span_az_deg.is_finite() || params.span_az_deg < 0.0 {
        return Err(PatternError::InvalidParams(format!(
            "azimuth span must be non-negative, got {}",
            params.span_az_deg
        )));
    }
    if params.dwell_ms == 0 {
        return Err(PatternError::InvalidParams(
            "dwell must be positive".to_string(),
        ));
    }
    if params.ladder_elevations_deg.is_empty() {
        return Err(PatternError::InvalidParams(
            "elevation ladder is empty".to_string(),
        ));
    }
    Ok(())
}
