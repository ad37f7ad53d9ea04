//! Negative-information bookkeeping.
//!
//! Each not-confirmed verdict reduces belief mass for the tile's azimuth
//! band, monotonically. Advisory only: replan ordering stays with the
//! pattern sequence, and the map rides on telemetry so a future learned
//! policy has the history it needs.

use serde::Serialize;
use std::collections::BTreeMap;

use shared_types::{Cue, Tile};

/// Coarse per-band belief mass over azimuth. Bands start at mass 1.0 and
/// only ever decay.
#[derive(Debug, Clone, Serialize)]
pub struct BearingBelief {
    band_deg: f64,
    mass: BTreeMap<i32, f64>,
}

impl BearingBelief {
    pub fn new(band_deg: f64) -> Self {
        Self {
            band_deg: if band_deg > 0.0 { band_deg } else { 5.0 },
            mass: BTreeMap::new(),
        }
    }

    fn band_of(&self, az_deg: f64) -> i32 {
        (az_deg / self.band_deg).floor() as i32
    }

    /// Halve the band's mass on each miss. Never increases.
    pub fn record_miss(&mut self, az_deg: f64) {
        let band = self.band_of(az_deg);
        let mass = self.mass.entry(band).or_insert(1.0);
        *mass *= 0.5;
    }

    pub fn mass_at(&self, az_deg: f64) -> f64 {
        self.mass.get(&self.band_of(az_deg)).copied().unwrap_or(1.0)
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "band_deg": self.band_deg,
            "bands": self
                .mass
                .iter()
                .map(|(band, mass)| {
                    serde_json::json!({
                        "start_deg": *band as f64 * self.band_deg,
                        "mass": mass,
                    })
                })
                .collect::<Vec<_>>(),
        })
    }
}

impl Default for BearingBelief {
    fn default() -> Self {
        Self::new(5.0)
    }
}

/// Shadow-mode advisor: records what a learned policy would have suggested
/// for this plan. Logs only; never controls tile order.
#[derive(Debug, Default)]
pub struct ShadowAdvisor;

impl ShadowAdvisor {
    pub fn recommend(&self, cue: &Cue, plan: &[Tile]) -> serde_json::Value {
        serde_json::json!({
            "policy": "shadow_bandit_v0",
            "reason": "placeholder",
            "suggested": serde_json::Value::Null,
            "cue_bearing_deg": cue.bearing_deg,
            "plan_len": plan.len(),
        })
    }
}
