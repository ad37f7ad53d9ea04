//! Capability gating.
//!
//! Every modality adapter declares which control knobs the planner may set
//! and the legal range for each. Gating is pure: given a proposed parameter
//! set and a profile, it keeps only the allowed knobs and clamps values into
//! range. Disallowed knobs are dropped silently; a clamp is a warning on the
//! task log, never an error.

use serde::{Deserialize, Serialize};
use shared_types::Tile;
use std::collections::BTreeMap;

/// Inclusive clamp range for one settable knob.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KnobBounds {
    pub min: f64,
    pub max: f64,
}

/// Declares what one adapter instance allows the planner to set.
///
/// A knob's presence in the map is the "can set" flag; its bounds are the
/// clamp range. Static per adapter instance, read-only to the planner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityProfile {
    pub knobs: BTreeMap<String, KnobBounds>,
}

impl CapabilityProfile {
    pub fn from_bounds(knobs: BTreeMap<String, KnobBounds>) -> Self {
        Self { knobs }
    }

    pub fn allows(&self, knob: &str) -> bool {
        self.knobs.contains_key(knob)
    }
}

/// A proposed value that had to be clamped into its declared bounds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClampNote {
    pub knob: String,
    pub proposed: f64,
    pub applied: f64,
}

/// Filter a proposed parameter set against a profile.
///
/// Output contains only allowed knobs, each within bounds. Pure aside from
/// reading the profile.
pub fn gate_params(
    proposed: &BTreeMap<String, f64>,
    profile: &CapabilityProfile,
) -> (BTreeMap<String, f64>, Vec<ClampNote>) {
    let mut out = BTreeMap::new();
    let mut notes = Vec::new();
    for (knob, &value) in proposed {
        let Some(bounds) = profile.knobs.get(knob) else {
            continue;
        };
        let applied = value.clamp(bounds.min, bounds.max);
        if applied != value {
            notes.push(ClampNote {
                knob: knob.clone(),
                proposed: value,
                applied,
            });
        }
        out.insert(knob.clone(), applied);
    }
    (out, notes)
}

/// Produce a dispatch-ready tile whose parameter set passed gating.
pub fn gate_tile(
    tile: &Tile,
    proposed: &BTreeMap<String, f64>,
    profile: &CapabilityProfile,
) -> (Tile, Vec<ClampNote>) {
    let (params, notes) = gate_params(proposed, profile);
    let mut gated = tile.clone();
    gated.params = params;
    (gated, notes)
}
