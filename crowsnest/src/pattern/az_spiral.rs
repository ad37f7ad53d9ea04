//! Shallow azimuth spiral: start on the cue bearing and alternate outward
//! (+step, -step, +2·step, ...) until the span is covered. Runs on a single
//! elevation band (the first ladder entry) for cues whose elevation is
//! already trusted.

use shared_types::{Cue, Tile};

use super::{validate_params, wrap_deg_180, PatternError, PatternParams, SearchPattern};

pub struct AzSpiral;

impl SearchPattern for AzSpiral {
    fn name(&self) -> &'static str {
        "az_spiral"
    }

    fn expand(&self, cue: &Cue, params: &PatternParams) -> Result<Vec<Tile>, PatternError> {
        validate_params(params)?;
        let el = params.ladder_elevations_deg[0];

        let mut tiles = vec![Tile::new(wrap_deg_180(cue.bearing_deg), el, params.dwell_ms)];
        let mut offset = params.step_az_deg;
        while offset <= params.span_az_deg + 1e-6 {
            tiles.push(Tile::new(
                wrap_deg_180(cue.bearing_deg + offset),
                el,
                params.dwell_ms,
            ));
            tiles.push(Tile::new(
                wrap_deg_180(cue.bearing_deg - offset),
                el,
                params.dwell_ms,
            ));
            offset += params.step_az_deg;
        }
        Ok(tiles)
    }
}
