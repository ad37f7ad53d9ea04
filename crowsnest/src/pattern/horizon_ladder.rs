//! Horizon-first ladder: sweep azimuth around the cue bearing at each
//! elevation band, lowest band first. Most surface contacts sit on or near
//! the horizon, so the first sweep covers the likeliest band end to end
//! before climbing.

use shared_types::{Cue, Tile};

use super::{validate_params, wrap_deg_180, PatternError, PatternParams, SearchPattern};

pub struct HorizonLadder;

impl SearchPattern for HorizonLadder {
    fn name(&self) -> &'static str {
        "horizon_ladder"
    }

    fn expand(&self, cue: &Cue, params: &PatternParams) -> Result<Vec<Tile>, PatternError> {
        validate_params(params)?;

        // Azimuths from bearing - span to bearing + span inclusive; the
        // epsilon keeps the top end from falling off to float accumulation.
        let start = cue.bearing_deg - params.span_az_deg;
        let end = cue.bearing_deg + params.span_az_deg;
        let mut az_values = Vec::new();
        let mut az = start;
        while az <= end + 1e-6 {
            az_values.push(wrap_deg_180(az));
            az += params.step_az_deg;
        }

        let mut tiles = Vec::with_capacity(az_values.len() * params.ladder_elevations_deg.len());
        for &el in &params.ladder_elevations_deg {
            for &az in &az_values {
                tiles.push(Tile::new(az, el, params.dwell_ms));
            }
        }
        Ok(tiles)
    }
}
