//! Crowsnest - search planner for steerable sensors
//!
//! Given a directional cue from a detector, the planner drives a camera or
//! radar through a sequence of pointing/parameter configurations ("tiles")
//! until the paired analyzer confirms a target or the search budget runs
//! out. One bounded search per cue; a fresh cue preempts the one in flight.

pub mod actors;
pub mod capability;
pub mod config;
pub mod modality;
pub mod pattern;
