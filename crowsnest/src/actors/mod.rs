//! Actor tree: event bus, cue relay, and the search planner.

pub mod cue_relay;
pub mod event_bus;
pub mod planner;

pub use cue_relay::{CueRelayActor, CueRelayArguments};
pub use event_bus::{BusEvent, EventBusActor, EventBusMsg};
pub use planner::{PlannerActor, PlannerArguments, PlannerMsg};
