//! Search planner actor and its supporting modules.

pub mod actor;
pub mod belief;
pub mod dispatch;
pub mod events;
pub mod protocol;
pub mod state;

pub use actor::{PlannerActor, PlannerArguments};
pub use protocol::{DispatchOutcome, PlannerError, PlannerMsg};
