//! Per-user pacing state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.

mod effect;
mod event;
mod state;
mod transition;


pub use effect::{Effect, Notice};
pub use event::Trigger;
pub use state::{UserId, UserState};
pub use transition::{transition, TransitionError};
