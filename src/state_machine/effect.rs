//! Effects produced by state transitions

use super::state::UserState;
use std::time::Duration;

/// Effects to be executed after the new fields are persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Start (or replace) the user's countdown
    StartTimer { duration: Duration },

    /// Cancel the user's countdown, if any
    CancelTimer,

    /// Send a notice to the user
    Notify(Notice),
}

/// Outbound message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Menu {
        state: UserState,
        interval_minutes: Option<u32>,
    },
    ChooseInterval,
    IntervalSet { minutes: u32 },
    EventRecorded { minutes: u32 },
    IntervalElapsed,
    DayDone,
    DayStarted { minutes: u32 },
    ScheduleStopped,
}
