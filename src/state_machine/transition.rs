//! Pure state transition function
//!
//! Given a user record and a trigger, decides the field update and the
//! effects. No I/O happens here; the runtime persists the update and runs
//! the effects.

use super::{Effect, Notice, Trigger, UserState};
use crate::db::{UserRecord, UserUpdate};
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug, PartialEq, Eq)]
pub struct TransitionResult {
    /// Fields to persist. `None` means the record is left untouched.
    pub update: Option<UserUpdate>,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(update: UserUpdate) -> Self {
        Self {
            update: Some(update),
            effects: vec![],
        }
    }

    pub fn unchanged() -> Self {
        Self {
            update: None,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    /// State the record will be in once the update is applied
    #[allow(dead_code)] // Used in tests
    pub fn next_state(&self, current: UserState) -> UserState {
        self.update
            .as_ref()
            .and_then(|update| update.state)
            .unwrap_or(current)
    }
}

/// Guard failures. The chat boundary treats all of them as silent no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Cannot {trigger} while {state}")]
    WrongState {
        trigger: &'static str,
        state: UserState,
    },
    #[error("No interval configured")]
    IntervalUnset,
    #[error("Invalid interval: {0} minutes")]
    InvalidInterval(u32),
}

/// Pure transition function
pub fn transition(
    record: &UserRecord,
    trigger: Trigger,
    now: DateTime<Utc>,
) -> Result<TransitionResult, TransitionError> {
    let state = record.state;
    match (state, trigger) {
        // Main menu is available from anywhere and never mutates
        (_, Trigger::ShowMenu) => {
            Ok(TransitionResult::unchanged().with_effect(Effect::Notify(Notice::Menu {
                state,
                interval_minutes: record.interval_minutes,
            })))
        }

        // ============================================================
        // Schedule setup
        // ============================================================
        (UserState::Idle, Trigger::OpenSchedule) => Ok(TransitionResult::new(
            UserUpdate::state(UserState::AwaitingIntervalChoice),
        )
        .with_effect(Effect::Notify(Notice::ChooseInterval))),

        (UserState::AwaitingIntervalChoice, Trigger::ChooseInterval { minutes }) => {
            if minutes == 0 {
                return Err(TransitionError::InvalidInterval(minutes));
            }
            Ok(TransitionResult::new(UserUpdate {
                state: Some(UserState::CanAct),
                interval_minutes: Some(minutes),
                last_event_at: None,
            })
            .with_effect(Effect::Notify(Notice::IntervalSet { minutes })))
        }

        // ============================================================
        // Pacing loop
        // ============================================================
        (UserState::CanAct, Trigger::RecordEvent) => {
            let minutes = require_interval(record)?;
            Ok(TransitionResult::new(UserUpdate {
                state: Some(UserState::InInterval),
                interval_minutes: None,
                last_event_at: Some(now),
            })
            .with_effect(Effect::StartTimer {
                duration: interval_duration(minutes),
            })
            .with_effect(Effect::Notify(Notice::EventRecorded { minutes })))
        }

        (UserState::InInterval, Trigger::TimerFired) => {
            Ok(TransitionResult::new(UserUpdate::state(UserState::CanAct))
                .with_effect(Effect::Notify(Notice::IntervalElapsed)))
        }

        (UserState::CanAct, Trigger::MarkDone) => {
            Ok(TransitionResult::new(UserUpdate::state(UserState::Idle))
                .with_effect(Effect::CancelTimer)
                .with_effect(Effect::Notify(Notice::DayDone)))
        }

        // ============================================================
        // Day boundaries
        // ============================================================

        // Already able to act: double taps land here
        (UserState::CanAct, Trigger::StartDay) => Ok(TransitionResult::unchanged()),

        (UserState::Idle, Trigger::StartDay) => {
            let minutes = require_interval(record)?;
            Ok(TransitionResult::new(UserUpdate::state(UserState::CanAct))
                .with_effect(Effect::Notify(Notice::DayStarted { minutes })))
        }

        (
            UserState::AwaitingIntervalChoice | UserState::CanAct | UserState::InInterval,
            Trigger::Stop,
        ) => Ok(TransitionResult::new(UserUpdate::state(UserState::Idle))
            .with_effect(Effect::CancelTimer)
            .with_effect(Effect::Notify(Notice::ScheduleStopped))),

        // ============================================================
        // Guard violations
        // ============================================================
        (state, trigger) => Err(TransitionError::WrongState {
            trigger: trigger.name(),
            state,
        }),
    }
}

fn require_interval(record: &UserRecord) -> Result<u32, TransitionError> {
    record
        .interval_minutes
        .filter(|minutes| *minutes > 0)
        .ok_or(TransitionError::IntervalUnset)
}

/// Length of one pacing interval
pub fn interval_duration(minutes: u32) -> Duration {
    Duration::from_secs(u64::from(minutes) * 60)
}
