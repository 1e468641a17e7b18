//! Per-user state types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Stable user identity (the Telegram chat id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a user is in the pacing loop.
///
/// ```text
/// Idle -> AwaitingIntervalChoice -> CanAct <-> InInterval
///   ^                                 |
///   +---------------------------------+  (mark done / stop)
/// ```
///
/// `Idle` is the resting state; there is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserState {
    #[default]
    Idle,
    AwaitingIntervalChoice,
    CanAct,
    InInterval,
}

impl UserState {
    pub const ALL: [UserState; 4] = [
        UserState::Idle,
        UserState::AwaitingIntervalChoice,
        UserState::CanAct,
        UserState::InInterval,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UserState::Idle => "idle",
            UserState::AwaitingIntervalChoice => "awaiting_interval_choice",
            UserState::CanAct => "can_act",
            UserState::InInterval => "in_interval",
        }
    }

    /// States that require a configured interval
    #[allow(dead_code)] // Used in tests
    pub fn requires_interval(self) -> bool {
        matches!(self, UserState::CanAct | UserState::InInterval)
    }
}

impl fmt::Display for UserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown user state: {0}")]
pub struct UnknownState(pub String);

impl FromStr for UserState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UserState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}
