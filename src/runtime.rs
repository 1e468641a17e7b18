//! Runtime for pacing users
//!
//! Owns the single-writer event loop, the countdowns, and startup recovery.

mod executor;
mod recovery;
pub mod timers;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{Outcome, PacerRuntime};
pub use traits::*;

use crate::db::{DbError, UserId};
use crate::state_machine::Trigger;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Storage(#[from] DbError),
    #[error("Runtime is not running")]
    Stopped,
}

/// A trigger addressed to one user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub user_id: UserId,
    pub trigger: Trigger,
    /// Chat message the trigger came from, edited in place by the reply
    pub origin_message: Option<i32>,
}

impl Command {
    pub fn new(user_id: UserId, trigger: Trigger) -> Self {
        Self {
            user_id,
            trigger,
            origin_message: None,
        }
    }

    pub fn with_origin(mut self, message_id: i32) -> Self {
        self.origin_message = Some(message_id);
        self
    }
}

/// Handle to submit commands to a running runtime
#[derive(Clone)]
pub struct RuntimeHandle {
    command_tx: mpsc::Sender<Command>,
}

impl RuntimeHandle {
    fn new(command_tx: mpsc::Sender<Command>) -> Self {
        Self { command_tx }
    }

    pub async fn send(&self, command: Command) -> Result<(), RuntimeError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| RuntimeError::Stopped)
    }
}
