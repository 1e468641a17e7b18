//! Pacer runtime executor
//!
//! One task owns the timer engine and is the only writer of user state.
//! Inbound commands and countdown expiries are serialized through its
//! event loop.

use super::timers::{ResumeSummary, TimerEngine, TimerFired};
use super::traits::{Delivery, Notifier, UserStore};
use super::{Command, RuntimeError, RuntimeHandle};
use crate::db::{UserId, UserState, UserUpdate, WriteOutcome};
use crate::state_machine::{transition, Effect, TransitionError, Trigger};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

const COMMAND_QUEUE: usize = 64;

/// What a command did to the user record
#[allow(dead_code)] // Inspected in tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Transition persisted
    Applied(crate::db::UserRecord),
    /// Legal trigger that leaves the record as is
    Unchanged,
    /// Guard failure; nothing persisted, no effects run
    Rejected(TransitionError),
}

/// Result of applying one command, before timer effects run
struct Step {
    outcome: Outcome,
    timer_effects: Vec<Effect>,
}

impl Step {
    fn rejected(error: TransitionError) -> Self {
        Self {
            outcome: Outcome::Rejected(error),
            timer_effects: vec![],
        }
    }
}

/// Generic runtime that can work with any store and notifier
pub struct PacerRuntime<S, N>
where
    S: UserStore,
    N: Notifier,
{
    store: S,
    notifier: N,
    timers: TimerEngine,
    command_rx: mpsc::Receiver<Command>,
    fired_rx: mpsc::UnboundedReceiver<TimerFired>,
}

impl<S, N> PacerRuntime<S, N>
where
    S: UserStore,
    N: Notifier,
{
    pub fn new(store: S, notifier: N) -> (Self, RuntimeHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (timers, fired_rx) = TimerEngine::channel();
        let runtime = Self {
            store,
            notifier,
            timers,
            command_rx,
            fired_rx,
        };
        (runtime, RuntimeHandle::new(command_tx))
    }

    /// Rebuild countdowns for users that were mid-interval when the
    /// process stopped. Must run before the event loop accepts commands.
    pub fn resume_in_flight(&mut self) -> Result<ResumeSummary, RuntimeError> {
        let records = self.store.list_users_in_state(UserState::InInterval)?;
        let now = Utc::now();

        let store = &self.store;
        let notifier = &self.notifier;
        let mut follow_up = Vec::new();
        let summary = self.timers.resume_timers(&records, now, |user_id| {
            match apply(store, notifier, &Command::new(user_id, Trigger::TimerFired), now) {
                Ok(step) => follow_up.push((user_id, step.timer_effects)),
                Err(e) => {
                    tracing::error!(user_id = %user_id, error = %e, "Failed to expire overdue interval");
                }
            }
        });

        for (user_id, effects) in follow_up {
            self.run_timer_effects(user_id, effects);
        }

        tracing::info!(
            rearmed = summary.rearmed,
            overdue = summary.overdue,
            skipped = summary.skipped,
            "Resumed in-flight intervals"
        );
        Ok(summary)
    }

    pub async fn run(mut self) {
        tracing::info!("Starting pacer runtime");
        while self.step().await {}
        self.timers.cancel_all();
        tracing::info!("Pacer runtime stopped");
    }

    /// Process one command or expiry. Returns `false` once every command
    /// sender is gone.
    pub async fn step(&mut self) -> bool {
        tokio::select! {
            command = self.command_rx.recv() => {
                let Some(command) = command else {
                    return false;
                };
                let user_id = command.user_id;
                if let Err(e) = self.handle_command(command) {
                    tracing::error!(user_id = %user_id, error = %e, "Error handling command");
                }
                true
            }
            Some(fired) = self.fired_rx.recv() => {
                let user_id = fired.user_id;
                if let Err(e) = self.handle_fired(fired) {
                    tracing::error!(user_id = %user_id, error = %e, "Error handling countdown expiry");
                }
                true
            }
        }
    }

    pub fn handle_command(&mut self, command: Command) -> Result<Outcome, RuntimeError> {
        let user_id = command.user_id;
        let step = apply(&self.store, &self.notifier, &command, Utc::now())?;
        self.run_timer_effects(user_id, step.timer_effects);
        Ok(step.outcome)
    }

    /// Expire a countdown. The handle is removed before the transition runs.
    fn handle_fired(&mut self, fired: TimerFired) -> Result<Option<Outcome>, RuntimeError> {
        let Some(user_id) = self.timers.claim(fired) else {
            return Ok(None);
        };
        tracing::info!(user_id = %user_id, "Interval elapsed");
        self.handle_command(Command::new(user_id, Trigger::TimerFired))
            .map(Some)
    }

    fn run_timer_effects(&mut self, user_id: UserId, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartTimer { duration } => self.timers.start_timer(user_id, duration),
                Effect::CancelTimer => {
                    self.timers.cancel_timer(user_id);
                }
                Effect::Notify(_) => {}
            }
        }
    }

    #[allow(dead_code)] // Used in tests
    pub fn timers(&self) -> &TimerEngine {
        &self.timers
    }
}

/// Load (or lazily create) the record, run the pure transition, persist
/// under a state guard, and deliver notices. Timer effects are handed back
/// to the caller, which owns the engine.
fn apply<S: UserStore, N: Notifier>(
    store: &S,
    notifier: &N,
    command: &Command,
    now: DateTime<Utc>,
) -> Result<Step, RuntimeError> {
    let user_id = command.user_id;
    let record = match store.get_user(user_id)? {
        Some(record) => record,
        None => {
            tracing::info!(user_id = %user_id, "Creating user");
            store.upsert_user(user_id, &UserUpdate::default())?
        }
    };

    let result = match transition(&record, command.trigger, now) {
        Ok(result) => result,
        Err(e) => {
            tracing::debug!(user_id = %user_id, error = %e, "Trigger ignored");
            return Ok(Step::rejected(e));
        }
    };

    let outcome = match &result.update {
        Some(update) => match store.compare_and_set(user_id, record.state, update)? {
            WriteOutcome::Applied(updated) => {
                tracing::info!(
                    user_id = %user_id,
                    trigger = command.trigger.name(),
                    from = %record.state,
                    to = %updated.state,
                    "State transition"
                );
                Outcome::Applied(updated)
            }
            WriteOutcome::Rejected(current) => {
                return Ok(Step::rejected(TransitionError::WrongState {
                    trigger: command.trigger.name(),
                    state: current.state,
                }));
            }
        },
        None => Outcome::Unchanged,
    };

    let mut timer_effects = Vec::new();
    for effect in result.effects {
        match effect {
            Effect::Notify(notice) => notifier.notify(Delivery {
                user_id,
                notice,
                edit_message: command.origin_message,
            }),
            timer => timer_effects.push(timer),
        }
    }

    Ok(Step {
        outcome,
        timer_effects,
    })
}
