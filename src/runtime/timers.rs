//! Per-user countdowns
//!
//! At most one countdown per user. Each countdown is a tokio task that
//! sleeps and then posts a [`TimerFired`] message back to the runtime; the
//! runtime [`claim`](TimerEngine::claim)s it before running the expiry
//! transition. Generations make cancellation final: a message from a
//! cancelled or replaced countdown is never claimed, even if it was already
//! queued.

use super::recovery::{resume_decision, ResumeDecision};
use crate::db::{UserId, UserRecord};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Posted by a countdown task when it elapses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub user_id: UserId,
    generation: u64,
}

/// Live countdown bookkeeping
#[derive(Debug)]
pub struct TimerHandle {
    pub fire_at: DateTime<Utc>,
    generation: u64,
    cancel: CancellationToken,
}

/// Startup recovery counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResumeSummary {
    pub rearmed: usize,
    pub overdue: usize,
    pub skipped: usize,
}

pub struct TimerEngine {
    timers: HashMap<UserId, TimerHandle>,
    fired_tx: mpsc::UnboundedSender<TimerFired>,
    next_generation: u64,
}

impl TimerEngine {
    pub fn new(fired_tx: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            timers: HashMap::new(),
            fired_tx,
            next_generation: 0,
        }
    }

    /// Engine plus the receiving end of its expiry messages
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        (Self::new(fired_tx), fired_rx)
    }

    /// Replace any countdown for `user_id` with a new one of `duration`.
    ///
    /// Cancel and schedule happen without yielding, so no other code can
    /// observe two live countdowns for the same user.
    pub fn start_timer(&mut self, user_id: UserId, duration: Duration) {
        self.cancel_timer(user_id);

        let generation = self.next_generation;
        self.next_generation += 1;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let fired_tx = self.fired_tx.clone();
        let deadline = Instant::now() + duration;
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep_until(deadline) => {
                    // Receiver gone means the runtime is shutting down
                    let _ = fired_tx.send(TimerFired { user_id, generation });
                }
            }
        });

        let fire_at = TimeDelta::from_std(duration)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        tracing::debug!(user_id = %user_id, fire_at = %fire_at, "Countdown started");
        self.timers.insert(
            user_id,
            TimerHandle {
                fire_at,
                generation,
                cancel,
            },
        );
    }

    /// Revoke the user's countdown. Returns whether one was live.
    pub fn cancel_timer(&mut self, user_id: UserId) -> bool {
        match self.timers.remove(&user_id) {
            Some(handle) => {
                handle.cancel.cancel();
                tracing::debug!(user_id = %user_id, "Countdown cancelled");
                true
            }
            None => false,
        }
    }

    /// Accept an expiry message if it belongs to the live countdown,
    /// removing the handle. Stale messages return `None`.
    pub fn claim(&mut self, fired: TimerFired) -> Option<UserId> {
        match self.timers.get(&fired.user_id) {
            Some(handle) if handle.generation == fired.generation => {
                self.timers.remove(&fired.user_id);
                Some(fired.user_id)
            }
            _ => {
                tracing::debug!(user_id = %fired.user_id, "Dropping stale countdown expiry");
                None
            }
        }
    }

    /// Rebuild countdowns from durable records.
    ///
    /// Overdue users are handed to `on_expiry` synchronously, in listing
    /// order. Records missing an interval or a last event are skipped.
    pub fn resume_timers<F>(
        &mut self,
        records: &[UserRecord],
        now: DateTime<Utc>,
        mut on_expiry: F,
    ) -> ResumeSummary
    where
        F: FnMut(UserId),
    {
        let mut summary = ResumeSummary::default();
        for record in records {
            match resume_decision(record, now) {
                ResumeDecision::Overdue => {
                    summary.overdue += 1;
                    on_expiry(record.id);
                }
                ResumeDecision::Remaining(left) => {
                    summary.rearmed += 1;
                    self.start_timer(record.id, left);
                }
                ResumeDecision::Skip(reason) => {
                    summary.skipped += 1;
                    tracing::warn!(user_id = %record.id, reason = ?reason, "Skipping countdown resume");
                }
            }
        }
        summary
    }

    /// Cancel every countdown (process stop)
    pub fn cancel_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.cancel.cancel();
        }
    }

    #[allow(dead_code)] // Used in tests
    pub fn is_active(&self, user_id: UserId) -> bool {
        self.timers.contains_key(&user_id)
    }

    #[allow(dead_code)] // Used in tests
    pub fn fire_at(&self, user_id: UserId) -> Option<DateTime<Utc>> {
        self.timers.get(&user_id).map(|handle| handle.fire_at)
    }

    #[allow(dead_code)] // Used in tests
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for TimerEngine {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
