//! Countdown recovery logic
//!
//! Decides, from durable fields alone, what an `in_interval` user needs
//! after a restart.

use crate::db::UserRecord;
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// What to do with one record at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeDecision {
    /// The interval elapsed while we were down; expire now
    Overdue,
    /// Re-arm the countdown with what is left
    Remaining(Duration),
    /// Record cannot be resumed
    Skip(SkipReason),
}

/// Why a record was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingInterval,
    MissingLastEvent,
}

/// `remaining = interval - (now - last_event_at)`.
///
/// A last event in the future (wall clock stepped back) never yields more
/// than one full interval.
pub fn resume_decision(record: &UserRecord, now: DateTime<Utc>) -> ResumeDecision {
    let Some(minutes) = record.interval_minutes.filter(|m| *m > 0) else {
        return ResumeDecision::Skip(SkipReason::MissingInterval);
    };
    let Some(last_event_at) = record.last_event_at else {
        return ResumeDecision::Skip(SkipReason::MissingLastEvent);
    };

    let interval = TimeDelta::minutes(i64::from(minutes));
    let remaining = (interval - (now - last_event_at)).min(interval);

    match remaining.to_std() {
        Ok(left) if !left.is_zero() => ResumeDecision::Remaining(left),
        _ => ResumeDecision::Overdue,
    }
}
