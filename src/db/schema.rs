//! Database schema and types

pub use crate::state_machine::{UserId, UserState};
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY,
    interval_minutes INTEGER,
    state TEXT NOT NULL DEFAULT 'idle',
    last_event_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_state ON users(state);
";

/// Durable per-user record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub interval_minutes: Option<u32>,
    pub state: UserState,
    pub last_event_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial field update. Only `Some` fields are written; `updated_at` is
/// always refreshed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub state: Option<UserState>,
    pub interval_minutes: Option<u32>,
    pub last_event_at: Option<DateTime<Utc>>,
}

impl UserUpdate {
    pub fn state(state: UserState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }
}

/// Outcome of a guarded write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Guard held, update persisted
    Applied(UserRecord),
    /// Guard failed, record returned as it currently is
    Rejected(UserRecord),
}

#[allow(dead_code)] // Used in tests
impl WriteOutcome {
    pub fn record(&self) -> &UserRecord {
        match self {
            WriteOutcome::Applied(record) | WriteOutcome::Rejected(record) => record,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, WriteOutcome::Applied(_))
    }
}

impl ToSql for UserId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for UserId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_i64().map(UserId)
    }
}

impl ToSql for UserState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for UserState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
