//! Database module for Pacer
//!
//! Durable per-user state: one row per user, never deleted.

mod schema;

pub use schema::*;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("User not found: {0}")]
    UserNotFound(UserId),
}

pub type DbResult<T> = Result<T, DbError>;

const USER_COLUMNS: &str =
    "user_id, interval_minutes, state, last_event_at, created_at, updated_at";

/// Insert-or-merge. `?2..?4` are optional; NULL leaves the column as is.
/// `updated_at` never moves backwards.
const UPSERT_USER: &str = "
INSERT INTO users (user_id, state, interval_minutes, last_event_at, created_at, updated_at)
VALUES (?1, COALESCE(?2, 'idle'), ?3, ?4, ?5, ?5)
ON CONFLICT(user_id) DO UPDATE SET
    state = COALESCE(?2, state),
    interval_minutes = COALESCE(?3, interval_minutes),
    last_event_at = COALESCE(?4, last_event_at),
    updated_at = MAX(updated_at, ?5)
";

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> DbResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves SQLite consistent; keep serving
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Liveness probe for the health check: the users table must answer
    pub fn ping(&self) -> DbResult<()> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM users", [], |_| Ok(()))?;
        Ok(())
    }

    #[cfg(test)]
    pub fn drop_schema_for_test(&self) {
        self.conn().execute_batch("DROP TABLE users").unwrap();
    }

    // ==================== User Operations ====================

    /// Get user by ID
    pub fn get_user(&self, user_id: UserId) -> DbResult<Option<UserRecord>> {
        select_user(&self.conn(), user_id)
    }

    /// Create the user with defaults if absent, otherwise apply the
    /// provided fields. Returns the resulting record.
    pub fn upsert_user(&self, user_id: UserId, update: &UserUpdate) -> DbResult<UserRecord> {
        let conn = self.conn();
        write_user(&conn, user_id, update)?;
        select_user(&conn, user_id)?.ok_or(DbError::UserNotFound(user_id))
    }

    /// Apply `update` only if the user is currently in `expected`.
    pub fn compare_and_set(
        &self,
        user_id: UserId,
        expected: UserState,
        update: &UserUpdate,
    ) -> DbResult<WriteOutcome> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let current = select_user(&tx, user_id)?.ok_or(DbError::UserNotFound(user_id))?;
        if current.state != expected {
            return Ok(WriteOutcome::Rejected(current));
        }

        write_user(&tx, user_id, update)?;
        let updated = select_user(&tx, user_id)?.ok_or(DbError::UserNotFound(user_id))?;
        tx.commit()?;
        Ok(WriteOutcome::Applied(updated))
    }

    /// Record a consumption event: `can_act` -> `in_interval`, stamping
    /// `last_event_at`. Rejected from any other state.
    #[allow(dead_code)] // API completeness; the runtime goes through `transition`
    pub fn record_event(&self, user_id: UserId, now: DateTime<Utc>) -> DbResult<WriteOutcome> {
        self.compare_and_set(
            user_id,
            UserState::CanAct,
            &UserUpdate {
                state: Some(UserState::InInterval),
                interval_minutes: None,
                last_event_at: Some(now),
            },
        )
    }

    /// All users currently in `state`
    pub fn list_users_in_state(&self, state: UserState) -> DbResult<Vec<UserRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE state = ?1 ORDER BY user_id"
        ))?;
        let users = stmt
            .query_map(params![state], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }
}

fn select_user(conn: &Connection, user_id: UserId) -> DbResult<Option<UserRecord>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
            params![user_id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

fn write_user(conn: &Connection, user_id: UserId, update: &UserUpdate) -> DbResult<()> {
    conn.execute(
        UPSERT_USER,
        params![
            user_id,
            update.state,
            update.interval_minutes,
            update.last_event_at.map(format_timestamp),
            format_timestamp(Utc::now()),
        ],
    )?;
    Ok(())
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    let last_event_at = row
        .get::<_, Option<String>>(3)?
        .map(|s| parse_datetime(3, &s))
        .transpose()?;

    Ok(UserRecord {
        id: row.get(0)?,
        interval_minutes: row.get(1)?,
        state: row.get(2)?,
        last_event_at,
        created_at: parse_datetime(4, &row.get::<_, String>(4)?)?,
        updated_at: parse_datetime(5, &row.get::<_, String>(5)?)?,
    })
}

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically
fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Unreadable timestamps surface as conversion errors, like unknown states
fn parse_datetime(column: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}
