//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the runtime with mock implementations.

use crate::db::{Database, DbResult, UserId, UserRecord, UserState, UserUpdate, WriteOutcome};
use crate::state_machine::Notice;
use std::sync::Arc;

/// Durable per-user state
pub trait UserStore: Send + Sync {
    fn get_user(&self, user_id: UserId) -> DbResult<Option<UserRecord>>;

    /// Create with defaults if absent, else apply the provided fields
    fn upsert_user(&self, user_id: UserId, update: &UserUpdate) -> DbResult<UserRecord>;

    /// Apply `update` only if the user is currently in `expected`
    fn compare_and_set(
        &self,
        user_id: UserId,
        expected: UserState,
        update: &UserUpdate,
    ) -> DbResult<WriteOutcome>;

    fn list_users_in_state(&self, state: UserState) -> DbResult<Vec<UserRecord>>;
}

/// A notice addressed to one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub user_id: UserId,
    pub notice: Notice,
    /// Message to edit in place instead of sending a new one
    pub edit_message: Option<i32>,
}

/// Outbound notifications. Fire-and-forget: implementations must not block
/// and report their own delivery failures.
pub trait Notifier: Send + Sync {
    fn notify(&self, delivery: Delivery);
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

impl<T: UserStore + ?Sized> UserStore for Arc<T> {
    fn get_user(&self, user_id: UserId) -> DbResult<Option<UserRecord>> {
        (**self).get_user(user_id)
    }

    fn upsert_user(&self, user_id: UserId, update: &UserUpdate) -> DbResult<UserRecord> {
        (**self).upsert_user(user_id, update)
    }

    fn compare_and_set(
        &self,
        user_id: UserId,
        expected: UserState,
        update: &UserUpdate,
    ) -> DbResult<WriteOutcome> {
        (**self).compare_and_set(user_id, expected, update)
    }

    fn list_users_in_state(&self, state: UserState) -> DbResult<Vec<UserRecord>> {
        (**self).list_users_in_state(state)
    }
}

impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    fn notify(&self, delivery: Delivery) {
        (**self).notify(delivery);
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

impl UserStore for Database {
    fn get_user(&self, user_id: UserId) -> DbResult<Option<UserRecord>> {
        Database::get_user(self, user_id)
    }

    fn upsert_user(&self, user_id: UserId, update: &UserUpdate) -> DbResult<UserRecord> {
        Database::upsert_user(self, user_id, update)
    }

    fn compare_and_set(
        &self,
        user_id: UserId,
        expected: UserState,
        update: &UserUpdate,
    ) -> DbResult<WriteOutcome> {
        Database::compare_and_set(self, user_id, expected, update)
    }

    fn list_users_in_state(&self, state: UserState) -> DbResult<Vec<UserRecord>> {
        Database::list_users_in_state(self, state)
    }
}
