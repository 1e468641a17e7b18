//! Mock implementations for testing
//!
//! These mocks enable runtime testing without a chat transport.

use super::traits::*;
use crate::db::{DbError, DbResult, UserId, UserRecord, UserState, UserUpdate, WriteOutcome};
use crate::state_machine::Notice;
use std::sync::Mutex;

// ============================================================================
// Mock Notifier
// ============================================================================

/// Notifier that records every delivery
#[derive(Default)]
pub struct MockNotifier {
    deliveries: Mutex<Vec<Delivery>>,
}

impl MockNotifier {
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn notices_for(&self, user_id: UserId) -> Vec<Notice> {
        self.deliveries()
            .into_iter()
            .filter(|d| d.user_id == user_id)
            .map(|d| d.notice)
            .collect()
    }

    pub fn count(&self, notice: Notice) -> usize {
        self.deliveries()
            .iter()
            .filter(|d| d.notice == notice)
            .count()
    }
}

impl Notifier for MockNotifier {
    fn notify(&self, delivery: Delivery) {
        self.deliveries.lock().unwrap().push(delivery);
    }
}

// ============================================================================
// Failing Store
// ============================================================================

/// Store whose backend is unreachable
pub struct FailingStore;

fn unavailable() -> DbError {
    DbError::Sqlite(rusqlite::Error::InvalidQuery)
}

impl UserStore for FailingStore {
    fn get_user(&self, _user_id: UserId) -> DbResult<Option<UserRecord>> {
        Err(unavailable())
    }

    fn upsert_user(&self, _user_id: UserId, _update: &UserUpdate) -> DbResult<UserRecord> {
        Err(unavailable())
    }

    fn compare_and_set(
        &self,
        _user_id: UserId,
        _expected: UserState,
        _update: &UserUpdate,
    ) -> DbResult<WriteOutcome> {
        Err(unavailable())
    }

    fn list_users_in_state(&self, _state: UserState) -> DbResult<Vec<UserRecord>> {
        Err(unavailable())
    }
}

// ============================================================================
// Runtime Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::runtime::{Command, Outcome, PacerRuntime, RuntimeError, RuntimeHandle};
    use crate::state_machine::{TransitionError, Trigger};
    use chrono::{TimeDelta, Utc};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::{timeout, Instant};

    const USER: UserId = UserId(100);
    const MINUTE: Duration = Duration::from_secs(60);

    type TestRuntime = PacerRuntime<Database, Arc<MockNotifier>>;

    fn setup() -> (TestRuntime, RuntimeHandle, Database, Arc<MockNotifier>) {
        let db = Database::open_in_memory().unwrap();
        let notifier = Arc::new(MockNotifier::default());
        let (runtime, handle) = PacerRuntime::new(db.clone(), notifier.clone());
        (runtime, handle, db, notifier)
    }

    /// Submit through the handle and let the loop process it
    async fn send(runtime: &mut TestRuntime, handle: &RuntimeHandle, trigger: Trigger) {
        handle
            .send(Command::new(USER, trigger).with_origin(7))
            .await
            .unwrap();
        assert!(runtime.step().await);
    }

    fn seed_in_interval(db: &Database, user_id: UserId, minutes: u32, ago: i64) {
        db.upsert_user(
            user_id,
            &UserUpdate {
                state: Some(UserState::InInterval),
                interval_minutes: Some(minutes),
                last_event_at: Some(Utc::now() - TimeDelta::minutes(ago)),
            },
        )
        .unwrap();
    }

    /// Idle user with a schedule, ready to act
    async fn scheduled(runtime: &mut TestRuntime, handle: &RuntimeHandle, minutes: u32) {
        send(runtime, handle, Trigger::OpenSchedule).await;
        send(runtime, handle, Trigger::ChooseInterval { minutes }).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_interval_cycle() {
        let (mut runtime, handle, db, notifier) = setup();

        scheduled(&mut runtime, &handle, 45).await;
        let user = db.get_user(USER).unwrap().unwrap();
        assert_eq!(user.state, UserState::CanAct);
        assert_eq!(user.interval_minutes, Some(45));

        let recorded_at = Utc::now();
        send(&mut runtime, &handle, Trigger::RecordEvent).await;
        let user = db.get_user(USER).unwrap().unwrap();
        assert_eq!(user.state, UserState::InInterval);
        assert!(user.last_event_at.is_some());
        assert_eq!(runtime.timers().active_count(), 1);
        let fire_at = runtime.timers().fire_at(USER).unwrap();
        assert!((fire_at - (recorded_at + TimeDelta::minutes(45))).abs() < TimeDelta::seconds(5));

        // Nothing queued: the loop sleeps until the countdown elapses
        let start = Instant::now();
        assert!(runtime.step().await);
        assert!(start.elapsed() >= 45 * MINUTE);

        let user = db.get_user(USER).unwrap().unwrap();
        assert_eq!(user.state, UserState::CanAct);
        assert_eq!(runtime.timers().active_count(), 0);
        assert_eq!(notifier.count(Notice::IntervalElapsed), 1);

        // Expiry is a fresh message, not an edit
        let last = notifier.deliveries().pop().unwrap();
        assert_eq!(last.notice, Notice::IntervalElapsed);
        assert_eq!(last.edit_message, None);

        assert_eq!(
            notifier.notices_for(USER),
            vec![
                Notice::ChooseInterval,
                Notice::IntervalSet { minutes: 45 },
                Notice::EventRecorded { minutes: 45 },
                Notice::IntervalElapsed,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_countdown() {
        let (mut runtime, handle, db, notifier) = setup();
        scheduled(&mut runtime, &handle, 30).await;
        send(&mut runtime, &handle, Trigger::RecordEvent).await;
        assert!(runtime.timers().is_active(USER));

        send(&mut runtime, &handle, Trigger::Stop).await;
        assert_eq!(db.get_user(USER).unwrap().unwrap().state, UserState::Idle);
        assert_eq!(runtime.timers().active_count(), 0);

        // Well past the first deadline, nothing fires
        assert!(timeout(2 * 30 * MINUTE, runtime.step()).await.is_err());
        assert_eq!(notifier.count(Notice::IntervalElapsed), 0);
        assert_eq!(notifier.count(Notice::ScheduleStopped), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_from_can_act() {
        let (mut runtime, handle, db, _notifier) = setup();
        scheduled(&mut runtime, &handle, 30).await;

        send(&mut runtime, &handle, Trigger::Stop).await;
        let user = db.get_user(USER).unwrap().unwrap();
        assert_eq!(user.state, UserState::Idle);
        // Interval survives for the next "start the day"
        assert_eq!(user.interval_minutes, Some(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_done_then_start_new_day() {
        let (mut runtime, handle, db, notifier) = setup();
        scheduled(&mut runtime, &handle, 60).await;

        send(&mut runtime, &handle, Trigger::MarkDone).await;
        assert_eq!(db.get_user(USER).unwrap().unwrap().state, UserState::Idle);

        send(&mut runtime, &handle, Trigger::StartDay).await;
        assert_eq!(db.get_user(USER).unwrap().unwrap().state, UserState::CanAct);
        assert_eq!(notifier.count(Notice::DayDone), 1);
        assert_eq!(notifier.count(Notice::DayStarted { minutes: 60 }), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_tap_is_a_noop() {
        let (mut runtime, _handle, db, notifier) = setup();
        runtime
            .handle_command(Command::new(USER, Trigger::OpenSchedule))
            .unwrap();
        runtime
            .handle_command(Command::new(USER, Trigger::ChooseInterval { minutes: 30 }))
            .unwrap();

        let first = runtime
            .handle_command(Command::new(USER, Trigger::RecordEvent))
            .unwrap();
        assert!(matches!(first, Outcome::Applied(_)));
        let after_first = db.get_user(USER).unwrap().unwrap();

        let second = runtime
            .handle_command(Command::new(USER, Trigger::RecordEvent))
            .unwrap();
        assert_eq!(
            second,
            Outcome::Rejected(TransitionError::WrongState {
                trigger: "record_event",
                state: UserState::InInterval,
            })
        );

        assert_eq!(db.get_user(USER).unwrap().unwrap(), after_first);
        assert_eq!(runtime.timers().active_count(), 1);
        assert_eq!(notifier.count(Notice::EventRecorded { minutes: 30 }), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_day_while_active_is_unchanged() {
        let (mut runtime, _handle, db, notifier) = setup();
        runtime
            .handle_command(Command::new(USER, Trigger::OpenSchedule))
            .unwrap();
        runtime
            .handle_command(Command::new(USER, Trigger::ChooseInterval { minutes: 30 }))
            .unwrap();
        let before = db.get_user(USER).unwrap().unwrap();
        let delivered = notifier.deliveries().len();

        let outcome = runtime
            .handle_command(Command::new(USER, Trigger::StartDay))
            .unwrap();

        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(db.get_user(USER).unwrap().unwrap(), before);
        assert_eq!(notifier.deliveries().len(), delivered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_contact_creates_idle_user() {
        let (mut runtime, _handle, db, notifier) = setup();
        assert!(db.get_user(USER).unwrap().is_none());

        let outcome = runtime
            .handle_command(Command::new(USER, Trigger::ShowMenu))
            .unwrap();

        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(db.get_user(USER).unwrap().unwrap().state, UserState::Idle);
        assert_eq!(
            notifier.notices_for(USER),
            vec![Notice::Menu {
                state: UserState::Idle,
                interval_minutes: None,
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_overdue_fires_immediately() {
        let (mut runtime, _handle, db, notifier) = setup();
        seed_in_interval(&db, USER, 30, 40);

        let summary = runtime.resume_in_flight().unwrap();

        assert_eq!(summary.overdue, 1);
        assert_eq!(db.get_user(USER).unwrap().unwrap().state, UserState::CanAct);
        assert_eq!(notifier.count(Notice::IntervalElapsed), 1);
        assert_eq!(runtime.timers().active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_rearms_remaining() {
        let (mut runtime, _handle, db, notifier) = setup();
        seed_in_interval(&db, USER, 30, 10);
        let now = Utc::now();

        let summary = runtime.resume_in_flight().unwrap();
        assert_eq!(summary.rearmed, 1);
        assert!(notifier.deliveries().is_empty());

        let fire_at = runtime.timers().fire_at(USER).unwrap();
        assert!((fire_at - (now + TimeDelta::minutes(20))).abs() < TimeDelta::seconds(5));

        // Not before the remaining interval...
        assert!(timeout(19 * MINUTE, runtime.step()).await.is_err());
        assert_eq!(db.get_user(USER).unwrap().unwrap().state, UserState::InInterval);

        // ...but shortly after
        assert!(runtime.step().await);
        assert_eq!(db.get_user(USER).unwrap().unwrap().state, UserState::CanAct);
        assert_eq!(notifier.count(Notice::IntervalElapsed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_only_touches_in_interval_users() {
        let (mut runtime, _handle, db, notifier) = setup();
        db.upsert_user(
            UserId(1),
            &UserUpdate {
                state: Some(UserState::CanAct),
                interval_minutes: Some(30),
                last_event_at: Some(Utc::now() - TimeDelta::minutes(90)),
            },
        )
        .unwrap();
        seed_in_interval(&db, UserId(2), 30, 5);

        runtime.resume_in_flight().unwrap();

        assert!(!runtime.timers().is_active(UserId(1)));
        assert!(runtime.timers().is_active(UserId(2)));
        assert!(notifier.deliveries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_from_disk_resumes_countdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pacer.db");
        let recorded_at = Utc::now();

        {
            let db = Database::open(&path).unwrap();
            let (mut runtime, _handle) =
                PacerRuntime::new(db, Arc::new(MockNotifier::default()));
            runtime
                .handle_command(Command::new(USER, Trigger::OpenSchedule))
                .unwrap();
            runtime
                .handle_command(Command::new(USER, Trigger::ChooseInterval { minutes: 45 }))
                .unwrap();
            runtime
                .handle_command(Command::new(USER, Trigger::RecordEvent))
                .unwrap();
            // Process dies with the countdown in memory
        }

        let db = Database::open(&path).unwrap();
        let notifier = Arc::new(MockNotifier::default());
        let (mut runtime, _handle) = PacerRuntime::new(db, notifier.clone());
        let summary = runtime.resume_in_flight().unwrap();

        assert_eq!(summary.rearmed, 1);
        let fire_at = runtime.timers().fire_at(USER).unwrap();
        assert!((fire_at - (recorded_at + TimeDelta::minutes(45))).abs() < TimeDelta::seconds(5));
        assert!(notifier.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_storage_aborts_resume() {
        let (mut runtime, _handle) =
            PacerRuntime::new(FailingStore, Arc::new(MockNotifier::default()));
        let result = runtime.resume_in_flight();
        assert!(matches!(result, Err(RuntimeError::Storage(_))));
    }

    #[tokio::test]
    async fn test_storage_error_does_not_stop_loop() {
        let notifier = Arc::new(MockNotifier::default());
        let (mut runtime, handle) = PacerRuntime::new(FailingStore, notifier.clone());

        handle.send(Command::new(USER, Trigger::ShowMenu)).await.unwrap();
        assert!(runtime.step().await);
        assert!(notifier.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_run_exits_when_handles_dropped() {
        let (runtime, handle) = PacerRuntime::new(
            Database::open_in_memory().unwrap(),
            Arc::new(MockNotifier::default()),
        );
        let task = tokio::spawn(runtime.run());
        let probe = handle.clone();
        drop(handle);
        drop(probe);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_after_stop_fails() {
        let (runtime, handle) = PacerRuntime::new(
            Database::open_in_memory().unwrap(),
            Arc::new(MockNotifier::default()),
        );
        drop(runtime);
        let result = handle.send(Command::new(USER, Trigger::ShowMenu)).await;
        assert!(matches!(result, Err(RuntimeError::Stopped)));
    }
}
