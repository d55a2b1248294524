//! Cooperative cancellation state of a recurring poll.
//!
//! ```text
//! Scheduled ──begin_run──▶ Running ──finish_run──▶ Scheduled
//!     │                       │
//!   cancel                 complete
//!     ▼                       ▼
//! Cancelled               Completed
//! ```
//!
//! `cancel` only succeeds from `Scheduled`. On a `Running` task it leaves a
//! request behind that `finish_run` honours once the current tick is over.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tokio::sync::Notify;

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum TaskState {
    Scheduled,
    Running,
    Cancelled,
    Completed,
}

const SCHEDULED: u8 = 0;
const RUNNING: u8 = 1;
const CANCELLED: u8 = 2;
const COMPLETED: u8 = 3;

impl TaskState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            SCHEDULED => TaskState::Scheduled,
            RUNNING => TaskState::Running,
            CANCELLED => TaskState::Cancelled,
            _ => TaskState::Completed,
        }
    }
}

/// Handle of the recurring poll bound to one subscription.
#[derive(Debug)]
pub struct ScheduledTask {
    id: TaskId,
    state: AtomicU8,
    cancel_requested: AtomicBool,
    wake: Notify,
}

impl ScheduledTask {
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            state: AtomicU8::new(SCHEDULED),
            cancel_requested: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_raw(self.state.load(Ordering::SeqCst))
    }

    /// Completed or cancelled; the task will never tick again.
    pub fn is_finished(&self) -> bool {
        matches!(self.state(), TaskState::Cancelled | TaskState::Completed)
    }

    /// Asks the task to stop.
    ///
    /// Returns `true` when the task was waiting for its next tick and is now
    /// `Cancelled`. A running tick cannot be interrupted: the request is
    /// recorded and `false` is returned.
    pub fn cancel(&self) -> bool {
        // Must be visible before the state is read, see `finish_run`.
        self.cancel_requested.store(true, Ordering::SeqCst);
        if self.transition(SCHEDULED, CANCELLED) {
            self.wake.notify_one();
            true
        } else {
            false
        }
    }

    pub(crate) fn begin_run(&self) -> bool {
        self.transition(SCHEDULED, RUNNING)
    }

    /// Ends a tick that did not fire. Returns whether the task keeps going.
    pub(crate) fn finish_run(&self) -> bool {
        if !self.transition(RUNNING, SCHEDULED) {
            return false;
        }
        if self.cancel_requested.load(Ordering::SeqCst) {
            // Either we or a concurrent `cancel` moves it to Cancelled.
            self.transition(SCHEDULED, CANCELLED);
            return false;
        }
        true
    }

    pub(crate) fn complete(&self) {
        self.state.store(COMPLETED, Ordering::SeqCst);
    }

    /// Resolves once a waiting task has been cancelled.
    pub(crate) async fn cancelled(&self) {
        self.wake.notified().await
    }

    fn transition(&self, from: u8, to: u8) -> bool {
        self.state
            .compare_exchange(from, to, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cancel_scheduled_task() {
        let task = ScheduledTask::new(1);
        assert_eq!(task.state(), TaskState::Scheduled);
        assert!(task.cancel());
        assert_eq!(task.state(), TaskState::Cancelled);
        assert!(task.is_finished());
        assert!(!task.begin_run());
    }

    #[test]
    fn test_cancel_running_task_is_deferred() {
        let task = ScheduledTask::new(1);
        assert!(task.begin_run());
        assert!(!task.cancel());
        assert_eq!(task.state(), TaskState::Running);
        assert!(!task.is_finished());

        // The tick ends and honours the pending request.
        assert!(!task.finish_run());
        assert_eq!(task.state(), TaskState::Cancelled);
    }

    #[test]
    fn test_running_task_may_still_complete_after_cancel_request() {
        let task = ScheduledTask::new(1);
        assert!(task.begin_run());
        assert!(!task.cancel());
        task.complete();
        assert_eq!(task.state(), TaskState::Completed);
        assert!(!task.cancel());
    }

    #[test]
    fn test_tick_cycle() {
        let task = ScheduledTask::new(7);
        for _ in 0..3 {
            assert!(task.begin_run());
            assert_eq!(task.state(), TaskState::Running);
            assert!(task.finish_run());
            assert_eq!(task.state(), TaskState::Scheduled);
        }
        assert_eq!(task.id(), 7);
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let task = std::sync::Arc::new(ScheduledTask::new(1));
        let waiter = {
            let task = task.clone();
            tokio::spawn(async move { task.cancelled().await })
        };
        tokio::task::yield_now().await;
        assert!(task.cancel());
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_concurrent_cancel_and_tick_never_leaves_task_scheduled() {
        for _ in 0..500 {
            let task = std::sync::Arc::new(ScheduledTask::new(1));
            assert!(task.begin_run());
            let canceller = {
                let task = task.clone();
                std::thread::spawn(move || task.cancel())
            };
            let keeps_going = task.finish_run();
            let cancelled = canceller.join().unwrap();

            // A task that keeps going was cancelled while waiting, and will be woken.
            assert!(!keeps_going || cancelled);
            assert_eq!(task.state(), TaskState::Cancelled);
        }
    }
}
