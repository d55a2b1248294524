//! # Subscription Registry
//!
//! Keeps at most one live [`ScheduledTask`] per [`SubscriptionKey`].
//!
//! Every mutation goes through the `DashMap` entry of its key, so `put` and
//! `remove` on the same key are linearizable while unrelated keys never wait
//! on each other. The map itself is private: the only ways to drop an entry
//! are the cancelling `remove` and the task's own `release`.
//!
//! `remove` never drops an entry whose task is still ticking. Such a task is
//! flagged instead and removes itself once the tick is over, so no background
//! work is ever left running without a registry entry pointing at it.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tracing::debug;

use super::key::SubscriptionKey;
use super::task::{ScheduledTask, TaskId, TaskState};

/// Result of removing a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Nothing was registered under the key.
    Absent,
    /// The task was waiting for its next tick; it is now cancelled and the
    /// entry is gone.
    Removed,
    /// The task had already stopped on its own; only the entry was dropped.
    Finished,
    /// The task is mid-tick; it will remove itself when the tick ends.
    Deferred,
}

impl Removal {
    /// The entry is gone, whether or not this call cancelled anything.
    pub fn is_removed(&self) -> bool {
        matches!(self, Removal::Removed | Removal::Finished)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalSummary {
    pub matched: usize,
    /// Tasks cancelled before they could fire.
    pub removed: usize,
    /// Entries of tasks that had already stopped.
    pub finished: usize,
    pub deferred: usize,
}

impl RemovalSummary {
    fn record(&mut self, removal: Removal) {
        match removal {
            Removal::Absent => {}
            Removal::Removed => {
                self.matched += 1;
                self.removed += 1;
            }
            Removal::Finished => {
                self.matched += 1;
                self.finished += 1;
            }
            Removal::Deferred => {
                self.matched += 1;
                self.deferred += 1;
            }
        }
    }
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    tasks: DashMap<SubscriptionKey, Arc<ScheduledTask>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `task` under `key`, cancelling any task it replaces.
    ///
    /// Returns the id of the replaced task.
    #[tracing::instrument(skip(self, task), level = "debug")]
    pub fn put(&self, key: SubscriptionKey, task: Arc<ScheduledTask>) -> Option<TaskId> {
        match self.tasks.entry(key) {
            Entry::Occupied(mut entry) => {
                let previous = entry.insert(task);
                if !previous.cancel() && !previous.is_finished() {
                    debug!(
                        "Replaced task {} for {} is running, it stops after its current tick",
                        previous.id(),
                        entry.key()
                    );
                }
                Some(previous.id())
            }
            Entry::Vacant(entry) => {
                debug!("Adding task {} for {}", task.id(), entry.key());
                entry.insert(task);
                None
            }
        }
    }

    /// Cancels and removes the task registered under `key`.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn remove(&self, key: &SubscriptionKey) -> Removal {
        match self.tasks.entry(key.clone()) {
            Entry::Vacant(_) => Removal::Absent,
            Entry::Occupied(entry) => {
                let task = entry.get();
                if task.is_finished() {
                    debug!("Removing finished task for {}", key);
                    entry.remove();
                    Removal::Finished
                } else if task.cancel() {
                    debug!("Removing canceled task for {}", key);
                    entry.remove();
                    Removal::Removed
                } else {
                    debug!("Task for {} is running, removal deferred", key);
                    Removal::Deferred
                }
            }
        }
    }

    /// Self-removal of a task that has stopped ticking.
    ///
    /// Only drops the entry while it still holds `task_id`, so a task never
    /// removes the replacement registered after it.
    pub(crate) fn release(&self, key: &SubscriptionKey, task_id: TaskId) -> bool {
        let released = self
            .tasks
            .remove_if(key, |_, task| task.id() == task_id)
            .is_some();
        if released {
            debug!("Task {} for {} removed itself", task_id, key);
        }
        released
    }

    /// Removes every key matching `predicate`.
    ///
    /// Works on a snapshot of the key set: keys added during the scan are
    /// not visited and keys that vanish before their turn are skipped.
    pub fn remove_matching<F>(&self, predicate: F) -> RemovalSummary
    where
        F: Fn(&SubscriptionKey) -> bool,
    {
        let matched: Vec<SubscriptionKey> = self
            .tasks
            .iter()
            .filter(|entry| predicate(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut summary = RemovalSummary::default();
        for key in &matched {
            summary.record(self.remove(key));
        }
        summary
    }

    /// Cancels everything; running tasks clean up after their current tick.
    pub fn clear(&self) -> RemovalSummary {
        self.remove_matching(|_| true)
    }

    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.tasks.contains_key(key)
    }

    pub fn task_state(&self, key: &SubscriptionKey) -> Option<TaskState> {
        self.tasks.get(key).map(|task| task.state())
    }

    pub fn keys(&self) -> Vec<SubscriptionKey> {
        self.tasks.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
