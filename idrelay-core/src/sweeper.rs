use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::Utc;
use tokio::{
    sync::{Notify, RwLock},
    time::MissedTickBehavior,
};
use tracing::{debug, warn};

use crate::store::RequestStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweeperStatus {
    Inactive,
    Active,
    Error { message: String },
}

/// Periodically expires and evicts requests in a [`RequestStore`].
pub struct Sweeper {
    store: Arc<RequestStore>,
    interval: Duration,
    status: RwLock<SweeperStatus>,
    running: AtomicBool,
    stop: Notify,
}

impl Sweeper {
    pub fn new(store: Arc<RequestStore>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            status: RwLock::new(SweeperStatus::Inactive),
            running: AtomicBool::new(false),
            stop: Notify::new(),
        }
    }

    pub async fn status(&self) -> SweeperStatus {
        self.status.read().await.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sweeps once right away, then every `interval` until [`Sweeper::stop`].
    pub async fn start(&self) {
        debug!("Sweeper started: every {:?}", self.interval);
        if self.interval.is_zero() {
            let message = "Sweep interval must be greater than 0".to_string();
            warn!("{}", message);
            *self.status.write().await = SweeperStatus::Error { message };
            return;
        }

        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.running.store(true, Ordering::SeqCst);
        *self.status.write().await = SweeperStatus::Active;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.store.sweep(Utc::now());
                }
                _ = self.stop.notified() => break,
            }
        }

        self.running.store(false, Ordering::SeqCst);
        *self.status.write().await = SweeperStatus::Inactive;
        debug!("Sweeper stopped");
    }

    pub fn stop(&self) {
        debug!("Sweeper stopping");
        self.stop.notify_one();
    }
}
