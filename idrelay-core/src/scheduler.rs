//! # Polling Scheduler
//!
//! Runs one recurring poll per subscription. Each poll reads the bound
//! request from the [`RequestStore`]; once the request is ready according to
//! the [`DeliveryPolicy`], the snapshot is handed to the [`NotificationSink`]
//! exactly once and the task removes its own registry entry.
//!
//! Tasks are spawned on the runtime handle given at construction, which is
//! normally a small dedicated runtime (see `SchedulerConfig`).

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{info, trace, warn};

use crate::{
    Error, InternalResult,
    config::{DeliveryPolicy, PollingConfig, SchedulerConfig},
    sink::{IDENTITY_REQUEST_ID_HEADER, NotificationSink, RESOLVED_REQUEST_QUEUE},
    store::{RequestState, RequestStore},
    subscription::{ScheduledTask, SubscriptionKey, SubscriptionRegistry, TaskId},
};

impl DeliveryPolicy {
    pub fn should_fire(&self, state: &RequestState) -> bool {
        match self {
            DeliveryPolicy::Terminal => state.status.is_terminal(),
            DeliveryPolicy::FirstReadable => true,
        }
    }
}

impl SchedulerConfig {
    /// Builds the dedicated runtime that polling tasks and the sweeper run on.
    pub fn build_runtime(&self) -> InternalResult<Runtime> {
        Builder::new_multi_thread()
            .worker_threads(self.worker_threads.max(1))
            .thread_name(self.thread_name.clone())
            .enable_time()
            .build()
            .map_err(|e| Error::internal(format!("Failed to build scheduler runtime: {}", e)))
    }
}

pub struct PollingScheduler {
    store: Arc<RequestStore>,
    registry: Arc<SubscriptionRegistry>,
    sink: Arc<dyn NotificationSink>,
    config: PollingConfig,
    runtime: Handle,
    next_task_id: AtomicU64,
}

impl PollingScheduler {
    pub fn new(
        store: Arc<RequestStore>,
        registry: Arc<SubscriptionRegistry>,
        sink: Arc<dyn NotificationSink>,
        config: &PollingConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            store,
            registry,
            sink,
            config: config.clone(),
            runtime,
            next_task_id: AtomicU64::new(1),
        }
    }

    /// Starts polling on behalf of `key`, replacing any task already
    /// registered under the same key.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn schedule(&self, key: SubscriptionKey) -> TaskId {
        let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let task = Arc::new(ScheduledTask::new(task_id));

        info!(
            "Starting listening for identity request {} status change, subscription: {}",
            key.request_id, key
        );
        // Registered before spawning so that self-removal always finds the entry.
        self.registry.put(key.clone(), task.clone());

        let poller = Poller {
            key,
            task,
            store: self.store.clone(),
            registry: self.registry.clone(),
            sink: self.sink.clone(),
            policy: self.config.delivery_policy,
            initial_delay: self.config.initial_delay,
            interval: self.config.interval,
        };
        self.runtime.spawn(poller.run());
        task_id
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }
}

enum Tick {
    Pending,
    Delivered,
    Gone,
}

struct Poller {
    key: SubscriptionKey,
    task: Arc<ScheduledTask>,
    store: Arc<RequestStore>,
    registry: Arc<SubscriptionRegistry>,
    sink: Arc<dyn NotificationSink>,
    policy: DeliveryPolicy,
    initial_delay: Duration,
    interval: Duration,
}

impl Poller {
    async fn run(self) {
        let mut delay = self.initial_delay;
        while self.wait(delay).await {
            if !self.task.begin_run() {
                break;
            }
            match self.poll().await {
                Tick::Delivered | Tick::Gone => {
                    self.task.complete();
                    break;
                }
                Tick::Pending => {
                    if !self.task.finish_run() {
                        break;
                    }
                }
            }
            delay = self.interval;
        }
        self.registry.release(&self.key, self.task.id());
    }

    /// Sleeps for `duration`; returns `false` when cancelled meanwhile.
    async fn wait(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.task.cancelled() => false,
        }
    }

    async fn poll(&self) -> Tick {
        let request_id = &self.key.request_id;
        trace!(
            "Reading identity request {} status, subscription: {}",
            request_id, self.key
        );

        let state = match self.store.state(request_id) {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    "Stopping subscription {} without notification: {}",
                    self.key, e
                );
                return Tick::Gone;
            }
        };

        if !self.policy.should_fire(&state) {
            return Tick::Pending;
        }

        info!(
            "Identity request {} resolved with status {} by {:?}, listener removed for subscription {}",
            request_id, state.status, state.principal, self.key
        );
        let metadata = HashMap::from([(IDENTITY_REQUEST_ID_HEADER.to_string(), request_id.clone())]);
        if let Err(e) = self
            .sink
            .deliver(&self.key.observer, RESOLVED_REQUEST_QUEUE, &state, &metadata)
            .await
        {
            warn!(
                "Failed to deliver identity request {} to {}: {}",
                request_id, self.key.observer, e
            );
        }
        Tick::Delivered
    }
}
