//! # Identity Service
//!
//! Wires the request store, the subscription registry, the polling scheduler
//! and the sweeper together behind the operations transports call into.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use idrelay_core::{config::IdentityConfig, service::IdentityService, sink::ChannelSink};
//! # async fn example() {
//! let (sink, _notifications) = ChannelSink::new();
//! let service = IdentityService::new(
//!     &IdentityConfig::default(),
//!     Arc::new(sink),
//!     tokio::runtime::Handle::current(),
//! );
//! service.start().await;
//!
//! let request = service.create_request();
//! service.complete_request(&request.id, "alice").unwrap();
//! # }
//! ```

use std::sync::Arc;

use tokio::{
    runtime::Handle,
    sync::Mutex,
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::{
    config::IdentityConfig,
    dispatch::{DispatchOutcome, DispatchResult, SessionDispatcher, SessionEvent},
    scheduler::PollingScheduler,
    sink::NotificationSink,
    store::{IdentityRequest, RequestState, RequestStore, Resolution, StoreResult},
    subscription::{RemovalSummary, SubscriptionKey, SubscriptionRegistry, TaskId},
    sweeper::{Sweeper, SweeperStatus},
};

pub struct IdentityService {
    store: Arc<RequestStore>,
    registry: Arc<SubscriptionRegistry>,
    scheduler: Arc<PollingScheduler>,
    dispatcher: SessionDispatcher,
    sweeper: Arc<Sweeper>,
    sweeper_task: Mutex<Option<JoinHandle<()>>>,
    runtime: Handle,
}

impl IdentityService {
    /// Builds the service; polling tasks and the sweeper run on `runtime`.
    pub fn new(config: &IdentityConfig, sink: Arc<dyn NotificationSink>, runtime: Handle) -> Self {
        let store = Arc::new(RequestStore::new(&config.requests));
        let registry = Arc::new(SubscriptionRegistry::new());
        let scheduler = Arc::new(PollingScheduler::new(
            store.clone(),
            registry.clone(),
            sink,
            &config.polling,
            runtime.clone(),
        ));
        let sweeper = Arc::new(Sweeper::new(store.clone(), config.requests.sweep_interval));

        Self {
            dispatcher: SessionDispatcher::new(scheduler.clone()),
            store,
            registry,
            scheduler,
            sweeper,
            sweeper_task: Mutex::new(None),
            runtime,
        }
    }

    /// Starts the periodic sweep. Calling it again while running is a no-op.
    pub async fn start(&self) {
        let mut sweeper_task = self.sweeper_task.lock().await;
        if sweeper_task.is_some() {
            return;
        }
        let sweeper = self.sweeper.clone();
        *sweeper_task = Some(self.runtime.spawn(async move { sweeper.start().await }));
        info!("Identity service started");
    }

    /// Stops the sweep and cancels every subscription.
    pub async fn shutdown(&self) -> RemovalSummary {
        if let Some(handle) = self.sweeper_task.lock().await.take() {
            self.sweeper.stop();
            if let Err(e) = handle.await {
                warn!("Sweeper task ended abnormally: {}", e);
            }
        }
        let summary = self.registry.clear();
        info!(
            "Identity service stopped, {} subscriptions cancelled, {} already done, {} finishing",
            summary.removed, summary.finished, summary.deferred
        );
        summary
    }

    pub fn create_request(&self) -> IdentityRequest {
        self.store.create()
    }

    pub fn resolve_request(
        &self,
        id: &str,
        resolution: Resolution,
        principal: impl Into<String>,
    ) -> StoreResult<RequestState> {
        self.store.resolve(id, resolution, principal)
    }

    pub fn complete_request(&self, id: &str, principal: impl Into<String>) -> StoreResult<RequestState> {
        self.store.complete(id, principal)
    }

    pub fn reject_request(&self, id: &str, principal: impl Into<String>) -> StoreResult<RequestState> {
        self.store.reject(id, principal)
    }

    pub fn query_state(&self, id: &str) -> StoreResult<RequestState> {
        self.store.state(id)
    }

    pub fn subscribe(&self, key: SubscriptionKey) -> TaskId {
        self.scheduler.schedule(key)
    }

    pub fn unsubscribe<F>(&self, predicate: F) -> RemovalSummary
    where
        F: Fn(&SubscriptionKey) -> bool,
    {
        self.registry.remove_matching(predicate)
    }

    pub fn dispatch(&self, event: SessionEvent) -> DispatchResult<DispatchOutcome> {
        self.dispatcher.dispatch(event)
    }

    pub async fn sweeper_status(&self) -> SweeperStatus {
        self.sweeper.status().await
    }

    pub fn store(&self) -> &Arc<RequestStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }
}
