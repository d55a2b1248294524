//! # Session Dispatcher
//!
//! Translates typed session lifecycle events coming from a transport into
//! scheduler and registry operations. Events are matched on structured
//! fields only; the transport is responsible for turning its own frames into
//! [`SessionEvent`]s.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::{
    scheduler::PollingScheduler,
    sink::RESOLVED_REQUEST_QUEUE,
    subscription::{RemovalSummary, SubscriptionKey, TaskId},
};

/// Prefix under which per-user destinations are addressed.
pub const USER_DESTINATION_PREFIX: &str = "/user";

/// Whether `destination` is the per-user resolved-request queue.
pub fn is_resolution_destination(destination: &str) -> bool {
    destination
        .strip_suffix(RESOLVED_REQUEST_QUEUE)
        .is_some_and(|prefix| prefix.ends_with(USER_DESTINATION_PREFIX))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Subscribe {
        connection_id: String,
        subscription_id: String,
        destination: String,
        request_id: Option<String>,
        observer: Option<String>,
    },
    Unsubscribe {
        connection_id: String,
        subscription_id: String,
    },
    Disconnect {
        connection_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Subscribed { task_id: TaskId },
    Removed(RemovalSummary),
    /// The event does not concern resolved-request notifications.
    Ignored,
}

pub struct SessionDispatcher {
    scheduler: Arc<PollingScheduler>,
}

impl SessionDispatcher {
    pub fn new(scheduler: Arc<PollingScheduler>) -> Self {
        Self { scheduler }
    }

    /// Applies one session event.
    ///
    /// A subscribe event is fully validated before anything is registered,
    /// so a rejected event leaves the registry untouched.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn dispatch(&self, event: SessionEvent) -> DispatchResult<DispatchOutcome> {
        match event {
            SessionEvent::Subscribe {
                connection_id,
                subscription_id,
                destination,
                request_id,
                observer,
            } => {
                if !is_resolution_destination(&destination) {
                    return Ok(DispatchOutcome::Ignored);
                }
                let key = SubscriptionKey::new(
                    required("connection_id", Some(connection_id))?,
                    required("subscription_id", Some(subscription_id))?,
                    required("identityRequestId", request_id)?,
                    required("observer", observer)?,
                );
                debug!(
                    "Adding listener {} to request resolved status for connection {}",
                    key.subscription_id, key.connection_id
                );
                let task_id = self.scheduler.schedule(key);
                Ok(DispatchOutcome::Subscribed { task_id })
            }
            SessionEvent::Unsubscribe {
                connection_id,
                subscription_id,
            } => {
                debug!(
                    "Removing listener {} to request resolved status for connection {}",
                    subscription_id, connection_id
                );
                let summary = self
                    .scheduler
                    .registry()
                    .remove_matching(|key| key.matches_subscription(&connection_id, &subscription_id));
                Ok(DispatchOutcome::Removed(summary))
            }
            SessionEvent::Disconnect { connection_id } => {
                debug!(
                    "Removing listeners for request resolved status for connection {}",
                    connection_id
                );
                let summary = self
                    .scheduler
                    .registry()
                    .remove_matching(|key| key.belongs_to_connection(&connection_id));
                Ok(DispatchOutcome::Removed(summary))
            }
        }
    }
}

fn required(field: &'static str, value: Option<String>) -> DispatchResult<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(DispatchError::MissingField { field }),
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Could not subscribe to /queue/requestResolved: missing {field}")]
    MissingField { field: &'static str },
}

pub type DispatchResult<T> = Result<T, DispatchError>;
