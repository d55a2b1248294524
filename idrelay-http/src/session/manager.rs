use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use dashmap::DashMap;
use idrelay_core::{
    dispatch::USER_DESTINATION_PREFIX,
    sink::{DeliveryError, DeliveryResult, NotificationSink},
    store::RequestState,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::models::MessageFrame;

pub type ConnectionId = String;
pub type UserId = String;

/// Frames that may wait on one connection. A connection whose buffer
/// overflows is closed.
pub const SEND_BUFFER_CAPACITY: usize = 256;

/// Why a frame could not be queued on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    UnknownConnection,
    /// The client stopped reading; the connection has been closed.
    BufferFull,
    Closed,
}

/// One open WebSocket connection
struct SessionData {
    user_id: UserId,
    outbound: mpsc::Sender<String>,
    /// Ids of the client's subscriptions to the resolution queue.
    subscriptions: HashSet<String>,
}

/// Tracks open WebSocket connections per user and delivers notifications to
/// them as serialized frames.
#[derive(Clone, Default)]
pub struct SessionManager {
    sessions: Arc<DashMap<ConnectionId, SessionData>>,
    users: Arc<DashMap<UserId, Vec<ConnectionId>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection for `user_id`; frames for it arrive on the
    /// returned receiver.
    pub fn open(&self, user_id: &str) -> (ConnectionId, mpsc::Receiver<String>) {
        let connection_id = uuid::Uuid::new_v4().to_string();
        let (outbound, receiver) = mpsc::channel(SEND_BUFFER_CAPACITY);
        self.sessions.insert(
            connection_id.clone(),
            SessionData {
                user_id: user_id.to_string(),
                outbound,
                subscriptions: HashSet::new(),
            },
        );
        self.users
            .entry(user_id.to_string())
            .or_default()
            .push(connection_id.clone());
        debug!("Opened connection {} for user {}", connection_id, user_id);
        (connection_id, receiver)
    }

    /// Forgets the connection. Its receiver ends once the queued frames are
    /// drained.
    pub fn close(&self, connection_id: &str) -> bool {
        let Some((_, data)) = self.sessions.remove(connection_id) else {
            return false;
        };
        self.users.remove_if_mut(&data.user_id, |_, connections| {
            connections.retain(|id| id != connection_id);
            connections.is_empty()
        });
        debug!("Closed connection {} for user {}", connection_id, data.user_id);
        true
    }

    /// Queues a raw frame on one connection without waiting.
    pub fn send(&self, connection_id: &str, frame: String) -> Result<(), SendError> {
        let result = match self.sessions.get(connection_id) {
            Some(data) => data.outbound.try_send(frame),
            None => return Err(SendError::UnknownConnection),
        };
        match result {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(
                    "Send buffer of connection {} is full, closing it",
                    connection_id
                );
                self.close(connection_id);
                Err(SendError::BufferFull)
            }
            Err(TrySendError::Closed(_)) => Err(SendError::Closed),
        }
    }

    /// Records a resolution-queue subscription made on the connection.
    pub fn track_subscription(&self, connection_id: &str, subscription_id: &str) -> bool {
        self.sessions
            .get_mut(connection_id)
            .is_some_and(|mut data| data.subscriptions.insert(subscription_id.to_string()))
    }

    pub fn untrack_subscription(&self, connection_id: &str, subscription_id: &str) -> bool {
        self.sessions
            .get_mut(connection_id)
            .is_some_and(|mut data| data.subscriptions.remove(subscription_id))
    }

    /// Whether the connection holds at least one resolution-queue subscription.
    pub fn is_subscribed(&self, connection_id: &str) -> bool {
        self.sessions
            .get(connection_id)
            .is_some_and(|data| !data.subscriptions.is_empty())
    }

    pub fn connections(&self, user_id: &str) -> Vec<ConnectionId> {
        self.users
            .get(user_id)
            .map(|connections| connections.clone())
            .unwrap_or_default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[async_trait]
impl NotificationSink for SessionManager {
    /// Sends the frame to every connection of `observer` that subscribed to
    /// the resolution queue.
    async fn deliver(
        &self,
        observer: &str,
        topic: &str,
        payload: &RequestState,
        metadata: &HashMap<String, String>,
    ) -> DeliveryResult<()> {
        let connections: Vec<ConnectionId> = self
            .connections(observer)
            .into_iter()
            .filter(|connection_id| self.is_subscribed(connection_id))
            .collect();
        if connections.is_empty() {
            return Err(DeliveryError::NoRecipient {
                observer: observer.to_string(),
            });
        }

        let frame = MessageFrame {
            destination: format!("{}{}", USER_DESTINATION_PREFIX, topic),
            headers: metadata.clone(),
            payload: payload.clone(),
        };
        let text = serde_json::to_string(&frame)
            .map_err(|e| DeliveryError::Serialization(e.to_string()))?;

        let delivered = connections
            .iter()
            .filter(|connection_id| self.send(connection_id, text.clone()).is_ok())
            .count();
        if delivered == 0 {
            return Err(DeliveryError::ChannelClosed {
                observer: observer.to_string(),
            });
        }
        Ok(())
    }
}
