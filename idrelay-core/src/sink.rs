//! Outbound delivery of resolved requests to observers.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::store::RequestState;

/// Queue observers subscribe to, relative to their user destination.
pub const RESOLVED_REQUEST_QUEUE: &str = "/queue/requestResolved";

/// Metadata header carrying the id of the delivered request.
pub const IDENTITY_REQUEST_ID_HEADER: &str = "identityRequestId";

/// Delivers a resolved request to one observer.
///
/// Delivery is fire-and-forget: the scheduler makes a single attempt and only
/// logs an error.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(
        &self,
        observer: &str,
        topic: &str,
        payload: &RequestState,
        metadata: &HashMap<String, String>,
    ) -> DeliveryResult<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub observer: String,
    pub topic: String,
    pub payload: RequestState,
    pub metadata: HashMap<String, String>,
}

/// Sink forwarding every notification into an unbounded channel.
#[derive(Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn deliver(
        &self,
        observer: &str,
        topic: &str,
        payload: &RequestState,
        metadata: &HashMap<String, String>,
    ) -> DeliveryResult<()> {
        self.sender
            .send(Notification {
                observer: observer.to_string(),
                topic: topic.to_string(),
                payload: payload.clone(),
                metadata: metadata.clone(),
            })
            .map_err(|_| DeliveryError::ChannelClosed {
                observer: observer.to_string(),
            })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("No open session for observer {observer}")]
    NoRecipient { observer: String },
    #[error("Delivery channel closed for observer {observer}")]
    ChannelClosed { observer: String },
    #[error("Failed to serialize notification: {0}")]
    Serialization(String),
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;
