//! JSON frames exchanged over the WebSocket session endpoint.

use std::collections::HashMap;

use idrelay_core::store::RequestState;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Frames sent by clients.
///
/// ```json
/// {"type": "subscribe", "id": "sub-0", "destination": "/user/queue/requestResolved", "identityRequestId": "..."}
/// {"type": "unsubscribe", "id": "sub-0"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe {
        id: String,
        destination: String,
        #[serde(rename = "identityRequestId", default)]
        identity_request_id: Option<String>,
    },
    Unsubscribe {
        id: String,
    },
}

/// Notification pushed to an observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MessageFrame {
    pub destination: String,
    pub headers: HashMap<String, String>,
    pub payload: RequestState,
}

/// Sent back when a client frame could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorFrame {
    pub error: String,
}
