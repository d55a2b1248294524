pub mod manager;

pub use manager::{ConnectionId, SEND_BUFFER_CAPACITY, SendError, SessionManager, UserId};
