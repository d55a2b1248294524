pub mod identity;
pub mod websocket;
