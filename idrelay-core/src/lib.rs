//! # idrelay-core
//!
//! Tracks short-lived identity verification requests and notifies observers,
//! exactly once, when a request is resolved or times out.
//!
//! ## Components
//!
//! - [`store`]: the [`RequestStore`] holding request lifecycle state, with
//!   TTL based expiry and eviction driven by the [`sweeper`].
//! - [`subscription`]: the [`SubscriptionRegistry`] of cancellable recurring
//!   tasks, one per observer subscription.
//! - [`scheduler`]: the [`PollingScheduler`] running those tasks against the
//!   store and handing resolved requests to a [`NotificationSink`].
//! - [`dispatch`]: typed session events (subscribe, unsubscribe, disconnect)
//!   coming from a transport.
//! - [`service`]: the [`IdentityService`] facade wiring it all together.
//!
//! ## Subscription lifecycle
//!
//! ```text
//! subscribe ──▶ registry.put ──▶ poll every interval ──▶ deliver ──▶ self-removal
//!                    ▲                   │
//!  unsubscribe / disconnect ── remove ───┘ (cancel, or defer while a tick runs)
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod scheduler;
pub mod service;
pub mod sink;
pub mod store;
pub mod subscription;
pub mod sweeper;

// Re-exports
pub use error::*;
pub use scheduler::PollingScheduler;
pub use service::IdentityService;
pub use sink::NotificationSink;
pub use store::RequestStore;
pub use subscription::SubscriptionRegistry;
