//! Observer subscriptions and the recurring tasks bound to them.

pub mod key;
pub mod registry;
pub mod task;

pub use key::SubscriptionKey;
pub use registry::{Removal, RemovalSummary, SubscriptionRegistry};
pub use task::{ScheduledTask, TaskId, TaskState};
