use serde::{Deserialize, Serialize};
use std::fmt;

/// One observer's interest in one identity request over one session.
///
/// Equality and hashing cover all four fields, so two subscriptions that
/// differ in any of them are tracked independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionKey {
    pub connection_id: String,
    pub subscription_id: String,
    pub request_id: String,
    pub observer: String,
}

impl SubscriptionKey {
    pub fn new(
        connection_id: impl Into<String>,
        subscription_id: impl Into<String>,
        request_id: impl Into<String>,
        observer: impl Into<String>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            subscription_id: subscription_id.into(),
            request_id: request_id.into(),
            observer: observer.into(),
        }
    }

    pub fn belongs_to_connection(&self, connection_id: &str) -> bool {
        self.connection_id == connection_id
    }

    pub fn matches_subscription(&self, connection_id: &str, subscription_id: &str) -> bool {
        self.connection_id == connection_id && self.subscription_id == subscription_id
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.connection_id, self.subscription_id, self.observer, self.request_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_keys_differing_in_any_field_are_distinct() {
        let base = SubscriptionKey::new("c1", "s1", "r1", "bob");
        let variants = [
            SubscriptionKey::new("c2", "s1", "r1", "bob"),
            SubscriptionKey::new("c1", "s2", "r1", "bob"),
            SubscriptionKey::new("c1", "s1", "r2", "bob"),
            SubscriptionKey::new("c1", "s1", "r1", "alice"),
        ];

        let mut set = HashSet::new();
        set.insert(base.clone());
        for variant in variants {
            assert_ne!(base, variant);
            set.insert(variant);
        }
        assert_eq!(set.len(), 5);
        assert!(set.contains(&SubscriptionKey::new("c1", "s1", "r1", "bob")));
    }

    #[test]
    fn test_matching_helpers() {
        let key = SubscriptionKey::new("c1", "s1", "r1", "bob");
        assert!(key.belongs_to_connection("c1"));
        assert!(!key.belongs_to_connection("c2"));
        assert!(key.matches_subscription("c1", "s1"));
        assert!(!key.matches_subscription("c1", "s2"));
        assert!(!key.matches_subscription("c2", "s1"));
    }

    #[test]
    fn test_display() {
        let key = SubscriptionKey::new("c1", "s1", "r1", "bob");
        assert_eq!(key.to_string(), "c1:s1:bob:r1");
    }
}
