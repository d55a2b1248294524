use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use pretty_assertions::assert_eq;
use tokio::{
    runtime::Handle,
    sync::mpsc,
    time::{Duration, sleep},
};

use idrelay_core::{
    config::IdentityConfig,
    dispatch::{DispatchError, DispatchOutcome, SessionEvent},
    service::IdentityService,
    sink::{ChannelSink, IDENTITY_REQUEST_ID_HEADER, Notification, RESOLVED_REQUEST_QUEUE},
    store::{RequestStatus, StoreError},
    subscription::SubscriptionKey,
};

const DESTINATION: &str = "/user/queue/requestResolved";

fn service() -> (IdentityService, mpsc::UnboundedReceiver<Notification>) {
    let (sink, notifications) = ChannelSink::new();
    let service = IdentityService::new(&IdentityConfig::default(), Arc::new(sink), Handle::current());
    (service, notifications)
}

fn subscribe_event(connection: &str, subscription: &str, request: &str, observer: &str) -> SessionEvent {
    SessionEvent::Subscribe {
        connection_id: connection.to_string(),
        subscription_id: subscription.to_string(),
        destination: DESTINATION.to_string(),
        request_id: Some(request.to_string()),
        observer: Some(observer.to_string()),
    }
}

fn drain(receiver: &mut mpsc::UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut received = Vec::new();
    while let Ok(notification) = receiver.try_recv() {
        received.push(notification);
    }
    received
}

#[tokio::test(start_paused = true)]
async fn test_rejected_request_is_delivered_once() {
    let (service, mut notifications) = service();
    let request = service.create_request();
    assert_eq!(request.status, RequestStatus::InProgress);

    service
        .dispatch(subscribe_event("c1", "s1", &request.id, "bob"))
        .unwrap();
    assert_eq!(service.registry().len(), 1);

    // Still pending after the first poll.
    sleep(Duration::from_millis(1100)).await;
    assert!(drain(&mut notifications).is_empty());

    service.reject_request(&request.id, "alice").unwrap();
    sleep(Duration::from_millis(600)).await;

    let received = drain(&mut notifications);
    assert_eq!(received.len(), 1);
    let notification = &received[0];
    assert_eq!(notification.observer, "bob");
    assert_eq!(notification.topic, RESOLVED_REQUEST_QUEUE);
    assert_eq!(notification.payload.id, request.id);
    assert_eq!(notification.payload.status, RequestStatus::Rejected);
    assert_eq!(notification.payload.principal.as_deref(), Some("alice"));
    assert_eq!(
        notification.metadata.get(IDENTITY_REQUEST_ID_HEADER),
        Some(&request.id)
    );
    assert!(service.registry().is_empty());

    sleep(Duration::from_secs(5)).await;
    assert!(drain(&mut notifications).is_empty());
}

#[tokio::test]
async fn test_request_expires_then_disappears() {
    let (service, _) = service();
    let request = service.create_request();
    let store = service.store();

    store.sweep(Utc::now() + TimeDelta::minutes(11));
    let state = service.query_state(&request.id).unwrap();
    assert_eq!(state.status, RequestStatus::Expired);
    assert_eq!(state.principal, None);

    store.sweep(Utc::now() + TimeDelta::minutes(61));
    assert!(matches!(
        service.query_state(&request.id),
        Err(StoreError::NotFound { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_expired_request_notifies_subscriber() {
    let (service, mut notifications) = service();
    let request = service.create_request();
    service
        .dispatch(subscribe_event("c1", "s1", &request.id, "bob"))
        .unwrap();

    service.store().sweep(Utc::now() + TimeDelta::minutes(11));
    sleep(Duration::from_millis(1100)).await;

    let received = drain(&mut notifications);
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].payload.status, RequestStatus::Expired);
}

#[tokio::test(start_paused = true)]
async fn test_double_subscribe_keeps_single_task() {
    let (service, mut notifications) = service();
    let request = service.create_request();

    let first = service
        .dispatch(subscribe_event("c1", "s1", &request.id, "bob"))
        .unwrap();
    let second = service
        .dispatch(subscribe_event("c1", "s1", &request.id, "bob"))
        .unwrap();
    assert!(matches!(first, DispatchOutcome::Subscribed { .. }));
    assert!(matches!(second, DispatchOutcome::Subscribed { .. }));
    assert_ne!(first, second);
    assert_eq!(service.registry().len(), 1);

    service.complete_request(&request.id, "alice").unwrap();
    sleep(Duration::from_secs(3)).await;

    assert_eq!(drain(&mut notifications).len(), 1);
    assert!(service.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_before_resolution_suppresses_delivery() {
    let (service, mut notifications) = service();
    let request = service.create_request();
    service
        .dispatch(subscribe_event("c1", "s1", &request.id, "bob"))
        .unwrap();

    let outcome = service
        .dispatch(SessionEvent::Unsubscribe {
            connection_id: "c1".to_string(),
            subscription_id: "s1".to_string(),
        })
        .unwrap();
    assert!(matches!(outcome, DispatchOutcome::Removed(summary) if summary.removed == 1));

    service.complete_request(&request.id, "alice").unwrap();
    sleep(Duration::from_secs(3)).await;
    assert!(drain(&mut notifications).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_drops_only_that_connection() {
    let (service, mut notifications) = service();
    let request = service.create_request();
    service
        .dispatch(subscribe_event("c1", "s1", &request.id, "bob"))
        .unwrap();
    service
        .dispatch(subscribe_event("c1", "s2", &request.id, "bob"))
        .unwrap();
    service
        .dispatch(subscribe_event("c2", "s1", &request.id, "carol"))
        .unwrap();

    service
        .dispatch(SessionEvent::Disconnect {
            connection_id: "c1".to_string(),
        })
        .unwrap();
    assert_eq!(
        service.registry().keys(),
        vec![SubscriptionKey::new("c2", "s1", request.id.clone(), "carol")]
    );

    service.complete_request(&request.id, "alice").unwrap();
    sleep(Duration::from_secs(2)).await;

    let received = drain(&mut notifications);
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].observer, "carol");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_unsubscribe_and_self_removal() {
    let (sink, mut notifications) = ChannelSink::new();
    let mut config = IdentityConfig::default();
    config.polling.initial_delay = Duration::from_millis(5);
    config.polling.interval = Duration::from_millis(1);
    let service = Arc::new(IdentityService::new(&config, Arc::new(sink), Handle::current()));

    // Resolved up front, so every tick that runs fires.
    let mut request_ids = Vec::new();
    for _ in 0..50 {
        let request = service.create_request();
        service.complete_request(&request.id, "alice").unwrap();
        request_ids.push(request.id);
    }
    for (i, id) in request_ids.iter().enumerate() {
        service
            .dispatch(subscribe_event("c1", &format!("s{}", i), id, "bob"))
            .unwrap();
    }

    let unsubscriber = {
        let service = service.clone();
        tokio::spawn(async move {
            let mut cancelled = Vec::new();
            for i in 0..50 {
                let outcome = service
                    .dispatch(SessionEvent::Unsubscribe {
                        connection_id: "c1".to_string(),
                        subscription_id: format!("s{}", i),
                    })
                    .unwrap();
                let DispatchOutcome::Removed(summary) = &outcome else {
                    panic!("unexpected outcome {:?}", outcome);
                };
                assert!(summary.matched <= 1);
                if summary.removed == 1 {
                    cancelled.push(i);
                }
                tokio::task::yield_now().await;
            }
            cancelled
        })
    };

    let cancelled = unsubscriber.await.unwrap();
    sleep(Duration::from_millis(200)).await;

    let mut delivered: Vec<usize> = drain(&mut notifications)
        .iter()
        .map(|n| {
            request_ids
                .iter()
                .position(|id| *id == n.payload.id)
                .unwrap()
        })
        .collect();
    delivered.sort_unstable();
    let delivered_count = delivered.len();
    delivered.dedup();
    assert_eq!(delivered.len(), delivered_count, "a subscription fired twice");

    // A cancelled subscription never fires, and every other one fires once.
    assert!(cancelled.iter().all(|i| delivered.binary_search(i).is_err()));
    assert_eq!(cancelled.len() + delivered.len(), 50);
    assert!(service.registry().is_empty());
}

#[tokio::test]
async fn test_subscribe_without_request_id_is_rejected() {
    let (service, _) = service();
    let result = service.dispatch(SessionEvent::Subscribe {
        connection_id: "c1".to_string(),
        subscription_id: "s1".to_string(),
        destination: DESTINATION.to_string(),
        request_id: None,
        observer: Some("bob".to_string()),
    });

    let error = result.unwrap_err();
    assert_eq!(
        error,
        DispatchError::MissingField {
            field: "identityRequestId"
        }
    );
    assert_eq!(
        error.to_string(),
        "Could not subscribe to /queue/requestResolved: missing identityRequestId"
    );
    assert!(service.registry().is_empty());
}
