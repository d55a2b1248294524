use std::time::Duration;

use idrelay::{
    core::{
        config::IdentityConfig,
        dispatch::SessionEvent,
        store::{IdentityRequest, RequestState, RequestStatus},
    },
    http::server::{AppState, create_app},
};
use pretty_assertions::assert_eq;
use tokio::{net::TcpListener, time::timeout};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rest_flow_with_dedicated_scheduler_runtime() {
    let mut identity = IdentityConfig::default();
    identity.polling.initial_delay = Duration::from_millis(10);
    identity.polling.interval = Duration::from_millis(10);
    let scheduler = identity.scheduler.build_runtime().unwrap();

    let state = AppState::new(&identity, scheduler.handle().clone());
    state.service.start().await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let app = create_app(state.clone());
    tokio::spawn(async move {
        axum_serve(listener, app).await;
    });

    let client = reqwest::Client::new();
    let created: IdentityRequest = client
        .get(format!("{}/identity/create", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Nobody is connected as "bob": delivery fails but the subscription
    // still ends.
    state
        .service
        .dispatch(SessionEvent::Subscribe {
            connection_id: "c1".to_string(),
            subscription_id: "s1".to_string(),
            destination: "/user/queue/requestResolved".to_string(),
            request_id: Some(created.id.clone()),
            observer: Some("bob".to_string()),
        })
        .unwrap();

    let completed: bool = client
        .post(format!(
            "{}/identity/complete?requestId={}&upn=alice",
            base, created.id
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(completed);

    let state_after: RequestState = client
        .get(format!("{}/identity/status?requestId={}", base, created.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(state_after.status, RequestStatus::Complete);

    timeout(Duration::from_secs(2), async {
        while !state.service.registry().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let summary = state.service.shutdown().await;
    assert_eq!(summary.removed + summary.deferred, 0);
    scheduler.shutdown_background();
}

async fn axum_serve(listener: TcpListener, app: axum::Router) {
    let _ = axum::serve(listener, app).await;
}
