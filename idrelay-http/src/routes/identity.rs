use crate::handlers::identity::{complete_request, create_request, reject_request, request_status};
use crate::server::AppState;
use axum::{
    Router,
    routing::{get, post},
};

/// Create the identity request routes with state
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/create", get(create_request))
        .route("/complete", post(complete_request))
        .route("/reject", post(reject_request))
        .route("/status", get(request_status))
}
