pub mod identity;

use crate::handlers;
use crate::models::{ClientFrame, ErrorFrame, ErrorResponse, MessageFrame};
use crate::server::AppState;
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use idrelay_core::store::{IdentityRequest, RequestState, RequestStatus};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::identity::create_request,
        handlers::identity::complete_request,
        handlers::identity::reject_request,
        handlers::identity::request_status,
        handlers::websocket::session
    ),
    components(schemas(
        IdentityRequest,
        RequestState,
        RequestStatus,
        ErrorResponse,
        ClientFrame,
        MessageFrame,
        ErrorFrame
    )),
    tags(
        (name = "identity", description = "Identity request API")
    )
)]
pub struct ApiDoc;

/// Create the main API router with state
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health_check))
        .route("/ws", get(handlers::websocket::session))
        .nest("/identity", identity::routes())
}

/// Health check endpoint for container health monitoring
async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
