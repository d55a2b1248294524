use crate::error::AppError;
use crate::models::{ErrorResponse, RequestIdParams, ResolveParams};
use crate::server::AppState;
use axum::{
    extract::{Query, State},
    response::Json,
};
use idrelay_core::store::{IdentityRequest, RequestState};

/// Create an identity request
///
/// Starts a new request in `IN_PROGRESS`.
#[utoipa::path(
    get,
    path = "/identity/create",
    responses(
        (status = 200, description = "Identity request created", body = IdentityRequest)
    )
)]
#[axum::debug_handler]
pub async fn create_request(State(state): State<AppState>) -> Json<IdentityRequest> {
    Json(state.service.create_request())
}

/// Complete an identity request
#[utoipa::path(
    post,
    path = "/identity/complete",
    params(ResolveParams),
    responses(
        (status = 200, description = "Identity request completed", body = bool),
        (status = 404, description = "Identity request not found", body = ErrorResponse),
        (status = 409, description = "Identity request already resolved", body = ErrorResponse)
    )
)]
#[axum::debug_handler]
pub async fn complete_request(
    State(state): State<AppState>,
    Query(params): Query<ResolveParams>,
) -> Result<Json<bool>, AppError> {
    state
        .service
        .complete_request(&params.request_id, params.upn)?;
    Ok(Json(true))
}

/// Reject an identity request
#[utoipa::path(
    post,
    path = "/identity/reject",
    params(ResolveParams),
    responses(
        (status = 200, description = "Identity request rejected", body = bool),
        (status = 404, description = "Identity request not found", body = ErrorResponse),
        (status = 409, description = "Identity request already resolved", body = ErrorResponse)
    )
)]
#[axum::debug_handler]
pub async fn reject_request(
    State(state): State<AppState>,
    Query(params): Query<ResolveParams>,
) -> Result<Json<bool>, AppError> {
    state.service.reject_request(&params.request_id, params.upn)?;
    Ok(Json(true))
}

/// Get identity request state
#[utoipa::path(
    get,
    path = "/identity/status",
    params(RequestIdParams),
    responses(
        (status = 200, description = "Current request state", body = RequestState),
        (status = 404, description = "Identity request not found", body = ErrorResponse)
    )
)]
#[axum::debug_handler]
pub async fn request_status(
    State(state): State<AppState>,
    Query(params): Query<RequestIdParams>,
) -> Result<Json<RequestState>, AppError> {
    let request_state = state.service.query_state(&params.request_id)?;
    Ok(Json(request_state))
}
