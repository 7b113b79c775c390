//! HTTP surface
//!
//! `POST /transactions` parses the JSON body and hands it to the
//! [`WriteCoordinator`]; the resulting [`Outcome`] is rendered as a plain-text
//! response. Parse failures never reach the coordinator and are answered with
//! a [`WebError`].

use crate::coordinator::WriteCoordinator;
use crate::core::{Outcome, TransactionRequest};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::debug;

pub const CREATED_MESSAGE: &str = "Transaction created successfully";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<WriteCoordinator>,
}

impl AppState {
    pub fn new(coordinator: Arc<WriteCoordinator>) -> Self {
        Self { coordinator }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub fn build_router(state: AppState) -> Router {
    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .route("/health", get(healthcheck))
        .route("/transactions", post(create_transaction))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .with_state(state)
}

pub async fn healthcheck() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Failures detected by the HTTP layer before the coordinator is involved.
#[derive(Debug)]
pub enum WebError {
    BadRequest(String),
}

impl From<JsonRejection> for WebError {
    fn from(rejection: JsonRejection) -> Self {
        WebError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        match self {
            WebError::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
        }
    }
}

pub async fn create_transaction(
    State(state): State<AppState>,
    payload: Result<Json<TransactionRequest>, JsonRejection>,
) -> Result<Outcome, WebError> {
    let Json(request) = payload.map_err(|rejection| {
        let err = WebError::from(rejection);
        debug!(error = ?err, "bad request");
        err
    })?;

    Ok(state.coordinator.submit(request).await)
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        match self {
            Outcome::Created => (StatusCode::CREATED, CREATED_MESSAGE).into_response(),
            Outcome::CapExceeded { cap } => (
                StatusCode::PAYMENT_REQUIRED,
                format!("Total amount exceeds limit of {}", cap),
            )
                .into_response(),
            // The cause was logged by the coordinator and is not echoed back.
            Outcome::InternalFailure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE).into_response()
            }
        }
    }
}
