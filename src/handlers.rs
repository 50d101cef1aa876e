//! HTTP surface (spec §6.1): a bare `Router<AppState>` handed back for the binary
//! to layer CORS/tracing over and mount.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value as JsonValue, json};

use refill_providers::ProviderRegistry;
use refill_types::error::{AppError, ErrorCode};

use crate::admission::{self, RefillIntent};
use crate::catalog::Catalog;
use crate::envelope::{self, EnvelopeConfig};
use crate::health;
use crate::orchestrator;
use crate::query;

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn Catalog>,
    pub providers: Arc<ProviderRegistry>,
    pub envelope: EnvelopeConfig,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/health", get(health_handler))
        .route("/v1/wallet/refill", post(refill_handler))
        .route("/v1/wallet/refill/status/{refill_request_id}", get(status_handler))
}

/// Liveness is not part of the signed-envelope contract (spec §4.3 only covers
/// the refill submit/status surface) — always plain JSON.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let report = health::check(state.catalog.as_ref()).await;
    let status = if report.status == health::ServiceStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(report))
}

async fn refill_handler(State(state): State<AppState>, body: String) -> Response {
    let payload = match envelope::verify(&state.envelope, &body) {
        Ok(payload) => payload,
        Err(err) => return respond(&state.envelope, err),
    };

    let intent: RefillIntent = match serde_json::from_value(payload) {
        Ok(intent) => intent,
        Err(e) => {
            return respond(
                &state.envelope,
                AppError::new(ErrorCode::MissingFields, format!("malformed refill intent: {e}")),
            );
        }
    };

    match handle_refill(&state, intent).await {
        Ok(data) => respond_ok(&state.envelope, StatusCode::OK, data),
        Err(err) => respond(&state.envelope, err),
    }
}

async fn handle_refill(state: &AppState, intent: RefillIntent) -> Result<JsonValue, AppError> {
    let accepted = admission::admit(state.catalog.as_ref(), state.providers.as_ref(), intent).await?;
    let outcome = orchestrator::initiate(state.catalog.as_ref(), accepted).await?;
    Ok(serde_json::to_value(outcome).expect("RefillOutcome always serializes"))
}

async fn status_handler(
    State(state): State<AppState>,
    Path(refill_request_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if refill_request_id.trim().is_empty() {
        return respond(&state.envelope, AppError::new(ErrorCode::MissingParameter, "refill_request_id is required"));
    }

    let header_value = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let token = match envelope::bearer_token(header_value) {
        Ok(token) => token,
        Err(err) => return respond(&state.envelope, err),
    };

    let payload = match envelope::verify(&state.envelope, token) {
        Ok(payload) => payload,
        Err(err) => return respond(&state.envelope, err),
    };

    if let Err(err) = envelope::cross_validate_refill_request_id(&payload, &refill_request_id) {
        return respond(&state.envelope, err);
    }

    match query::get_refill_status(state.catalog.as_ref(), &refill_request_id).await {
        Ok(row) => respond_ok(
            &state.envelope,
            StatusCode::OK,
            serde_json::to_value(row).expect("RefillTransaction always serializes"),
        ),
        Err(err) => respond(&state.envelope, err),
    }
}

/// Wraps a success payload, signing it when `auth_enabled` (spec §4.3 "Signing
/// contract": every response body, success or failure, is replaced by a token).
fn respond_ok(config: &EnvelopeConfig, status: StatusCode, data: JsonValue) -> Response {
    envelope_response(config, status, json!({ "success": true, "data": data }))
}

fn respond(config: &EnvelopeConfig, err: AppError) -> Response {
    let status = err.code.status_code();
    let body = json!({
        "success": false,
        "code": err.code,
        "message": err.error_message,
        "data": err.data,
    });
    envelope_response(config, status, body)
}

fn envelope_response(config: &EnvelopeConfig, status: StatusCode, body: JsonValue) -> Response {
    if !config.auth_enabled {
        return (status, Json(body)).into_response();
    }
    match envelope::sign(config, body) {
        Ok(token) => (status, token).into_response(),
        // Fail safe per spec §4.3: signing failure is an empty 500, never the
        // unsigned payload.
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
