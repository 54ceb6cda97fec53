// 🌐 REST API - axum routes over the registry service
//
// GET    /v1/swift-codes/:swift_code
// GET    /v1/swift-codes/country/:country_iso2
// POST   /v1/swift-codes
// DELETE /v1/swift-codes/:swift_code
// GET    /health

use crate::entities::{CountryListing, NewSwiftCode, SwiftCodeDetails};
use crate::error::RegistryError;
use crate::service::RegistryService;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RegistryService>,
}

/// Body of every message-only response
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        (status, MessageResponse::new(self.public_message())).into_response()
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /health - Health check
async fn health_check() -> impl IntoResponse {
    MessageResponse::new("OK")
}

/// GET /v1/swift-codes/:swift_code
async fn get_swift_code(
    State(state): State<AppState>,
    Path(swift_code): Path<String>,
) -> Result<Json<SwiftCodeDetails>, RegistryError> {
    debug!(code = %swift_code, "Fetching SWIFT code");
    Ok(Json(state.service.lookup(&swift_code).await?))
}

/// GET /v1/swift-codes/country/:country_iso2
async fn get_swift_codes_by_country(
    State(state): State<AppState>,
    Path(country_iso2): Path<String>,
) -> Result<Json<CountryListing>, RegistryError> {
    Ok(Json(state.service.by_country(&country_iso2).await?))
}

/// POST /v1/swift-codes
async fn add_swift_code(
    State(state): State<AppState>,
    payload: Result<Json<NewSwiftCode>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), RegistryError> {
    let Json(request) =
        payload.map_err(|rejection| RegistryError::Validation(rejection.body_text()))?;

    let outcome = state.service.add(request).await?;
    Ok((StatusCode::CREATED, MessageResponse::new(outcome.message())))
}

/// DELETE /v1/swift-codes/:swift_code
async fn delete_swift_code(
    State(state): State<AppState>,
    Path(swift_code): Path<String>,
) -> Result<Json<MessageResponse>, RegistryError> {
    let outcome = state.service.delete(&swift_code).await?;
    Ok(MessageResponse::new(outcome.message()))
}

// ============================================================================
// Router
// ============================================================================

pub fn build_router(service: Arc<RegistryService>) -> Router {
    let swift_routes = Router::new()
        .route("/", post(add_swift_code))
        .route("/country/:country_iso2", get(get_swift_codes_by_country))
        .route(
            "/:swift_code",
            get(get_swift_code).delete(delete_swift_code),
        )
        .with_state(AppState { service });

    Router::new()
        .route("/health", get(health_check))
        .nest("/v1/swift-codes", swift_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
