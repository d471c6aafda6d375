//! Operator HTTP surface: health checks and the integrity report.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::{IdError, ServiceError};
use crate::integrity::{IntegrityReport, RepairLog, RepairStrategy};
use crate::service::RecordService;

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RecordService>,
}

/// A [`ServiceError`] rendered as an HTTP response.
pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Transition(_) | ServiceError::Device(_) | ServiceError::Closed { .. } => {
                StatusCode::CONFLICT
            }
            ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::Id(IdError::SequenceOverflow { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Id(_) | ServiceError::Store(_) => {
                error!("Request failed: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = match &self.0 {
            ServiceError::Validation(errors) => json!({
                "error": self.0.to_string(),
                "violations": errors,
            }),
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "repairdesk-core",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Verifies the record store answers.
async fn store_health_check(State(state): State<AppState>) -> Result<Json<serde_json::Value>, StatusCode> {
    state.service.store().ping().await.map_err(|e| {
        error!("Store health check failed: {}", e);
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    Ok(Json(json!({
        "status": "ok",
        "store": "connected"
    })))
}

async fn integrity_report(State(state): State<AppState>) -> Result<Json<IntegrityReport>, ApiError> {
    Ok(Json(state.service.integrity_report().await?))
}

#[derive(Debug, Deserialize)]
struct RepairRequest {
    strategies: Vec<RepairStrategy>,
}

/// Scans the store and applies the requested repairs against that scan.
async fn integrity_repair(
    State(state): State<AppState>,
    Json(request): Json<RepairRequest>,
) -> Result<Json<RepairLog>, ApiError> {
    let report = state.service.integrity_report().await?;
    Ok(Json(state.service.repair(&report, request.strategies).await?))
}

/// Creates the operator router.
///
/// # Arguments
///
/// * `state` - Shared application state
///
/// # Returns
///
/// Returns a configured Axum Router with request tracing.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/db", get(store_health_check))
        .route("/api/integrity/report", get(integrity_report))
        .route("/api/integrity/repair", post(integrity_repair))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
