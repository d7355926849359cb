//! HTTP API module
//!
//! JSON endpoints consumed by the browser UI:
//! - POST /api/generate - run the pipeline for one submission
//! - GET  /api/status   - current run status, for progress indication
//!
//! One run at a time: submissions while a run is active get 409.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::pipeline::{Pipeline, UserInput};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    run_gate: Arc<Mutex<()>>,
}

/// Build the API router
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let state = AppState {
        pipeline,
        run_gate: Arc::new(Mutex::new(())),
    };

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/status", get(run_status))
        .route("/api/generate", post(generate))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                // The caller is a browser page, possibly served elsewhere
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Root endpoint
async fn root() -> impl IntoResponse {
    Json(RootResponse {
        name: "posterd",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct RootResponse {
    name: &'static str,
    version: &'static str,
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        gemini: if state.pipeline.is_configured() {
            "ok"
        } else {
            "unconfigured"
        },
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    gemini: &'static str,
}

/// Current run status
async fn run_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pipeline.status())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(flatten)]
    input: UserInput,
    #[serde(default)]
    force_reanalysis: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    message: String,
}

/// Run the pipeline for one submission
async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> impl IntoResponse {
    if request.input.text.trim().is_empty() && request.input.image_data_url.is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                message: "provide text or a reference image".to_string(),
            }),
        )
            .into_response();
    }

    // Reject concurrent submissions instead of queueing them
    let Ok(_guard) = state.run_gate.try_lock() else {
        return (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                message: "a generation run is already in progress".to_string(),
            }),
        )
            .into_response();
    };

    match state
        .pipeline
        .run(request.input, request.force_reanalysis)
        .await
    {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => (
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse {
                message: err.message,
            }),
        )
            .into_response(),
    }
}
