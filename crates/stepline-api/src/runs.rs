// Run query, manual-completion, and live-update HTTP routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::{convert::Infallible, sync::Arc};
use stepline_contracts::{RunSnapshot, StepRun};
use stepline_engine::EngineService;

use crate::common::error_status;

/// App state for run routes
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<EngineService>,
}

/// Request to resolve a manual gate
#[derive(Debug, Deserialize)]
pub struct CompleteStepRequest {
    pub success: bool,
}

/// Create run routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/runs/:run_id", get(get_run))
        .route("/v1/runs/:run_id/updates", get(stream_run_updates))
        .route(
            "/v1/step-runs/:step_run_id/complete",
            post(complete_manual_step),
        )
        .with_state(state)
}

/// GET /v1/runs/:run_id - Run with step runs and events
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunSnapshot>, StatusCode> {
    let snapshot = state
        .service
        .run(&run_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to get run: {}", e);
            error_status(&e)
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(snapshot))
}

/// POST /v1/step-runs/:step_run_id/complete - Resolve a manual gate
pub async fn complete_manual_step(
    State(state): State<AppState>,
    Path(step_run_id): Path<String>,
    Json(req): Json<CompleteStepRequest>,
) -> Result<Json<StepRun>, StatusCode> {
    let step_run = state
        .service
        .complete_manual_step(&step_run_id, req.success)
        .await
        .map_err(|e| {
            tracing::error!("Failed to complete manual step: {}", e);
            error_status(&e)
        })?;

    tracing::info!(step_run_id = %step_run.id, success = req.success, "Manual step resolved");

    Ok(Json(step_run))
}

/// GET /v1/runs/:run_id/updates - Stream run snapshots as Server-Sent Events
///
/// Emits the current snapshot on connect, then one snapshot per change
/// signal. Snapshots always reflect the latest persisted state, not deltas.
pub async fn stream_run_updates(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, StatusCode> {
    let updates = state.service.run_updated(&run_id).await.map_err(|e| {
        tracing::error!("Failed to subscribe to run updates: {}", e);
        error_status(&e)
    })?;

    tracing::info!(run_id = %run_id, "Starting run update stream");

    let stream = updates.map(|snapshot| {
        let json = serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".to_string());
        Ok(SseEvent::default().event("run_updated").data(json))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
