// Workflow CRUD and run-start HTTP routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use stepline_contracts::{Workflow, WorkflowRun, WorkflowStepInput};
use stepline_engine::EngineService;

use crate::common::error_status;

/// App state for workflow routes
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<EngineService>,
}

/// Request to create a workflow
#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<WorkflowStepInput>,
}

/// Request to update a workflow; the step sequence is replaced wholesale
#[derive(Debug, Deserialize)]
pub struct UpdateWorkflowRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<WorkflowStepInput>,
}

/// Create workflow routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/workflows", get(list_workflows).post(create_workflow))
        .route(
            "/v1/workflows/:workflow_id",
            get(get_workflow).put(update_workflow),
        )
        .route(
            "/v1/workflows/:workflow_id/runs",
            get(list_runs).post(start_run),
        )
        .with_state(state)
}

/// GET /v1/workflows - List workflows with their steps, newest first
pub async fn list_workflows(
    State(state): State<AppState>,
) -> Result<Json<Vec<Workflow>>, StatusCode> {
    let workflows = state.service.workflows().await.map_err(|e| {
        tracing::error!("Failed to list workflows: {}", e);
        error_status(&e)
    })?;

    Ok(Json(workflows))
}

/// POST /v1/workflows - Create a workflow with its step sequence
pub async fn create_workflow(
    State(state): State<AppState>,
    Json(req): Json<CreateWorkflowRequest>,
) -> Result<(StatusCode, Json<Workflow>), StatusCode> {
    let workflow = state
        .service
        .create_workflow(req.name, req.description, req.steps)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create workflow: {}", e);
            error_status(&e)
        })?;

    Ok((StatusCode::CREATED, Json(workflow)))
}

/// GET /v1/workflows/:workflow_id
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<Json<Workflow>, StatusCode> {
    let workflow = state
        .service
        .workflow(&workflow_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to get workflow: {}", e);
            error_status(&e)
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(workflow))
}

/// PUT /v1/workflows/:workflow_id - Replace metadata and step sequence
pub async fn update_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Json(req): Json<UpdateWorkflowRequest>,
) -> Result<Json<Workflow>, StatusCode> {
    let workflow = state
        .service
        .update_workflow(&workflow_id, req.name, req.description, req.steps)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update workflow: {}", e);
            error_status(&e)
        })?;

    Ok(Json(workflow))
}

/// GET /v1/workflows/:workflow_id/runs - List runs, newest first
pub async fn list_runs(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<Json<Vec<WorkflowRun>>, StatusCode> {
    let runs = state.service.runs(&workflow_id).await.map_err(|e| {
        tracing::error!("Failed to list runs: {}", e);
        error_status(&e)
    })?;

    Ok(Json(runs))
}

/// POST /v1/workflows/:workflow_id/runs - Start a run
///
/// The run may still be PENDING in the response; the executor picks it up
/// asynchronously.
pub async fn start_run(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<(StatusCode, Json<WorkflowRun>), StatusCode> {
    let run = state.service.start_run(&workflow_id).await.map_err(|e| {
        tracing::error!("Failed to start run: {}", e);
        error_status(&e)
    })?;

    tracing::info!(run_id = %run.id, "Run started via API");

    Ok((StatusCode::CREATED, Json(run)))
}
