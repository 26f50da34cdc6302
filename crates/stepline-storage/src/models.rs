// Database models (internal, may differ from public DTOs)

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use stepline_contracts::{
    Event, EventType, RunStatus, StepKind, StepRun, StepStatus, Workflow, WorkflowRun, WorkflowStep,
};

// ============================================
// Workflow models
// ============================================

/// Workflow row from database
#[derive(Debug, Clone, FromRow)]
pub struct WorkflowRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Workflow step row from database
#[derive(Debug, Clone, FromRow)]
pub struct WorkflowStepRow {
    pub id: String,
    pub workflow_id: String,
    pub name: String,
    pub kind: String,
    pub config: sqlx::types::JsonValue,
    pub position: i64,
}

/// Input for creating a workflow with its step sequence
#[derive(Debug, Clone)]
pub struct CreateWorkflow {
    pub name: String,
    pub description: Option<String>,
    pub steps: Vec<CreateWorkflowStep>,
}

/// Input for one step in a create/update step sequence
#[derive(Debug, Clone)]
pub struct CreateWorkflowStep {
    /// Preserve an existing step identity; `None` assigns a fresh id
    pub id: Option<String>,
    pub name: String,
    pub kind: StepKind,
    pub config: serde_json::Value,
    pub position: i64,
}

/// Input for updating a workflow; `None` fields keep their current value,
/// the step sequence is always replaced wholesale.
#[derive(Debug, Clone)]
pub struct UpdateWorkflow {
    pub name: Option<String>,
    pub description: Option<String>,
    pub steps: Vec<CreateWorkflowStep>,
}

// ============================================
// Run models
// ============================================

/// Workflow run row from database
#[derive(Debug, Clone, FromRow)]
pub struct WorkflowRunRow {
    pub id: String,
    pub workflow_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Step run row from database
#[derive(Debug, Clone, FromRow)]
pub struct StepRunRow {
    pub id: String,
    pub workflow_run_id: String,
    pub workflow_step_id: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

// ============================================
// Event models
// ============================================

/// Event row from database
#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: String,
    pub workflow_run_id: String,
    pub step_run_id: Option<String>,
    pub event_type: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Input for appending an event
#[derive(Debug, Clone)]
pub struct CreateEventRow {
    pub workflow_run_id: String,
    pub step_run_id: Option<String>,
    pub event_type: EventType,
    pub message: String,
}

// ============================================
// Row -> DTO conversions
// ============================================

impl WorkflowRow {
    /// Combine the workflow row with its ordered steps into the public DTO.
    pub fn into_workflow(self, steps: Vec<WorkflowStepRow>) -> Workflow {
        Workflow {
            id: self.id,
            name: self.name,
            description: self.description,
            created_at: self.created_at,
            steps: steps.into_iter().map(WorkflowStep::from).collect(),
        }
    }
}

impl From<WorkflowStepRow> for WorkflowStep {
    fn from(row: WorkflowStepRow) -> Self {
        WorkflowStep {
            id: row.id,
            workflow_id: row.workflow_id,
            name: row.name,
            kind: row.kind.parse().unwrap_or(StepKind::Manual),
            config: row.config,
            position: row.position,
        }
    }
}

impl From<WorkflowRunRow> for WorkflowRun {
    fn from(row: WorkflowRunRow) -> Self {
        WorkflowRun {
            id: row.id,
            workflow_id: row.workflow_id,
            status: row.status.parse().unwrap_or(RunStatus::Pending),
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
        }
    }
}

impl From<StepRunRow> for StepRun {
    fn from(row: StepRunRow) -> Self {
        StepRun {
            id: row.id,
            workflow_run_id: row.workflow_run_id,
            workflow_step_id: row.workflow_step_id,
            status: row.status.parse().unwrap_or(StepStatus::Pending),
            started_at: row.started_at,
            finished_at: row.finished_at,
        }
    }
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            workflow_run_id: row.workflow_run_id,
            step_run_id: row.step_run_id,
            event_type: row.event_type.parse().unwrap_or(EventType::RunStarted),
            message: row.message,
            created_at: row.created_at,
        }
    }
}
