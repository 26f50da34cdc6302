// Engine service: the canonical operations exposed to the transport layer
//
// Queries return DTO views of the store, mutations update the store (and
// hand runs to the executor), and subscriptions turn broker signals into
// snapshot streams. Transport encoding lives elsewhere; this is the whole
// contract.

use futures::{future, stream, Stream, StreamExt};
use tracing::info;

use stepline_contracts::{
    EventType, RunSnapshot, StepRun, Workflow, WorkflowRun, WorkflowStepInput,
};
use stepline_storage::{
    CreateWorkflow, CreateWorkflowStep, Database, EventJournal, UpdateWorkflow,
};

use crate::broker::{run_topic, Broker, Signal};
use crate::error::{EngineError, Result};
use crate::executor::Executor;

#[derive(Clone)]
pub struct EngineService {
    db: Database,
    journal: EventJournal,
    broker: Broker,
    executor: Executor,
}

impl EngineService {
    pub fn new(db: Database) -> Self {
        let journal = EventJournal::new(db.clone());
        let broker = Broker::new();
        let executor = Executor::new(db.clone(), journal.clone(), broker.clone());

        Self {
            db,
            journal,
            broker,
            executor,
        }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    // ============================================
    // Queries
    // ============================================

    /// All workflows with their steps, newest first.
    pub async fn workflows(&self) -> Result<Vec<Workflow>> {
        let rows = self.db.list_workflows().await?;

        let mut workflows = Vec::with_capacity(rows.len());
        for row in rows {
            let steps = self.db.list_workflow_steps(&row.id).await?;
            workflows.push(row.into_workflow(steps));
        }

        Ok(workflows)
    }

    /// One workflow with its steps, or `None`.
    pub async fn workflow(&self, id: &str) -> Result<Option<Workflow>> {
        let Some(row) = self.db.get_workflow(id).await? else {
            return Ok(None);
        };
        let steps = self.db.list_workflow_steps(id).await?;
        Ok(Some(row.into_workflow(steps)))
    }

    /// Runs of a workflow, newest first.
    pub async fn runs(&self, workflow_id: &str) -> Result<Vec<WorkflowRun>> {
        let rows = self.db.list_runs(workflow_id).await?;
        Ok(rows.into_iter().map(WorkflowRun::from).collect())
    }

    /// Full view of one run: the run, its step runs, and its events.
    pub async fn run(&self, id: &str) -> Result<Option<RunSnapshot>> {
        load_snapshot(&self.db, id).await
    }

    // ============================================
    // Mutations
    // ============================================

    pub async fn create_workflow(
        &self,
        name: impl Into<String>,
        description: Option<String>,
        steps: Vec<WorkflowStepInput>,
    ) -> Result<Workflow> {
        let row = self
            .db
            .create_workflow(CreateWorkflow {
                name: name.into(),
                description,
                steps: to_step_inputs(steps),
            })
            .await?;

        info!(workflow_id = %row.id, name = %row.name, "Workflow created");

        let steps = self.db.list_workflow_steps(&row.id).await?;
        Ok(row.into_workflow(steps))
    }

    /// Replace a workflow's metadata and step sequence. Fails for unknown ids.
    pub async fn update_workflow(
        &self,
        id: &str,
        name: Option<String>,
        description: Option<String>,
        steps: Vec<WorkflowStepInput>,
    ) -> Result<Workflow> {
        let row = self
            .db
            .update_workflow(
                id,
                UpdateWorkflow {
                    name,
                    description,
                    steps: to_step_inputs(steps),
                },
            )
            .await?
            .ok_or_else(|| EngineError::WorkflowNotFound(id.to_string()))?;

        info!(workflow_id = %row.id, "Workflow updated");

        let steps = self.db.list_workflow_steps(&row.id).await?;
        Ok(row.into_workflow(steps))
    }

    /// Create a run and hand it to the executor.
    ///
    /// The returned run may still be PENDING: enqueueing is asynchronous and
    /// the first pass flips it to RUNNING. The RUN_STARTED event is journaled
    /// here, exactly once per run.
    pub async fn start_run(&self, workflow_id: &str) -> Result<WorkflowRun> {
        let run = self
            .db
            .create_run(workflow_id)
            .await?
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;

        self.journal
            .record(&run.id, None, EventType::RunStarted, "Run enqueued")
            .await?;
        self.broker
            .publish(
                &run_topic(&run.id),
                Signal {
                    run_id: run.id.clone(),
                },
            )
            .await;

        info!(run_id = %run.id, workflow_id = %workflow_id, "Run enqueued");

        self.executor.enqueue(&run.id).await;

        Ok(run.into())
    }

    /// Resolve a manual gate; fails for unknown step runs, idempotent for
    /// already-completed ones.
    pub async fn complete_manual_step(&self, step_run_id: &str, success: bool) -> Result<StepRun> {
        self.executor.complete_manual_step(step_run_id, success).await
    }

    // ============================================
    // Subscriptions
    // ============================================

    /// Stream of run snapshots: the current one immediately, then one per
    /// change signal. Signals are advisory, so every element re-reads the
    /// store; a lagged subscriber simply skips straight to the latest state.
    pub async fn run_updated(
        &self,
        run_id: &str,
    ) -> Result<impl Stream<Item = RunSnapshot> + Send + Unpin + 'static> {
        let initial = load_snapshot(&self.db, run_id)
            .await?
            .ok_or_else(|| EngineError::RunNotFound(run_id.to_string()))?;

        let signals = self.broker.subscribe(&run_topic(run_id)).await;
        let db = self.db.clone();
        let run_id = run_id.to_string();

        let updates = signals.filter_map(move |_signal| {
            let db = db.clone();
            let run_id = run_id.clone();
            async move { load_snapshot(&db, &run_id).await.ok().flatten() }
        });

        Ok(Box::pin(stream::once(future::ready(initial)).chain(updates)))
    }
}

async fn load_snapshot(db: &Database, run_id: &str) -> Result<Option<RunSnapshot>> {
    let Some(run) = db.get_run(run_id).await? else {
        return Ok(None);
    };
    let step_runs = db.list_step_runs(run_id).await?;
    let events = db.list_events(run_id).await?;

    Ok(Some(RunSnapshot {
        run: run.into(),
        step_runs: step_runs.into_iter().map(StepRun::from).collect(),
        events: events.into_iter().map(Into::into).collect(),
    }))
}

fn to_step_inputs(steps: Vec<WorkflowStepInput>) -> Vec<CreateWorkflowStep> {
    steps
        .into_iter()
        .map(|step| CreateWorkflowStep {
            id: step.id,
            name: step.name,
            kind: step.kind,
            config: step.config,
            position: step.position,
        })
        .collect()
}
