// Run executor
//
// Advances a run through its steps one scheduling pass at a time. A pass is
// re-entrant by design: it scans the step runs and resumes wherever work
// remains, so a manual gate is nothing more than a pass that exits early and
// a durable PENDING row the next pass reads. The active set holds the ids of
// runs with an in-flight pass and guarantees at most one per run within this
// engine instance.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::Mutex;
use tracing::{info, warn};

use stepline_contracts::{EventType, RunStatus, StepKind, StepRun, StepStatus};
use stepline_storage::{Database, EventJournal, StepRunRow, WorkflowRunRow, WorkflowStepRow};

use crate::broker::{run_topic, Broker, Signal};
use crate::error::{EngineError, Result};
use crate::handlers::{DelayHandler, HttpHandler, StepHandler};

#[derive(Clone)]
pub struct Executor {
    db: Database,
    journal: EventJournal,
    broker: Broker,
    delay: Arc<DelayHandler>,
    http: Arc<HttpHandler>,
    /// Runs with an in-flight scheduling pass
    active: Arc<Mutex<HashSet<String>>>,
}

impl Executor {
    pub fn new(db: Database, journal: EventJournal, broker: Broker) -> Self {
        Self {
            db,
            journal,
            broker,
            delay: Arc::new(DelayHandler::new()),
            http: Arc::new(HttpHandler::new()),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Start a scheduling pass for the run unless one is already in flight.
    ///
    /// Idempotent: re-enqueueing an active run is a no-op, so any number of
    /// callers can signal "this run may have work" without risking duplicate
    /// progression.
    pub async fn enqueue(&self, run_id: &str) {
        {
            let mut active = self.active.lock().await;
            if !active.insert(run_id.to_string()) {
                return;
            }
        }

        let executor = self.clone();
        let run_id = run_id.to_string();

        tokio::spawn(async move {
            if let Err(e) = executor.run_pass(&run_id).await {
                warn!(run_id = %run_id, error = %e, "Scheduling pass aborted");
            }

            executor.active.lock().await.remove(&run_id);
        });
    }

    /// Number of runs currently being progressed.
    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }

    /// One scheduling pass: resume the run wherever work remains and exit at
    /// a terminal status or at a manual gate.
    async fn run_pass(&self, run_id: &str) -> Result<()> {
        let Some(run) = self.db.get_run(run_id).await? else {
            return Ok(());
        };
        if run_status(&run)?.is_terminal() {
            return Ok(());
        }

        let Some(workflow) = self.db.get_workflow(&run.workflow_id).await? else {
            return Ok(());
        };

        if run_status(&run)? == RunStatus::Pending {
            // RUN_STARTED was already journaled when the run was enqueued;
            // this transition only flips the status and sets started_at.
            if self
                .db
                .set_run_status(run_id, RunStatus::Running)
                .await?
                .is_some()
            {
                info!(run_id = %run_id, workflow_id = %workflow.id, "Run started");
                self.notify(run_id).await;
            }
        }

        let steps = self.db.list_workflow_steps(&workflow.id).await?;
        let step_runs: HashMap<String, StepRunRow> = self
            .db
            .list_step_runs(run_id)
            .await?
            .into_iter()
            .map(|sr| (sr.workflow_step_id.clone(), sr))
            .collect();

        for step in &steps {
            let Some(step_run) = step_runs.get(&step.id) else {
                // Definition gained a step after this run was created.
                continue;
            };

            match step_status(step_run)? {
                StepStatus::Succeeded => continue,
                StepStatus::Failed => {
                    // Normally unreachable: a step failure already fails the run.
                    self.fail_run(run_id, "Run already failed").await?;
                    return Ok(());
                }
                StepStatus::Pending | StepStatus::Running => {}
            }

            match step.kind.parse::<StepKind>() {
                Ok(StepKind::Manual) => {
                    if step_status(step_run)? == StepStatus::Pending {
                        self.journal
                            .record(
                                run_id,
                                Some(&step_run.id),
                                EventType::StepStarted,
                                format!("Manual step '{}' awaiting completion", step.name),
                            )
                            .await?;
                        self.notify(run_id).await;
                    }
                    // Suspended: the pass exits and completeManualStep
                    // re-enqueues the run when a human acts.
                    return Ok(());
                }
                Ok(StepKind::Delay) => {
                    self.run_automated_step(run_id, step, step_run, self.delay.as_ref())
                        .await?;
                }
                Ok(StepKind::Http) => {
                    self.run_automated_step(run_id, step, step_run, self.http.as_ref())
                        .await?;
                }
                Err(e) => {
                    self.fail_step(run_id, step, step_run, &EngineError::Validation(e))
                        .await?;
                }
            }

            // An automated failure has already terminated the run; re-read
            // rather than trust in-memory state.
            let Some(run) = self.db.get_run(run_id).await? else {
                return Ok(());
            };
            if run_status(&run)?.is_terminal() {
                return Ok(());
            }
        }

        if self
            .db
            .set_run_status(run_id, RunStatus::Succeeded)
            .await?
            .is_some()
        {
            self.journal
                .record(run_id, None, EventType::RunSucceeded, "Run succeeded")
                .await?;
            info!(run_id = %run_id, "Run succeeded");
            self.notify(run_id).await;
        }

        Ok(())
    }

    /// Drive one automated step through the RUNNING → SUCCEEDED/FAILED
    /// protocol. Handler failures become durable events; store errors abort
    /// the pass.
    async fn run_automated_step(
        &self,
        run_id: &str,
        step: &WorkflowStepRow,
        step_run: &StepRunRow,
        handler: &dyn StepHandler,
    ) -> Result<()> {
        if self
            .db
            .set_step_run_status(&step_run.id, StepStatus::Running)
            .await?
            .is_some()
        {
            self.journal
                .record(
                    run_id,
                    Some(&step_run.id),
                    EventType::StepStarted,
                    format!("Step '{}' started", step.name),
                )
                .await?;
            self.notify(run_id).await;
        }

        match handler.execute(&step.config).await {
            Ok(()) => {
                if self
                    .db
                    .set_step_run_status(&step_run.id, StepStatus::Succeeded)
                    .await?
                    .is_some()
                {
                    self.journal
                        .record(
                            run_id,
                            Some(&step_run.id),
                            EventType::StepSucceeded,
                            format!("Step '{}' succeeded", step.name),
                        )
                        .await?;
                    self.notify(run_id).await;
                }
                Ok(())
            }
            Err(err) if err.is_step_failure() => {
                self.fail_step(run_id, step, step_run, &err).await
            }
            Err(err) => Err(err),
        }
    }

    /// Reify a handler failure: STEP_FAILED for the step, RUN_FAILED for the
    /// run, one signal so observers see the transition.
    async fn fail_step(
        &self,
        run_id: &str,
        step: &WorkflowStepRow,
        step_run: &StepRunRow,
        err: &EngineError,
    ) -> Result<()> {
        info!(run_id = %run_id, step = %step.name, error = %err, "Step failed");

        if self
            .db
            .set_step_run_status(&step_run.id, StepStatus::Failed)
            .await?
            .is_some()
        {
            self.journal
                .record(
                    run_id,
                    Some(&step_run.id),
                    EventType::StepFailed,
                    format!("Step '{}' failed: {}", step.name, err),
                )
                .await?;
        }

        self.fail_run(run_id, "Run failed").await
    }

    /// Transition the run to FAILED (if it is not already terminal), append
    /// RUN_FAILED, and signal subscribers.
    async fn fail_run(&self, run_id: &str, message: &str) -> Result<()> {
        if self
            .db
            .set_run_status(run_id, RunStatus::Failed)
            .await?
            .is_some()
        {
            self.journal
                .record(run_id, None, EventType::RunFailed, message)
                .await?;
        }
        self.notify(run_id).await;

        Ok(())
    }

    /// Resolve a manual gate.
    ///
    /// Idempotent: a step run already in a terminal status is returned
    /// unchanged and no events are appended. On success the run is
    /// re-enqueued to resume from the next unfinished step; on failure the
    /// run is terminated.
    pub async fn complete_manual_step(&self, step_run_id: &str, success: bool) -> Result<StepRun> {
        let step_run = self
            .db
            .get_step_run(step_run_id)
            .await?
            .ok_or_else(|| EngineError::StepRunNotFound(step_run_id.to_string()))?;

        if step_status(&step_run)?.is_terminal() {
            return Ok(step_run.into());
        }

        // A run that already reached a terminal status accepts no further
        // transitions; its journal is closed.
        if let Some(run) = self.db.get_run(&step_run.workflow_run_id).await? {
            if run_status(&run)?.is_terminal() {
                return Ok(step_run.into());
            }
        }

        let target = if success {
            StepStatus::Succeeded
        } else {
            StepStatus::Failed
        };

        let Some(updated) = self.db.set_step_run_status(step_run_id, target).await? else {
            // Lost a race with a concurrent completion; return current state.
            let step_run = self
                .db
                .get_step_run(step_run_id)
                .await?
                .ok_or_else(|| EngineError::StepRunNotFound(step_run_id.to_string()))?;
            return Ok(step_run.into());
        };

        let run_id = updated.workflow_run_id.clone();

        if success {
            self.journal
                .record(
                    &run_id,
                    Some(step_run_id),
                    EventType::StepSucceeded,
                    "Manual step completed",
                )
                .await?;
            self.notify(&run_id).await;
            self.enqueue(&run_id).await;
        } else {
            self.journal
                .record(
                    &run_id,
                    Some(step_run_id),
                    EventType::StepFailed,
                    "Manual step failed",
                )
                .await?;
            self.notify(&run_id).await;
            self.fail_run(&run_id, "Run failed by manual step").await?;
        }

        Ok(updated.into())
    }

    async fn notify(&self, run_id: &str) {
        self.broker
            .publish(
                &run_topic(run_id),
                Signal {
                    run_id: run_id.to_string(),
                },
            )
            .await;
    }
}

fn run_status(run: &WorkflowRunRow) -> Result<RunStatus> {
    run.status
        .parse()
        .map_err(|e: String| EngineError::Internal(anyhow!(e)))
}

fn step_status(step_run: &StepRunRow) -> Result<StepStatus> {
    step_run
        .status
        .parse()
        .map_err(|e: String| EngineError::Internal(anyhow!(e)))
}
