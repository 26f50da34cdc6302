// Repository layer for database operations
//
// Every mutating operation is a single statement or an explicit transaction,
// so the visible state after a crash is always the last committed write.
// Status transitions are guarded UPDATEs: terminal statuses are absorbing and
// lifecycle timestamps are set exactly once, never overwritten.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use stepline_contracts::{new_id, RunStatus, StepStatus};

use crate::models::*;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) a database from a sqlite URL and run migrations.
    pub async fn from_url(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        MIGRATOR.run(&pool).await.context("Migration failed")?;

        Ok(Self { pool })
    }

    /// Fresh in-memory database for tests and examples.
    ///
    /// A single connection keeps every query on the same in-memory instance.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        MIGRATOR.run(&pool).await.context("Migration failed")?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ============================================
    // Workflows
    // ============================================

    pub async fn list_workflows(&self) -> Result<Vec<WorkflowRow>> {
        let rows = sqlx::query_as::<_, WorkflowRow>(
            r#"
            SELECT id, name, description, created_at
            FROM workflows
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn get_workflow(&self, id: &str) -> Result<Option<WorkflowRow>> {
        let row = sqlx::query_as::<_, WorkflowRow>(
            r#"
            SELECT id, name, description, created_at
            FROM workflows
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Steps of a workflow, ordered by position ascending.
    pub async fn list_workflow_steps(&self, workflow_id: &str) -> Result<Vec<WorkflowStepRow>> {
        let rows = sqlx::query_as::<_, WorkflowStepRow>(
            r#"
            SELECT id, workflow_id, name, kind, config, position
            FROM workflow_steps
            WHERE workflow_id = ?1
            ORDER BY position ASC
            "#,
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Create a workflow and its step sequence in one transaction.
    pub async fn create_workflow(&self, input: CreateWorkflow) -> Result<WorkflowRow> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, WorkflowRow>(
            r#"
            INSERT INTO workflows (id, name, description, created_at)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING id, name, description, created_at
            "#,
        )
        .bind(new_id())
        .bind(&input.name)
        .bind(&input.description)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        insert_steps(&mut tx, &row.id, &input.steps).await?;

        tx.commit().await?;

        Ok(row)
    }

    /// Replace a workflow's name/description and its entire step sequence.
    ///
    /// Existing steps are deleted and the provided list reinserted; inputs
    /// carrying an `id` keep their identity. Returns `None` for unknown ids.
    pub async fn update_workflow(
        &self,
        id: &str,
        input: UpdateWorkflow,
    ) -> Result<Option<WorkflowRow>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, WorkflowRow>(
            r#"
            UPDATE workflows
            SET name = COALESCE(?2, name),
                description = COALESCE(?3, description)
            WHERE id = ?1
            RETURNING id, name, description, created_at
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM workflow_steps WHERE workflow_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        insert_steps(&mut tx, id, &input.steps).await?;

        tx.commit().await?;

        Ok(Some(row))
    }

    // ============================================
    // Runs
    // ============================================

    /// Create a pending run plus one pending step run per workflow step,
    /// all in a single transaction. Returns `None` if the workflow is unknown.
    pub async fn create_run(&self, workflow_id: &str) -> Result<Option<WorkflowRunRow>> {
        let mut tx = self.pool.begin().await?;

        let workflow_exists =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM workflows WHERE id = ?1")
                .bind(workflow_id)
                .fetch_one(&mut *tx)
                .await?;

        if workflow_exists == 0 {
            return Ok(None);
        }

        let steps = sqlx::query_as::<_, WorkflowStepRow>(
            r#"
            SELECT id, workflow_id, name, kind, config, position
            FROM workflow_steps
            WHERE workflow_id = ?1
            ORDER BY position ASC
            "#,
        )
        .bind(workflow_id)
        .fetch_all(&mut *tx)
        .await?;

        let run = sqlx::query_as::<_, WorkflowRunRow>(
            r#"
            INSERT INTO workflow_runs (id, workflow_id, status, created_at)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING id, workflow_id, status, created_at, started_at, finished_at
            "#,
        )
        .bind(new_id())
        .bind(workflow_id)
        .bind(RunStatus::Pending.to_string())
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        // Insertion order is step order; listings rely on it as a tiebreak.
        for step in &steps {
            sqlx::query(
                r#"
                INSERT INTO step_runs (id, workflow_run_id, workflow_step_id, status)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(new_id())
            .bind(&run.id)
            .bind(&step.id)
            .bind(StepStatus::Pending.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(Some(run))
    }

    pub async fn get_run(&self, id: &str) -> Result<Option<WorkflowRunRow>> {
        let row = sqlx::query_as::<_, WorkflowRunRow>(
            r#"
            SELECT id, workflow_id, status, created_at, started_at, finished_at
            FROM workflow_runs
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_runs(&self, workflow_id: &str) -> Result<Vec<WorkflowRunRow>> {
        let rows = sqlx::query_as::<_, WorkflowRunRow>(
            r#"
            SELECT id, workflow_id, status, created_at, started_at, finished_at
            FROM workflow_runs
            WHERE workflow_id = ?1
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Apply a run status transition.
    ///
    /// Returns the updated row, or `None` when the run is unknown or already
    /// terminal (terminal statuses are absorbing). `started_at` is set on the
    /// first transition to RUNNING, `finished_at` on the transition to a
    /// terminal status; neither is ever overwritten.
    pub async fn set_run_status(
        &self,
        id: &str,
        status: RunStatus,
    ) -> Result<Option<WorkflowRunRow>> {
        let now = Utc::now();

        let row = match status {
            RunStatus::Running => {
                sqlx::query_as::<_, WorkflowRunRow>(
                    r#"
                    UPDATE workflow_runs
                    SET status = ?2, started_at = COALESCE(started_at, ?3)
                    WHERE id = ?1 AND status NOT IN ('succeeded', 'failed')
                    RETURNING id, workflow_id, status, created_at, started_at, finished_at
                    "#,
                )
                .bind(id)
                .bind(status.to_string())
                .bind(now)
                .fetch_optional(&self.pool)
                .await?
            }
            RunStatus::Succeeded | RunStatus::Failed => {
                sqlx::query_as::<_, WorkflowRunRow>(
                    r#"
                    UPDATE workflow_runs
                    SET status = ?2,
                        started_at = COALESCE(started_at, ?3),
                        finished_at = COALESCE(finished_at, ?4)
                    WHERE id = ?1 AND status NOT IN ('succeeded', 'failed')
                    RETURNING id, workflow_id, status, created_at, started_at, finished_at
                    "#,
                )
                .bind(id)
                .bind(status.to_string())
                .bind(now)
                .bind(now)
                .fetch_optional(&self.pool)
                .await?
            }
            RunStatus::Pending => {
                sqlx::query_as::<_, WorkflowRunRow>(
                    r#"
                    UPDATE workflow_runs
                    SET status = ?2
                    WHERE id = ?1 AND status NOT IN ('succeeded', 'failed')
                    RETURNING id, workflow_id, status, created_at, started_at, finished_at
                    "#,
                )
                .bind(id)
                .bind(status.to_string())
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(row)
    }

    // ============================================
    // Step runs
    // ============================================

    /// Step runs of a run, in step order (insertion order at run creation).
    pub async fn list_step_runs(&self, run_id: &str) -> Result<Vec<StepRunRow>> {
        let rows = sqlx::query_as::<_, StepRunRow>(
            r#"
            SELECT id, workflow_run_id, workflow_step_id, status, started_at, finished_at
            FROM step_runs
            WHERE workflow_run_id = ?1
            ORDER BY rowid ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn get_step_run(&self, id: &str) -> Result<Option<StepRunRow>> {
        let row = sqlx::query_as::<_, StepRunRow>(
            r#"
            SELECT id, workflow_run_id, workflow_step_id, status, started_at, finished_at
            FROM step_runs
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Step-run counterpart of `set_run_status`: same guard, same timestamp
    /// rules. The guarded UPDATE is also what serializes concurrent manual
    /// completions; the loser of a race sees `None` and takes the idempotent
    /// path.
    pub async fn set_step_run_status(
        &self,
        id: &str,
        status: StepStatus,
    ) -> Result<Option<StepRunRow>> {
        let now = Utc::now();

        let row = match status {
            StepStatus::Running => {
                sqlx::query_as::<_, StepRunRow>(
                    r#"
                    UPDATE step_runs
                    SET status = ?2, started_at = COALESCE(started_at, ?3)
                    WHERE id = ?1 AND status NOT IN ('succeeded', 'failed')
                    RETURNING id, workflow_run_id, workflow_step_id, status, started_at, finished_at
                    "#,
                )
                .bind(id)
                .bind(status.to_string())
                .bind(now)
                .fetch_optional(&self.pool)
                .await?
            }
            StepStatus::Succeeded | StepStatus::Failed => {
                sqlx::query_as::<_, StepRunRow>(
                    r#"
                    UPDATE step_runs
                    SET status = ?2,
                        started_at = COALESCE(started_at, ?3),
                        finished_at = COALESCE(finished_at, ?4)
                    WHERE id = ?1 AND status NOT IN ('succeeded', 'failed')
                    RETURNING id, workflow_run_id, workflow_step_id, status, started_at, finished_at
                    "#,
                )
                .bind(id)
                .bind(status.to_string())
                .bind(now)
                .bind(now)
                .fetch_optional(&self.pool)
                .await?
            }
            StepStatus::Pending => {
                sqlx::query_as::<_, StepRunRow>(
                    r#"
                    UPDATE step_runs
                    SET status = ?2
                    WHERE id = ?1 AND status NOT IN ('succeeded', 'failed')
                    RETURNING id, workflow_run_id, workflow_step_id, status, started_at, finished_at
                    "#,
                )
                .bind(id)
                .bind(status.to_string())
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(row)
    }

    // ============================================
    // Events
    // ============================================

    pub async fn append_event(&self, input: CreateEventRow) -> Result<EventRow> {
        let row = sqlx::query_as::<_, EventRow>(
            r#"
            INSERT INTO events (id, workflow_run_id, step_run_id, event_type, message, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING id, workflow_run_id, step_run_id, event_type, message, created_at
            "#,
        )
        .bind(new_id())
        .bind(&input.workflow_run_id)
        .bind(&input.step_run_id)
        .bind(input.event_type.to_string())
        .bind(&input.message)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Events of a run in creation order, rowid as the stable tiebreak.
    pub async fn list_events(&self, run_id: &str) -> Result<Vec<EventRow>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, workflow_run_id, step_run_id, event_type, message, created_at
            FROM events
            WHERE workflow_run_id = ?1
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

/// Insert a step sequence for a workflow, honoring provided ids/positions.
async fn insert_steps(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    workflow_id: &str,
    steps: &[CreateWorkflowStep],
) -> Result<()> {
    for step in steps {
        sqlx::query(
            r#"
            INSERT INTO workflow_steps (id, workflow_id, name, kind, config, position)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(step.id.clone().unwrap_or_else(new_id))
        .bind(workflow_id)
        .bind(&step.name)
        .bind(step.kind.to_string())
        .bind(&step.config)
        .bind(step.position)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}
