// Append-only event journal
//
// Every state transition records exactly one event, and every append in the
// system goes through this facade. Keeping a single entry point makes the
// causal-ordering invariant checkable by reading a handful of call sites in
// the executor and the service.

use anyhow::Result;
use stepline_contracts::EventType;
use tracing::debug;

use crate::models::{CreateEventRow, EventRow};
use crate::repositories::Database;

/// Journal over the events table.
#[derive(Clone)]
pub struct EventJournal {
    db: Database,
}

impl EventJournal {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append one event for a run; `step_run_id` scopes step-level events.
    pub async fn record(
        &self,
        run_id: &str,
        step_run_id: Option<&str>,
        event_type: EventType,
        message: impl Into<String>,
    ) -> Result<EventRow> {
        let message = message.into();
        debug!(run_id = %run_id, event_type = %event_type, message = %message, "Recording event");

        self.db
            .append_event(CreateEventRow {
                workflow_run_id: run_id.to_string(),
                step_run_id: step_run_id.map(|id| id.to_string()),
                event_type,
                message,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateWorkflow;

    #[tokio::test]
    async fn record_appends_to_the_run_journal() {
        let db = Database::in_memory().await.unwrap();
        let workflow = db
            .create_workflow(CreateWorkflow {
                name: "empty".to_string(),
                description: None,
                steps: vec![],
            })
            .await
            .unwrap();
        let run = db.create_run(&workflow.id).await.unwrap().unwrap();

        let journal = EventJournal::new(db.clone());
        let event = journal
            .record(&run.id, None, EventType::RunStarted, "Run enqueued")
            .await
            .unwrap();

        assert_eq!(event.event_type, "run_started");
        assert_eq!(event.message, "Run enqueued");
        assert!(event.step_run_id.is_none());

        let events = db.list_events(&run.id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, event.id);
    }
}
