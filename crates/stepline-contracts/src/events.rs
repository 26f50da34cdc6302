// Event DTOs for the append-only run journal
//
// Events are immutable. Ordered by created_at (with insertion order as the
// tiebreak) they reconstruct a run's full causal history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded state transition of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub workflow_run_id: String,
    /// Present for step-scoped events, absent for run-scoped ones
    pub step_run_id: Option<String>,
    pub event_type: EventType,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// The semantic type of a journal event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStarted,
    StepStarted,
    StepSucceeded,
    StepFailed,
    RunSucceeded,
    RunFailed,
}

impl EventType {
    /// Run-terminal events close the journal: nothing may follow them.
    pub fn is_run_terminal(&self) -> bool {
        matches!(self, EventType::RunSucceeded | EventType::RunFailed)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::RunStarted => write!(f, "run_started"),
            EventType::StepStarted => write!(f, "step_started"),
            EventType::StepSucceeded => write!(f, "step_succeeded"),
            EventType::StepFailed => write!(f, "step_failed"),
            EventType::RunSucceeded => write!(f, "run_succeeded"),
            EventType::RunFailed => write!(f, "run_failed"),
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "run_started" => Ok(EventType::RunStarted),
            "step_started" => Ok(EventType::StepStarted),
            "step_succeeded" => Ok(EventType::StepSucceeded),
            "step_failed" => Ok(EventType::StepFailed),
            "run_succeeded" => Ok(EventType::RunSucceeded),
            "run_failed" => Ok(EventType::RunFailed),
            _ => Err(format!("Unknown event type: {}", s)),
        }
    }
}
