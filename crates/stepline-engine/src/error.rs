// Error types for the run engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the engine and its boundary operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Referenced workflow does not exist
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Referenced run does not exist
    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// Referenced step run does not exist
    #[error("Step run not found: {0}")]
    StepRunNotFound(String),

    /// Step configuration could not be interpreted for its kind
    #[error("Invalid step configuration: {0}")]
    Validation(String),

    /// An automated handler's operation failed
    #[error("Step execution failed: {0}")]
    StepExecution(String),

    /// Storage or other internal failure; left unwrapped so operators can
    /// diagnose the underlying cause
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    /// Create a step execution error
    pub fn execution(msg: impl Into<String>) -> Self {
        EngineError::StepExecution(msg.into())
    }

    /// Failures the executor reifies into STEP_FAILED/RUN_FAILED events.
    /// Everything else aborts the scheduling pass instead.
    pub fn is_step_failure(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_) | EngineError::StepExecution(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::WorkflowNotFound(_)
                | EngineError::RunNotFound(_)
                | EngineError::StepRunNotFound(_)
        )
    }
}
