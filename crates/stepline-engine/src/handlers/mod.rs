// Step handlers for automated step kinds
//
// A handler performs the step's side effect and reports success or a typed
// failure. Handlers are stateless and never touch the store; status
// transitions and event appends belong to the executor. MANUAL steps have no
// handler at all: they are driven entirely by completeManualStep.

use async_trait::async_trait;

use crate::error::Result;

mod delay;
mod http;

pub use delay::DelayHandler;
pub use http::HttpHandler;

/// Contract between the executor and an automated step kind.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Execute the step described by `config`.
    ///
    /// Failures must be `Validation` (config could not be interpreted) or
    /// `StepExecution` (the operation itself failed); both are reified into
    /// STEP_FAILED/RUN_FAILED by the caller.
    async fn execute(&self, config: &serde_json::Value) -> Result<()>;
}
