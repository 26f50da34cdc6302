// Public contracts shared by storage, engine, and transport
//
// Everything here is plain data: entities, status enums, event types, and
// the typed views over per-kind step configuration. No I/O, no runtime.

pub mod common;
pub mod events;
pub mod resources;
pub mod steps;

pub use common::new_id;
pub use events::{Event, EventType};
pub use resources::{
    RunSnapshot, RunStatus, StepKind, StepRun, StepStatus, Workflow, WorkflowRun, WorkflowStep,
    WorkflowStepInput,
};
pub use steps::{DelayStepConfig, HttpStepConfig, StepConfigError};
