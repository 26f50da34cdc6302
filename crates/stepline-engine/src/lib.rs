// Run execution engine
//
// The engine combines four pieces:
// - Broker: in-process pub/sub fanning "run changed" signals to subscribers
// - Executor: advances a run through its steps, one serialized pass per run
// - Handlers: one small contract per automated step kind (delay, http)
// - EngineService: the query/mutation/subscription surface for transports
//
// The store is the source of truth throughout; signals are advisory and the
// executor re-reads persisted state at every decision point, which is what
// lets a manual gate suspend a run across process restarts.

pub mod broker;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod service;

pub use broker::{run_topic, Broker, Signal};
pub use error::{EngineError, Result};
pub use executor::Executor;
pub use handlers::{DelayHandler, HttpHandler, StepHandler};
pub use service::EngineService;
